#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use gwglm::config::IwlsConfig;
use gwglm::data::{ColumnSpec, load_regression_data};
use gwglm::edges::{WeightValue, neighbors_to_edges};
use gwglm::report::FitReport;
use gwglm::{DiffReduction, Family, IwlsRequest, LocalWeights, iwls};

#[derive(Clone, Copy, ValueEnum)]
pub enum FamilyCli {
    Gaussian,
    Poisson,
    Binomial,
}

impl From<FamilyCli> for Family {
    fn from(value: FamilyCli) -> Self {
        match value {
            FamilyCli::Gaussian => Family::Gaussian,
            FamilyCli::Poisson => Family::Poisson,
            FamilyCli::Binomial => Family::Binomial,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ReductionCli {
    Max,
    Min,
    L2,
}

impl From<ReductionCli> for DiffReduction {
    fn from(value: ReductionCli) -> Self {
        match value {
            ReductionCli::Max => DiffReduction::Max,
            ReductionCli::Min => DiffReduction::Min,
            ReductionCli::L2 => DiffReduction::L2,
        }
    }
}

#[derive(Args)]
pub struct FitArgs {
    /// Path to a TSV file with a header row
    pub data: PathBuf,

    /// Column holding the response
    #[arg(long)]
    pub response: String,

    /// Comma-separated covariate columns, in design order
    #[arg(long, value_delimiter = ',')]
    pub covariates: Vec<String>,

    #[arg(long, value_enum, default_value_t = FamilyCli::Gaussian)]
    pub family: FamilyCli,

    /// Column added to the linear predictor as a fixed offset
    #[arg(long)]
    pub offset: Option<String>,

    /// Column of kernel weights for a single regression location
    #[arg(long)]
    pub local_weights: Option<String>,

    /// Do not prepend an intercept column
    #[arg(long)]
    pub no_intercept: bool,

    /// TOML file with solver settings; flags below take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Convergence tolerance on the coefficient change
    #[arg(long)]
    pub tol: Option<f64>,

    /// Maximum number of IWLS iterations
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// How coefficient changes are reduced for the convergence test
    #[arg(long, value_enum)]
    pub reduction: Option<ReductionCli>,

    /// Where to write the fit report
    #[arg(long, default_value = "fit.toml")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct EdgesArgs {
    /// TOML file with a [neighbors] table and an optional [weights] table
    pub neighbors: PathBuf,

    /// Write the edge list here instead of standard output
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "gwglm",
    about = "Fit generalized linear models with iteratively reweighted least squares",
    long_about = "Fits Gaussian, Poisson and binomial GLMs by IWLS, globally or for one \
                 geographically weighted location, and converts neighbor mappings to edge lists."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model from tabular data
    #[command(about = "Fit a GLM by IWLS (outputs: fit.toml)")]
    Fit(FitArgs),

    /// Flatten a neighbor mapping into an edge list
    #[command(about = "Convert a neighbor mapping to focal/neighbor/weight rows")]
    Edges(EdgesArgs),
}

/// On-disk layout read by the `edges` command.
#[derive(Deserialize)]
struct NeighborFile {
    neighbors: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    weights: Option<BTreeMap<String, Vec<WeightValue>>>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fit(args) => fit_command(args),
        Commands::Edges(args) => edges_command(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn fit_command(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => IwlsConfig::load(path)?,
        None => IwlsConfig::default(),
    };
    if let Some(tol) = args.tol {
        config.tol = tol;
    }
    if let Some(max_iter) = args.max_iter {
        config.max_iter = max_iter;
    }
    if let Some(reduction) = args.reduction {
        config.reduction = reduction.into();
    }
    config.validate()?;

    let columns = ColumnSpec {
        response: args.response,
        covariates: args.covariates,
        offset: args.offset,
        local_weights: args.local_weights,
        intercept: !args.no_intercept,
    };
    let data = load_regression_data(&args.data, &columns)?;
    let family: Family = args.family.into();

    let mut request = IwlsRequest::new(data.y.view(), data.x.view(), family);
    if let Some(offset) = &data.offset {
        request = request.with_offset(offset.view());
    }
    if let Some(weights) = &data.local_weights {
        request = request.with_local_weights(LocalWeights::Diagonal(weights.view()));
    }

    println!(
        "Fitting {} model on {} observations ({})",
        family,
        data.y.len(),
        data.design_names.join(", ")
    );
    let result = iwls(&request, &config)?;

    println!(
        "{:?} after {} iterations (diff {:.3e})",
        result.status, result.iterations, result.diff
    );
    println!(
        "{}",
        data.design_names
            .iter()
            .zip(result.betas.iter())
            .map(|(name, beta)| format!("  {name:<16} {beta:>14.6}"))
            .join("\n")
    );

    let report = FitReport::from_result(&result, &data.design_names, family, &config)?;
    report.save(&args.output)?;
    println!("Report saved to: {}", args.output.display());

    Ok(())
}

fn edges_command(args: EdgesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&args.neighbors)?;
    let file: NeighborFile = toml::from_str(&text)?;
    let edges = neighbors_to_edges(&file.neighbors, file.weights.as_ref())?;
    log::info!(
        "Read {} focal units from '{}'",
        file.neighbors.len(),
        args.neighbors.display()
    );

    match &args.output {
        Some(path) => write_edges(BufWriter::new(fs::File::create(path)?), &edges)?,
        None => write_edges(BufWriter::new(io::stdout().lock()), &edges)?,
    }
    if let Some(path) = &args.output {
        println!("Edge list saved to: {}", path.display());
    }
    Ok(())
}

fn write_edges<W: Write>(
    mut out: W,
    edges: &gwglm::edges::EdgeList<String>,
) -> Result<(), io::Error> {
    writeln!(out, "focal\tneighbor\tweight")?;
    for ((focal, neighbor), weight) in edges
        .focal
        .iter()
        .zip(edges.neighbor.iter())
        .zip(edges.weight.iter())
    {
        writeln!(out, "{focal}\t{neighbor}\t{weight}")?;
    }
    out.flush()
}
