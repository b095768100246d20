//! Human-readable record of a finished fit, saved as TOML.

use crate::config::IwlsConfig;
use crate::family::Family;
use crate::iwls::{IwlsResult, IwlsStatus};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// One named coefficient of the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
}

/// The top-level, self-contained record of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub family: Family,
    /// True when the fit used location kernel weights.
    pub local: bool,
    pub status: IwlsStatus,
    pub iterations: usize,
    pub final_diff: f64,
    pub fitted: Vec<f64>,
    // Tables must follow plain values in the TOML output.
    pub config: IwlsConfig,
    pub coefficients: Vec<Coefficient>,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read or write report file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML report file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize report to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The model has {coefficients} coefficients but {names} names were given.")]
    NameCountMismatch { coefficients: usize, names: usize },
}

impl FitReport {
    pub fn from_result(
        result: &IwlsResult,
        names: &[String],
        family: Family,
        config: &IwlsConfig,
    ) -> Result<Self, ReportError> {
        if names.len() != result.betas.len() {
            return Err(ReportError::NameCountMismatch {
                coefficients: result.betas.len(),
                names: names.len(),
            });
        }
        let coefficients = names
            .iter()
            .zip(result.betas.iter())
            .map(|(name, &estimate)| Coefficient {
                name: name.clone(),
                estimate,
            })
            .collect();
        Ok(Self {
            family,
            local: result.hat_factor.is_some(),
            status: result.status,
            iterations: result.iterations,
            final_diff: result.diff,
            fitted: result.fitted.to_vec(),
            config: config.clone(),
            coefficients,
        })
    }

    /// Saves the report to a file in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a report from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let toml_string = fs::read_to_string(path)?;
        let report = toml::from_str(&toml_string)?;
        Ok(report)
    }
}
