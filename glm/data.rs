//! # Data Loading and Validation Module
//!
//! Reads a tab-separated table of observations and turns the columns named by
//! a `ColumnSpec` into the `ndarray` structures the solver consumes.
//!
//! - Explicit Schema: the caller names the response, the covariates and the
//!   optional offset and local-weight columns. Every named column must exist,
//!   be numeric, contain no nulls and hold only finite values.
//! - User-Centric Errors: failures are assumed to be user-input errors, and
//!   `DataError` says which column is at fault.
//! - The intercept is not read from the file; `ColumnSpec::intercept` prepends
//!   a column of ones.

use ndarray::{Array1, Array2, ShapeBuilder};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Names of the columns that make up one regression problem.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub response: String,
    pub covariates: Vec<String>,
    pub offset: Option<String>,
    pub local_weights: Option<String>,
    /// Prepend a column of ones to the design matrix.
    pub intercept: bool,
}

impl ColumnSpec {
    pub fn new(response: impl Into<String>, covariates: Vec<String>) -> Self {
        Self {
            response: response.into(),
            covariates,
            offset: None,
            local_weights: None,
            intercept: true,
        }
    }

    /// Names of the design matrix columns, in order.
    pub fn design_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.covariates.len() + 1);
        if self.intercept {
            names.push("intercept".to_string());
        }
        names.extend(self.covariates.iter().cloned());
        names
    }
}

/// A container for validated data ready for model fitting.
#[derive(Debug)]
pub struct RegressionData {
    pub y: Array1<f64>,
    /// Design matrix, shape `[n_samples, n_coefficients]`.
    pub x: Array2<f64>,
    pub offset: Option<Array1<f64>>,
    /// Kernel weights of a single regression location, one per observation.
    pub local_weights: Option<Array1<f64>>,
    pub design_names: Vec<String>,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. This tool requires all data to be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("The input file has {found} rows, fewer than the {required} coefficients of the model.")]
    InsufficientRows { found: usize, required: usize },
}

/// Loads the columns named in `columns` from a tab-separated file.
pub fn load_regression_data(
    path: impl AsRef<Path>,
    columns: &ColumnSpec,
) -> Result<RegressionData, DataError> {
    let path = path.as_ref();
    log::info!("Loading data from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    let columns_set: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let mut required: Vec<&String> = vec![&columns.response];
    required.extend(columns.covariates.iter());
    required.extend(columns.offset.iter());
    required.extend(columns.local_weights.iter());
    for name in &required {
        if !columns_set.contains(name.as_str()) {
            return Err(DataError::ColumnNotFound((*name).clone()));
        }
    }

    let n = df.height();
    let design_names = columns.design_names();
    if n < design_names.len() {
        return Err(DataError::InsufficientRows {
            found: n,
            required: design_names.len(),
        });
    }

    let y = Array1::from_vec(extract_numeric_column(&df, &columns.response)?);

    let p = design_names.len();
    let mut buffer = Vec::with_capacity(n * p);
    if columns.intercept {
        buffer.extend(std::iter::repeat_n(1.0, n));
    }
    for name in &columns.covariates {
        let mut column = extract_numeric_column(&df, name)?;
        buffer.append(&mut column);
    }
    // Columns were appended one after another, so the buffer is column-major.
    let x = Array2::from_shape_vec((n, p).f(), buffer).map_err(|e| DataError::ColumnWrongType {
        column_name: "design matrix".to_string(),
        expected_type: "rectangular numeric columns",
        found_type: e.to_string(),
    })?;

    let offset = match &columns.offset {
        Some(name) => Some(Array1::from_vec(extract_numeric_column(&df, name)?)),
        None => None,
    };

    let local_weights = match &columns.local_weights {
        Some(name) => {
            let values = extract_numeric_column(&df, name)?;
            if let Some((row, value)) = values.iter().enumerate().find(|(_, v)| **v < 0.0) {
                return Err(DataError::ColumnWrongType {
                    column_name: name.clone(),
                    expected_type: "non-negative f64 values",
                    found_type: format!("negative value {} at row {}", value, row + 1),
                });
            }
            Some(Array1::from_vec(values))
        }
        None => None,
    };

    log::info!(
        "Loaded {} observations with {} design columns",
        n,
        design_names.len()
    );

    Ok(RegressionData {
        y,
        x,
        offset,
        local_weights,
        design_names,
    })
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let casted = match series.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }
    };

    if casted.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    const TABLE: &str = "y\tdistance\tincome\tkernel\texposure\n\
                         3\t0.5\t1.0\t1.0\t0.0\n\
                         1\t1.5\t2.0\t0.8\t0.1\n\
                         4\t2.5\t1.5\t0.5\t0.2\n\
                         2\t3.5\t3.0\t0.2\t0.3";

    #[test]
    fn test_loads_design_with_intercept() {
        let file = create_test_tsv(TABLE).unwrap();
        let columns = ColumnSpec::new("y", vec!["distance".to_string(), "income".to_string()]);
        let data = load_regression_data(file.path(), &columns).unwrap();

        assert_eq!(data.y.to_vec(), vec![3.0, 1.0, 4.0, 2.0]);
        assert_eq!(data.x.dim(), (4, 3));
        assert_eq!(data.x.column(0).to_vec(), vec![1.0; 4]);
        assert_eq!(data.x.column(1).to_vec(), vec![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(data.x.row(3).to_vec(), vec![1.0, 3.5, 3.0]);
        assert_eq!(data.design_names, vec!["intercept", "distance", "income"]);
        assert!(data.offset.is_none());
        assert!(data.local_weights.is_none());
    }

    #[test]
    fn test_loads_optional_columns() {
        let file = create_test_tsv(TABLE).unwrap();
        let mut columns = ColumnSpec::new("y", vec!["distance".to_string()]);
        columns.intercept = false;
        columns.offset = Some("exposure".to_string());
        columns.local_weights = Some("kernel".to_string());
        let data = load_regression_data(file.path(), &columns).unwrap();

        assert_eq!(data.x.dim(), (4, 1));
        assert_eq!(data.offset.unwrap().to_vec(), vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(data.local_weights.unwrap().to_vec(), vec![1.0, 0.8, 0.5, 0.2]);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let file = create_test_tsv(TABLE).unwrap();
        let columns = ColumnSpec::new("y", vec!["elevation".to_string()]);
        match load_regression_data(file.path(), &columns) {
            Err(DataError::ColumnNotFound(col)) => assert_eq!(col, "elevation"),
            other => panic!("Expected ColumnNotFound(elevation), got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let file = create_test_tsv("y\tx\n1\t0.5\n2\tNaN\n3\t1.5").unwrap();
        let columns = ColumnSpec::new("y", vec!["x".to_string()]);
        match load_regression_data(file.path(), &columns) {
            Err(DataError::NonFiniteValuesFound(col)) => assert_eq!(col, "x"),
            other => panic!("Expected NonFiniteValuesFound(x), got {:?}", other),
        }
    }

    #[test]
    fn test_negative_local_weights_rejected() {
        let file = create_test_tsv("y\tx\tw\n1\t0.5\t1.0\n2\t1.0\t-0.5\n3\t1.5\t1.0").unwrap();
        let mut columns = ColumnSpec::new("y", vec!["x".to_string()]);
        columns.local_weights = Some("w".to_string());
        assert!(matches!(
            load_regression_data(file.path(), &columns),
            Err(DataError::ColumnWrongType { .. })
        ));
    }
}
