//! Solver settings, loadable from and savable to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// How the per-coefficient absolute changes between two iterations are reduced
/// to the single number compared against the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffReduction {
    /// Largest change. Convergence requires every coefficient to settle.
    #[default]
    Max,
    /// Smallest change. One settled coefficient is enough to stop.
    Min,
    /// Euclidean norm of the change vector.
    L2,
}

/// Stopping rules for one IWLS run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IwlsConfig {
    /// Iteration stops once the reduced coefficient change is at most `tol`.
    pub tol: f64,
    /// Hard cap on the number of reweighting iterations.
    pub max_iter: usize,
    pub reduction: DiffReduction,
}

impl Default for IwlsConfig {
    fn default() -> Self {
        Self {
            tol: 1.0e-6,
            max_iter: 200,
            reduction: DiffReduction::Max,
        }
    }
}

/// Custom error type for configuration loading and saving.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The convergence tolerance must be a finite, non-negative number, but found {0}.")]
    InvalidTolerance(f64),
}

impl IwlsConfig {
    /// Loads a config from a TOML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the config to a file in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tol));
        }
        Ok(())
    }
}
