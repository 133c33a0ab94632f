use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a page accessor.
///
/// Only `SessionLost` is fatal. Everything else is absorbed by the caller as a
/// stagnant harvest cycle or an unknown metric.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Transient extraction failure: {0}")]
    Transient(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),
}

impl PageError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PageError::SessionLost(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingEnv(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
