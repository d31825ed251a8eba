//! Error types for the landmark particle filter

use thiserror::Error;

/// Errors raised by the filter, its configuration and its data loaders
#[derive(Error, Debug)]
pub enum FilterError {
    /// An operation other than initialization was invoked on an uninitialized filter
    #[error("Particle filter has not been initialized")]
    NotInitialized,

    /// Initialization was invoked on a filter that already holds a population
    #[error("Particle filter is already initialized")]
    AlreadyInitialized,

    /// Data association was attempted against a map with no landmarks
    #[error("Cannot associate an observation with an empty landmark map")]
    EmptyMap,

    /// The population-wide weight sum is zero or not finite after weighting
    #[error("Degenerate particle population: weight sum is {sum}")]
    DegenerateWeights { sum: f64 },

    /// Non-positive particle count, time step, standard deviation or range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed serialized configuration or data file
    #[error("Format error: {0}")]
    Format(String),
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

impl From<serde_yaml::Error> for FilterError {
    fn from(e: serde_yaml::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

impl From<toml::de::Error> for FilterError {
    fn from(e: toml::de::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

impl From<toml::ser::Error> for FilterError {
    fn from(e: toml::ser::Error) -> Self {
        FilterError::Format(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
