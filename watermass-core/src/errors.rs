use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum WatermassError {
    #[error("Field {field} with shape {found:?} is not conformable with shape {expected:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Invalid bin edges: {0}")]
    InvalidBins(String),
    #[error("Invalid time axis: {0}")]
    InvalidTimeAxis(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Could not parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Convenience type for `Result<T, WatermassError>`.
pub type WatermassResult<T> = Result<T, WatermassError>;
