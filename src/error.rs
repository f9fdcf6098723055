use thiserror::Error;

/// Errors that can occur in the power_scouter library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Pipeline closed: {0}")]
    PipelineClosed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for power_scouter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a detector backend for a single frame.
///
/// The pipeline never propagates these; a failed frame is treated exactly like a
/// frame with no faces in it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("detector backend failed: {0}")]
    Backend(String),

    #[error("frame rejected by detector: {0}")]
    InvalidFrame(String),
}
