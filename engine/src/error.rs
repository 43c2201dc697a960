use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the analysis, filter and simplification core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("elevation profile needs at least 2 elevation points, found {found}")]
    InsufficientData { found: usize },
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to read or write GPX document: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
