//! Error types for the simulation engine

use kyma_core::TaskDefect;
use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Errors that can occur while preparing or running a simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Input workload is unusable (e.g. empty)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A task record breaks the loader contract
    #[error("Invalid task at row {row}: {reason}")]
    InvalidTask { row: usize, reason: TaskDefect },

    /// Run or policy configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimulationError {
    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
