//! Error types for sim-harness operations.
//!
//! Defines error types for the two layers of the harness:
//! - The simulator adapter (assembly, process control)
//! - The orchestration core (program selection, batch control, setup)
//!
//! Output mismatches are not errors. They are reported as a failed
//! [`Verdict`](crate::runner::Verdict) and never interrupt a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by a [`SimulatorAdapter`](crate::simulator::SimulatorAdapter).
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Source file '{0}' does not exist")]
    MissingSource(PathBuf),

    #[error("Assembly of '{source_path}' failed: {reason}")]
    AssemblyFailed { source_path: PathBuf, reason: String },

    #[error("Simulator unavailable: {0}")]
    Unavailable(String),

    #[error("No artifact loaded into the simulator")]
    NotLoaded,

    #[error("Simulator process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulatorError {
    /// Returns true if this error means the source did not produce an artifact.
    pub fn is_assembly_failure(&self) -> bool {
        matches!(
            self,
            SimulatorError::MissingSource(_) | SimulatorError::AssemblyFailed { .. }
        )
    }
}

/// Errors raised by the orchestration core.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Assembly error: {0}")]
    Assembly(SimulatorError),

    #[error("Program path '{0}' not found")]
    MissingResource(PathBuf),

    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Simulator error: {0}")]
    Simulator(SimulatorError),

    #[error("Test run cancelled")]
    Cancelled,

    #[error("Batch already completed")]
    AlreadyCompleted,

    #[error("Invalid suite: {0}")]
    Suite(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SimulatorError> for HarnessError {
    fn from(err: SimulatorError) -> Self {
        match err {
            SimulatorError::Unavailable(reason) => HarnessError::TargetUnavailable(reason),
            other if other.is_assembly_failure() => HarnessError::Assembly(other),
            other => HarnessError::Simulator(other),
        }
    }
}
