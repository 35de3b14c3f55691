//! Simulator adapters.
//!
//! The orchestration core controls the external target only through the
//! [`SimulatorAdapter`] capability set. Concrete adapters decide how each
//! capability is carried out:
//!
//! - [`ProcessSimulator`]: drives an external assembler command and a
//!   simulator child process over stdin/stdout
//! - [`ScriptedSimulator`]: deterministic in-process target for tests and
//!   dry runs
//!
//! # Contract
//!
//! ```text
//! assemble(source) ──► Artifact
//!                          │
//!        configure_io ──► load(artifact) ──► start() ──► is_halted / is_awaiting_input
//!                                                ▲          │            │
//!                                                │    read_output   inject_input
//!                                                └── force_halt (timeout)
//! ```
//!
//! Query methods are synchronous. They are sampled from the single polling
//! tick and must return immediately.

pub mod process;
pub mod scripted;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SimulatorError;

pub use process::{CommandTemplate, ProcessSimulator, ProcessSimulatorConfig};
pub use scripted::{Script, ScriptedSimulator};

/// Loadable, target-executable form of a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path of the assembled file.
    pub path: PathBuf,
    /// Path of the source it was assembled from.
    pub source: PathBuf,
}

impl Artifact {
    /// Creates an artifact record.
    pub fn new(path: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// File name of the artifact for log lines.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Encoding of values exchanged through the simulator's I/O registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    Hex,
    #[default]
    Dec,
    Ascii,
}

impl IoMode {
    /// Returns the lowercase name used in command templates and suite files.
    pub fn as_str(&self) -> &'static str {
        match self {
            IoMode::Hex => "hex",
            IoMode::Dec => "dec",
            IoMode::Ascii => "ascii",
        }
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hex" => Ok(IoMode::Hex),
            "dec" | "decimal" => Ok(IoMode::Dec),
            "ascii" | "char" => Ok(IoMode::Ascii),
            other => Err(format!("Unknown I/O mode: {}", other)),
        }
    }
}

/// Input and output register modes for one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IoModes {
    pub input: IoMode,
    pub output: IoMode,
}

impl IoModes {
    pub fn new(input: IoMode, output: IoMode) -> Self {
        Self { input, output }
    }
}

impl fmt::Display for IoModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}2{}", self.input, self.output)
    }
}

/// Capability set used by the orchestration core to control one target.
///
/// Exactly one adapter instance exists per harness session, and it is owned
/// by the batch coordinator for the session's lifetime.
#[async_trait]
pub trait SimulatorAdapter: Send {
    /// Produces a loadable artifact from a source file.
    ///
    /// Auxiliary files the assembler leaves behind may be discarded.
    async fn assemble(&mut self, source: &Path) -> Result<Artifact, SimulatorError>;

    /// Sets the I/O register modes used by subsequent runs.
    fn configure_io(&mut self, modes: IoModes);

    /// Associates an artifact with the target.
    fn load(&mut self, artifact: &Artifact) -> Result<(), SimulatorError>;

    /// Resets the execution state and begins execution without blocking.
    async fn start(&mut self) -> Result<(), SimulatorError>;

    /// True iff the target reached a terminal state (normal, abnormal or forced).
    fn is_halted(&mut self) -> bool;

    /// True iff the target is blocked waiting for exactly one input value.
    fn is_awaiting_input(&mut self) -> bool;

    /// Delivers one input token. Ignored when the target is not awaiting input.
    async fn inject_input(&mut self, token: &str) -> Result<(), SimulatorError>;

    /// All output produced so far in the current run.
    fn read_output(&mut self) -> String;

    /// Unconditionally stops execution.
    async fn force_halt(&mut self) -> Result<(), SimulatorError>;

    /// Releases the target at the end of a session.
    async fn shutdown(&mut self) -> Result<(), SimulatorError> {
        self.force_halt().await
    }
}
