//! sim-harness: automated correctness tester for programs run on an
//! external simulator.
//!
//! Programs are assembled, loaded into a simulator target and run once per
//! suite entry. A polling state machine feeds input when the target asks
//! for it, detects termination or timeout, and compares the output with
//! the expectation.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;
pub mod simulator;
pub mod suite;

// Re-export commonly used types
pub use config::{ConfigError, HarnessConfig};
pub use error::{HarnessError, SimulatorError};
