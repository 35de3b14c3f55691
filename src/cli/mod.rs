//! Command-line interface for sim-harness.
//!
//! Provides commands for running test sessions and validating suites.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
