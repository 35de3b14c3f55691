//! Single-run execution against a simulator target.
//!
//! A run starts the loaded artifact, polls it on every tick, feeds input
//! tokens when the target asks for them, and verifies the output once the
//! target halts or the poll budget runs out.
//!
//! # Architecture
//!
//! ```text
//! RunSpec → RunScheduler ⇄ SimulatorAdapter
//!               │
//!               └→ OutputVerifier → RunReport
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sim_harness::runner::{IntervalTicker, RunScheduler, RunSpec};
//!
//! let spec = RunSpec::new(3).with_input_line("3 4").with_expected("12");
//! let mut ticker = IntervalTicker::new(config.poll_interval, Duration::ZERO);
//! let report = RunScheduler::new(1, spec, artifact)
//!     .drive(&mut target, &mut log, &mut ticker, &mut shutdown_rx)
//!     .await?;
//!
//! println!("Run 1: {}", report.verdict);
//! ```

pub mod feeder;
pub mod result;
pub mod run_spec;
pub mod scheduler;
pub mod ticker;
pub mod verifier;

pub use feeder::InputFeeder;
pub use result::{RunReport, Termination, Verdict};
pub use run_spec::{split_input, RunSpec};
pub use scheduler::{RunPhase, RunScheduler, RunState};
pub use ticker::{IntervalTicker, ManualTicker, Ticker};
pub use verifier::{OutputVerifier, Verification};
