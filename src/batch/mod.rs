//! Batch testing of programs.
//!
//! This module sequences runs over one or more programs:
//!
//! - **Discovery**: a path selects one program or a directory of programs
//! - **Coordinator**: assembles each program, redirects the transcript log,
//!   and drives every run to its verdict
//! - **Reports**: per-program outcomes and aggregate counts
//!
//! # Example
//!
//! ```ignore
//! use sim_harness::batch::{discover_programs, BatchCoordinator, ProgramUnderTest};
//!
//! let selection = discover_programs(Path::new("programs/"), "mas")?;
//! let programs: Vec<_> = selection
//!     .programs
//!     .iter()
//!     .map(|source| suite.program(source, config.default_max_polls))
//!     .collect();
//!
//! let mut coordinator = BatchCoordinator::new(target, FileLog::new(), ticker, config);
//! let summary = coordinator.run(&programs, selection.mode).await?;
//! println!("{}", summary);
//! ```

pub mod coordinator;
pub mod discovery;
pub mod report;

pub use coordinator::{BatchCoordinator, BatchState, ProgramUnderTest};
pub use discovery::{discover_programs, Selection, SelectionMode};
pub use report::{BatchSummary, ProgramOutcome, ProgramReport};
