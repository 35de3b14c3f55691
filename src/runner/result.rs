//! Results of individual runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pass/fail outcome of a verified run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// How a run reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The target halted by itself.
    Halted,
    /// The poll budget ran out and the target was force-halted.
    TimedOut,
    /// The simulator failed mid-run. Always a failed run.
    Aborted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Halted => write!(f, "halted"),
            Termination::TimedOut => write!(f, "timed out"),
            Termination::Aborted => write!(f, "aborted"),
        }
    }
}

/// Complete record of one verified run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// 1-based run number within its program.
    pub run: usize,
    pub verdict: Verdict,
    pub termination: Termination,
    /// Polling ticks elapsed.
    pub polls: u32,
    /// Input tokens delivered to the target.
    pub inputs_fed: usize,
    /// Input tokens supplied by the run.
    pub inputs_supplied: usize,
    /// Normalized expected output.
    pub expected: String,
    /// Normalized actual output.
    pub actual: String,
    /// Output as read from the target.
    pub raw_output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}
