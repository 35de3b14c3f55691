//! Per-program reports and the batch summary.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::runner::{RunReport, Termination, Verdict};

/// What happened to one program of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ProgramOutcome {
    /// Assembled and every run verified.
    Tested,
    /// The source did not produce an artifact.
    AssemblyFailed { reason: String },
    /// The source path does not exist.
    Missing,
}

/// Result of testing one program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramReport {
    pub source: PathBuf,
    pub artifact: Option<PathBuf>,
    pub outcome: ProgramOutcome,
    pub runs: Vec<RunReport>,
}

impl ProgramReport {
    pub fn tested(source: PathBuf, artifact: PathBuf, runs: Vec<RunReport>) -> Self {
        Self {
            source,
            artifact: Some(artifact),
            outcome: ProgramOutcome::Tested,
            runs,
        }
    }

    pub fn assembly_failed(source: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            source,
            artifact: None,
            outcome: ProgramOutcome::AssemblyFailed {
                reason: reason.into(),
            },
            runs: Vec::new(),
        }
    }

    pub fn missing(source: PathBuf) -> Self {
        Self {
            source,
            artifact: None,
            outcome: ProgramOutcome::Missing,
            runs: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome != ProgramOutcome::Tested
    }

    pub fn passed_runs(&self) -> usize {
        self.runs.iter().filter(|r| r.passed()).count()
    }
}

/// Aggregate counts over a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub programs: Vec<ProgramReport>,
    pub runs_total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Runs that were force-halted. Counted in `passed`/`failed` as well.
    pub timed_out: usize,
    /// Runs ended by a simulator error. Counted in `failed` as well.
    pub aborted: usize,
    pub skipped_programs: usize,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a program report and updates the counters.
    pub fn push(&mut self, report: ProgramReport) {
        if report.is_skipped() {
            self.skipped_programs += 1;
        }
        for run in &report.runs {
            self.runs_total += 1;
            match run.verdict {
                Verdict::Pass => self.passed += 1,
                Verdict::Fail => self.failed += 1,
            }
            match run.termination {
                Termination::TimedOut => self.timed_out += 1,
                Termination::Aborted => self.aborted += 1,
                Termination::Halted => {}
            }
        }
        self.programs.push(report);
    }

    /// True if no run failed and no program was skipped.
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.skipped_programs == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for program in &self.programs {
            match &program.outcome {
                ProgramOutcome::Tested => {
                    writeln!(
                        f,
                        "{}: {}/{} runs passed",
                        program.source.display(),
                        program.passed_runs(),
                        program.runs.len()
                    )?;
                    for run in &program.runs {
                        writeln!(
                            f,
                            "  run {}: {} ({}, {} polls)",
                            run.run, run.verdict, run.termination, run.polls
                        )?;
                        if !run.passed() {
                            writeln!(f, "    expected: {}", run.expected)?;
                            writeln!(f, "    actual:   {}", run.actual)?;
                        }
                    }
                }
                ProgramOutcome::AssemblyFailed { reason } => {
                    writeln!(
                        f,
                        "{}: SKIPPED (assembly failed: {})",
                        program.source.display(),
                        reason
                    )?;
                }
                ProgramOutcome::Missing => {
                    writeln!(f, "{}: SKIPPED (not found)", program.source.display())?;
                }
            }
        }
        write!(
            f,
            "{} programs, {} runs: {} passed, {} failed, {} timed out, {} aborted, {} programs skipped",
            self.programs.len(),
            self.runs_total,
            self.passed,
            self.failed,
            self.timed_out,
            self.aborted,
            self.skipped_programs
        )
    }
}
