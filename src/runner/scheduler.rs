//! Polling state machine for one run.
//!
//! ```text
//! Starting ──► Polling ──► Halted ──► Verified
//!                 │ ▲
//!                 └─┘ inject input / keep waiting
//! ```
//!
//! Each call to [`RunScheduler::tick`] performs exactly one transition step:
//!
//! 1. **Starting**: reset counters, load the artifact, start the target.
//! 2. **Polling**: increment the poll count. Past the budget the target is
//!    force-halted. Otherwise a halted target ends polling, and a target
//!    waiting for input receives the next token if one is left.
//! 3. **Halted**: read the output, verify it, log the verdict, and move to
//!    **Verified**, which is terminal.
//!
//! A timeout is not an error: it is one of the ways into Halted. A simulator
//! error other than an unavailable target also ends only the current run,
//! which is then reported as aborted and failed.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::feeder::InputFeeder;
use super::result::{RunReport, Termination, Verdict};
use super::run_spec::RunSpec;
use super::ticker::Ticker;
use super::verifier::OutputVerifier;
use crate::error::{HarnessError, SimulatorError};
use crate::logging::RunLog;
use crate::simulator::{Artifact, SimulatorAdapter};

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Starting,
    Polling,
    Halted,
    Verified,
}

/// Per-run counters. Reset at the start of every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    /// Polling ticks elapsed since the run started.
    pub poll_count: u32,
    /// Index of the next unconsumed input token.
    pub input_index: usize,
}

impl RunState {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Drives one run of one program from start to verdict.
#[derive(Debug)]
pub struct RunScheduler {
    run: usize,
    spec: RunSpec,
    artifact: Artifact,
    feeder: InputFeeder,
    state: RunState,
    phase: RunPhase,
    termination: Option<Termination>,
    started_at: DateTime<Utc>,
}

impl RunScheduler {
    /// Creates a scheduler for the 1-based run number `run`.
    pub fn new(run: usize, spec: RunSpec, artifact: Artifact) -> Self {
        let feeder = InputFeeder::new(spec.input.clone());
        Self {
            run,
            spec,
            artifact,
            feeder,
            state: RunState::default(),
            phase: RunPhase::Starting,
            termination: None,
            started_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn spec(&self) -> &RunSpec {
        &self.spec
    }

    /// Performs one transition step.
    ///
    /// Returns the report on the tick that verifies the run, `None` otherwise.
    /// Ticking a verified run is a no-op.
    pub async fn tick<S>(
        &mut self,
        target: &mut S,
        log: &mut dyn RunLog,
    ) -> Result<Option<RunReport>, HarnessError>
    where
        S: SimulatorAdapter + ?Sized,
    {
        match self.phase {
            RunPhase::Starting => match self.begin(target, log).await {
                Ok(()) => Ok(None),
                Err(e) => {
                    self.abort(e, target, log).await?;
                    Ok(Some(self.finish(target, log)))
                }
            },
            RunPhase::Polling => match self.poll(target, log).await {
                Ok(true) => Ok(Some(self.finish(target, log))),
                Ok(false) => Ok(None),
                Err(e) => {
                    self.abort(e, target, log).await?;
                    Ok(Some(self.finish(target, log)))
                }
            },
            RunPhase::Halted => Ok(Some(self.finish(target, log))),
            RunPhase::Verified => {
                debug!(run = self.run, "Tick on verified run ignored");
                Ok(None)
            }
        }
    }

    /// Ticks until the run is verified or `shutdown` fires.
    ///
    /// On shutdown a running target is force-halted and
    /// `HarnessError::Cancelled` is returned. A closed shutdown channel is
    /// ignored.
    pub async fn drive<S, T>(
        mut self,
        target: &mut S,
        log: &mut dyn RunLog,
        ticker: &mut T,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<RunReport, HarnessError>
    where
        S: SimulatorAdapter + ?Sized,
        T: Ticker + ?Sized,
    {
        loop {
            tokio::select! {
                biased;
                Ok(()) | Err(RecvError::Lagged(_)) = shutdown.recv() => {
                    if self.phase == RunPhase::Polling {
                        target.force_halt().await?;
                    }
                    log.line(&format!("Run {} cancelled", self.run));
                    return Err(HarnessError::Cancelled);
                }
                _ = ticker.tick() => {
                    if let Some(report) = self.tick(target, log).await? {
                        return Ok(report);
                    }
                }
            }
        }
    }

    async fn begin<S>(&mut self, target: &mut S, log: &mut dyn RunLog) -> Result<(), SimulatorError>
    where
        S: SimulatorAdapter + ?Sized,
    {
        self.state.reset();
        self.termination = None;
        self.started_at = Utc::now();

        log.line(&format!(
            "Starting run {} with input: {}",
            self.run,
            self.spec.input_display()
        ));
        target.load(&self.artifact)?;
        target.start().await?;

        info!(
            run = self.run,
            artifact = %self.artifact.path.display(),
            max_polls = self.spec.max_polls,
            "Run started"
        );
        self.phase = RunPhase::Polling;
        Ok(())
    }

    /// Returns true once the target is halted, by itself or by timeout.
    async fn poll<S>(&mut self, target: &mut S, log: &mut dyn RunLog) -> Result<bool, SimulatorError>
    where
        S: SimulatorAdapter + ?Sized,
    {
        self.state.poll_count += 1;
        debug!(
            run = self.run,
            poll = self.state.poll_count,
            input_index = self.state.input_index,
            "Poll"
        );

        if self.state.poll_count > self.spec.max_polls {
            warn!(
                run = self.run,
                max_polls = self.spec.max_polls,
                "Poll budget exhausted, forcing halt"
            );
            log.line(&format!(
                "Run {}: no halt within {} polls, forcing halt",
                self.run, self.spec.max_polls
            ));
            target.force_halt().await?;
            self.termination = Some(Termination::TimedOut);
            self.phase = RunPhase::Halted;
            return Ok(true);
        }

        if target.is_halted() {
            self.termination = Some(Termination::Halted);
            self.phase = RunPhase::Halted;
            return Ok(true);
        }

        if target.is_awaiting_input() {
            let index = self.state.input_index;
            if self.feeder.has_next(index) {
                let token = self.feeder.next(index).unwrap_or_default();
                log.line(&format!("Run {}: injecting input {}", self.run, token));
                target.inject_input(token).await?;
                self.state.input_index += 1;
            } else if !self.feeder.is_null() {
                debug!(run = self.run, "Input requested but all tokens consumed");
            }
        }

        Ok(false)
    }

    /// Ends the run after a simulator error. An unavailable target is fatal.
    async fn abort<S>(
        &mut self,
        err: SimulatorError,
        target: &mut S,
        log: &mut dyn RunLog,
    ) -> Result<(), HarnessError>
    where
        S: SimulatorAdapter + ?Sized,
    {
        if matches!(err, SimulatorError::Unavailable(_)) {
            return Err(err.into());
        }
        warn!(run = self.run, error = %err, "Simulator error, ending run");
        log.line(&format!("Run {}: simulator error: {}", self.run, err));
        if let Err(e) = target.force_halt().await {
            debug!(run = self.run, error = %e, "Force halt after simulator error failed");
        }
        self.termination = Some(Termination::Aborted);
        self.phase = RunPhase::Halted;
        Ok(())
    }

    fn finish<S>(&mut self, target: &mut S, log: &mut dyn RunLog) -> RunReport
    where
        S: SimulatorAdapter + ?Sized,
    {
        let raw_output = target.read_output();
        let verification =
            OutputVerifier::verify(self.spec.expected.as_deref(), Some(raw_output.as_str()));
        let termination = self.termination.unwrap_or(Termination::Halted);
        let verdict = if verification.passed && termination != Termination::Aborted {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        log.line(&format!("Actual output:   {}", verification.actual));
        log.line(&format!("Expected output: {}", verification.expected));
        match verdict {
            Verdict::Pass => log.line(&format!("Run {}: output correct", self.run)),
            Verdict::Fail => log.line(&format!("Run {}: output INCORRECT", self.run)),
        }
        log.line(&format!(
            "Run {} completed ({}, {} polls)",
            self.run, termination, self.state.poll_count
        ));

        info!(
            run = self.run,
            verdict = %verdict,
            termination = %termination,
            polls = self.state.poll_count,
            inputs_fed = self.state.input_index,
            "Run verified"
        );

        self.phase = RunPhase::Verified;
        RunReport {
            run: self.run,
            verdict,
            termination,
            polls: self.state.poll_count,
            inputs_fed: self.state.input_index,
            inputs_supplied: self.feeder.len(),
            expected: verification.expected,
            actual: verification.actual,
            raw_output,
            started_at: self.started_at,
            completed_at: Utc::now(),
        }
    }
}
