//! Sequencing of runs across programs.

use std::path::PathBuf;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{error, info, warn};

use super::discovery::SelectionMode;
use super::report::{BatchSummary, ProgramReport};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, SimulatorError};
use crate::logging::RunLog;
use crate::runner::{RunScheduler, RunSpec, Ticker};
use crate::simulator::{IoModes, SimulatorAdapter};

/// A program source together with the runs to perform on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramUnderTest {
    pub source: PathBuf,
    pub runs: Vec<RunSpec>,
    pub io_modes: IoModes,
}

impl ProgramUnderTest {
    pub fn new(source: impl Into<PathBuf>, runs: Vec<RunSpec>) -> Self {
        Self {
            source: source.into(),
            runs,
            io_modes: IoModes::default(),
        }
    }

    pub fn with_io_modes(mut self, io_modes: IoModes) -> Self {
        self.io_modes = io_modes;
        self
    }
}

/// Position of the coordinator within a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchState {
    /// Index of the program being tested. Equals the program count once done.
    pub program_index: usize,
    /// Number of verified runs of the current program.
    pub run_index: usize,
}

/// Tests a sequence of programs against one target, one run at a time.
///
/// The coordinator owns the target, the transcript log and the tick source
/// for its whole lifetime. Runs of a program execute in order, and the next
/// program starts only after every run of the previous one is verified.
pub struct BatchCoordinator<S, L, T> {
    target: S,
    log: L,
    ticker: T,
    config: HarnessConfig,
    state: BatchState,
    shutdown_tx: broadcast::Sender<()>,
    completed: bool,
}

impl<S, L, T> BatchCoordinator<S, L, T>
where
    S: SimulatorAdapter,
    L: RunLog,
    T: Ticker,
{
    pub fn new(target: S, log: L, ticker: T, config: HarnessConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            target,
            log,
            ticker,
            config,
            state: BatchState::default(),
            shutdown_tx,
            completed: false,
        }
    }

    /// Sender that cancels the batch. A run in flight is force-halted.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn target(&self) -> &S {
        &self.target
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Tests every program in order and returns the summary.
    ///
    /// In [`SelectionMode::Single`] an assembly failure aborts with
    /// `HarnessError::Assembly`. In batch mode the program is skipped.
    /// Completion is signalled once; calling `run` again fails with
    /// `HarnessError::AlreadyCompleted`.
    pub async fn run(
        &mut self,
        programs: &[ProgramUnderTest],
        mode: SelectionMode,
    ) -> Result<BatchSummary, HarnessError> {
        if self.completed {
            return Err(HarnessError::AlreadyCompleted);
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut summary = BatchSummary::new();
        self.state = BatchState::default();

        info!(
            programs = programs.len(),
            mode = ?mode,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting test session"
        );

        for program in programs {
            if shutdown_requested(&mut shutdown_rx) {
                warn!("Shutdown requested, stopping before next program");
                return Err(HarnessError::Cancelled);
            }

            let report = self.test_program(program, mode, &mut shutdown_rx).await?;
            summary.push(report);

            self.state.program_index += 1;
            self.state.run_index = 0;
        }

        self.completed = true;
        info!(
            programs = summary.programs.len(),
            runs = summary.runs_total,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped_programs,
            "Test session complete"
        );

        Ok(summary)
    }

    /// Releases the target.
    pub async fn close(&mut self) -> Result<(), HarnessError> {
        self.target.shutdown().await?;
        Ok(())
    }

    async fn test_program(
        &mut self,
        program: &ProgramUnderTest,
        mode: SelectionMode,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ProgramReport, HarnessError> {
        let source = program.source.clone();
        let log_path = self.config.log_path_for(&source);
        self.log.redirect(&log_path);
        self.log.line(&format!("Ready to test {}", source.display()));

        let artifact = match self.target.assemble(&source).await {
            Ok(artifact) => {
                self.log.line(&format!(
                    "Assembly of {} successful, artifact {}",
                    source.display(),
                    artifact.display_name()
                ));
                artifact
            }
            Err(SimulatorError::MissingSource(path)) => {
                self.log
                    .line(&format!("Could not find {}, skipping", path.display()));
                warn!(source = %path.display(), "Program not found, skipping");
                return Ok(ProgramReport::missing(source));
            }
            Err(e) if e.is_assembly_failure() => {
                self.log
                    .line(&format!("Assembly of {} failed: {}", source.display(), e));
                if mode == SelectionMode::Single {
                    error!(source = %source.display(), error = %e, "Assembly failed, aborting");
                    return Err(HarnessError::Assembly(e));
                }
                warn!(
                    source = %source.display(),
                    error = %e,
                    "Assembly failed, skipping program"
                );
                return Ok(ProgramReport::assembly_failed(source, e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        self.target.configure_io(program.io_modes);

        let mut runs = Vec::with_capacity(program.runs.len());
        for (index, spec) in program.runs.iter().enumerate() {
            let scheduler = RunScheduler::new(index + 1, spec.clone(), artifact.clone());
            let report = scheduler
                .drive(&mut self.target, &mut self.log, &mut self.ticker, shutdown_rx)
                .await?;
            runs.push(report);
            self.state.run_index = index + 1;
        }

        let passed = runs.iter().filter(|r| r.passed()).count();
        self.log.line(&format!(
            "Tests completed on {}: {}/{} passed",
            source.display(),
            passed,
            runs.len()
        ));

        Ok(ProgramReport::tested(source, artifact.path, runs))
    }
}

fn shutdown_requested(rx: &mut broadcast::Receiver<()>) -> bool {
    matches!(rx.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLog;
    use crate::runner::{IntervalTicker, ManualTicker};
    use crate::simulator::scripted::{HaltKind, SimEvent};
    use crate::simulator::{IoMode, Script, ScriptedSimulator};
    use std::path::Path;
    use std::time::Duration;

    fn new_coordinator(
        sim: ScriptedSimulator,
    ) -> BatchCoordinator<ScriptedSimulator, MemoryLog, ManualTicker> {
        BatchCoordinator::new(sim, MemoryLog::new(), ManualTicker::new(), HarnessConfig::new())
    }

    #[tokio::test]
    async fn test_runs_all_specs_in_order() {
        let script = Script::new().read().emit_with(|i| i.join(" ")).halt();
        let sim = ScriptedSimulator::new().with_program("echo.mas", script);
        let mut coordinator = new_coordinator(sim);
        let program = ProgramUnderTest::new(
            "echo.mas",
            vec![
                RunSpec::new(3).with_input_line("1").with_expected("1"),
                RunSpec::new(3).with_input_line("2").with_expected("2"),
            ],
        );

        let summary = coordinator
            .run(&[program], SelectionMode::Single)
            .await
            .unwrap();

        assert_eq!(summary.runs_total, 2);
        assert!(summary.all_passed());
        let runs: Vec<_> = summary.programs[0].runs.iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![1, 2]);
        assert_eq!(
            coordinator.state(),
            BatchState {
                program_index: 1,
                run_index: 0
            }
        );
        assert!(coordinator.is_completed());
    }

    #[tokio::test]
    async fn test_log_redirected_per_program() {
        let sim = ScriptedSimulator::new()
            .with_program("a.mas", Script::new().halt())
            .with_program("b.mas", Script::new().halt());
        let mut coordinator = new_coordinator(sim);
        let programs = vec![
            ProgramUnderTest::new("a.mas", vec![RunSpec::new(2)]),
            ProgramUnderTest::new("b.mas", vec![RunSpec::new(2)]),
        ];

        coordinator.run(&programs, SelectionMode::Batch).await.unwrap();

        let log = coordinator.log();
        assert_eq!(
            log.redirects(),
            &[PathBuf::from("a.log"), PathBuf::from("b.log")]
        );
        assert!(log.lines_for(Path::new("a.log"))[0].contains("Ready to test a.mas"));
        assert!(log
            .lines_for(Path::new("b.log"))
            .iter()
            .any(|l| l.contains("Tests completed on b.mas")));
    }

    #[tokio::test]
    async fn test_single_mode_assembly_failure_aborts() {
        let mut coordinator = new_coordinator(ScriptedSimulator::new());
        let program = ProgramUnderTest::new("broken.mas", vec![RunSpec::new(2)]);

        let err = coordinator
            .run(&[program], SelectionMode::Single)
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Assembly(_)));
        assert!(coordinator.log().contains("Assembly of broken.mas failed"));
        assert!(!coordinator.is_completed());
    }

    #[tokio::test]
    async fn test_io_modes_configured_before_first_run() {
        let sim = ScriptedSimulator::new().with_program("hex.mas", Script::new().halt());
        let mut coordinator = new_coordinator(sim);
        let modes = IoModes {
            input: IoMode::Hex,
            output: IoMode::Ascii,
        };
        let program =
            ProgramUnderTest::new("hex.mas", vec![RunSpec::new(2)]).with_io_modes(modes);

        coordinator.run(&[program], SelectionMode::Single).await.unwrap();

        let history = coordinator.target().history();
        let configured = history
            .iter()
            .position(|e| *e == SimEvent::IoConfigured(modes))
            .unwrap();
        let started = history.iter().position(|e| *e == SimEvent::Started).unwrap();
        assert!(configured < started);
        assert_eq!(coordinator.target().io_modes(), modes);
    }

    #[tokio::test]
    async fn test_second_run_rejected() {
        let sim = ScriptedSimulator::new().with_program("a.mas", Script::new().halt());
        let mut coordinator = new_coordinator(sim);
        let programs = vec![ProgramUnderTest::new("a.mas", vec![RunSpec::new(2)])];

        coordinator.run(&programs, SelectionMode::Single).await.unwrap();
        let err = coordinator
            .run(&programs, SelectionMode::Single)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::AlreadyCompleted));
    }

    #[tokio::test]
    async fn test_empty_batch_completes() {
        let mut coordinator = new_coordinator(ScriptedSimulator::new());
        let summary = coordinator.run(&[], SelectionMode::Batch).await.unwrap();
        assert!(summary.programs.is_empty());
        assert!(coordinator.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_force_halts_run_in_flight() {
        let sim = ScriptedSimulator::new().with_program("loop.mas", Script::new().spin());
        let config = HarnessConfig::new();
        let ticker = IntervalTicker::new(config.poll_interval, Duration::ZERO);
        let mut coordinator = BatchCoordinator::new(sim, MemoryLog::new(), ticker, config);
        let handle = coordinator.shutdown_handle();
        let programs = vec![ProgramUnderTest::new("loop.mas", vec![RunSpec::new(50)])];

        let task = tokio::spawn(async move {
            let result = coordinator.run(&programs, SelectionMode::Single).await;
            (result, coordinator)
        });

        tokio::time::sleep(Duration::from_millis(5000)).await;
        handle.send(()).unwrap();
        let (result, coordinator) = task.await.unwrap();

        assert!(matches!(result, Err(HarnessError::Cancelled)));
        assert_eq!(coordinator.target().halt_kind(), Some(HaltKind::Forced));
        assert!(coordinator.log().contains("Run 1 cancelled"));
        assert!(!coordinator.is_completed());
    }
}
