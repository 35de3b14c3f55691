//! Deterministic in-process simulator.
//!
//! A [`ScriptedSimulator`] executes a [`Script`] of steps instead of a real
//! machine program. Time only advances when the harness samples the target:
//! every `is_halted` call counts as one unit of simulated time, which is what
//! lets the polling state machine be exercised without a clock.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Artifact, IoModes, SimulatorAdapter};
use crate::error::SimulatorError;

const ARTIFACT_EXTENSION: &str = "mex";

type OutputFn = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// One instruction of a scripted program.
#[derive(Clone)]
pub enum Step {
    /// Block until one input token is injected.
    Await,
    /// Stay busy for the given number of samples.
    Busy(u32),
    /// Append fixed text to the output.
    Emit(String),
    /// Append text computed from the inputs consumed so far.
    EmitWith(OutputFn),
    /// Halt normally.
    Halt,
    /// Halt abnormally.
    Fault,
    /// Loop forever.
    Spin,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Await => write!(f, "Await"),
            Step::Busy(n) => write!(f, "Busy({})", n),
            Step::Emit(text) => write!(f, "Emit({:?})", text),
            Step::EmitWith(_) => write!(f, "EmitWith(..)"),
            Step::Halt => write!(f, "Halt"),
            Step::Fault => write!(f, "Fault"),
            Step::Spin => write!(f, "Spin"),
        }
    }
}

/// Ordered list of steps. Running off the end halts normally.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self) -> Self {
        self.steps.push(Step::Await);
        self
    }

    pub fn busy(mut self, samples: u32) -> Self {
        self.steps.push(Step::Busy(samples));
        self
    }

    pub fn emit(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::Emit(text.into()));
        self
    }

    pub fn emit_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        self.steps.push(Step::EmitWith(Arc::new(f)));
        self
    }

    pub fn halt(mut self) -> Self {
        self.steps.push(Step::Halt);
        self
    }

    pub fn fault(mut self) -> Self {
        self.steps.push(Step::Fault);
        self
    }

    pub fn spin(mut self) -> Self {
        self.steps.push(Step::Spin);
        self
    }
}

/// Observable calls made against a [`ScriptedSimulator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Assembled(PathBuf),
    IoConfigured(IoModes),
    Loaded(PathBuf),
    Started,
    Injected(String),
    InputIgnored(String),
    ForceHalted,
}

/// Terminal state of the current scripted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltKind {
    Normal,
    Abnormal,
    Forced,
}

/// In-process target that runs scripts registered per source path.
#[derive(Debug, Default)]
pub struct ScriptedSimulator {
    programs: BTreeMap<PathBuf, Script>,
    io_modes: IoModes,
    loaded: Option<Script>,
    pc: usize,
    busy_remaining: Option<u32>,
    inputs: Vec<String>,
    output: String,
    running: bool,
    awaiting: bool,
    halted: Option<HaltKind>,
    history: Vec<SimEvent>,
}

impl ScriptedSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a script for a source path. Unregistered sources fail to assemble.
    pub fn with_program(mut self, source: impl Into<PathBuf>, script: Script) -> Self {
        self.programs.insert(source.into(), script);
        self
    }

    /// Every call made against this target, in order.
    pub fn history(&self) -> &[SimEvent] {
        &self.history
    }

    /// Tokens delivered during the current run.
    pub fn consumed_inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn io_modes(&self) -> IoModes {
        self.io_modes
    }

    pub fn halt_kind(&self) -> Option<HaltKind> {
        self.halted
    }

    /// Runs steps until the script blocks, spins or halts.
    fn advance(&mut self) {
        let Some(script) = self.loaded.as_ref() else {
            return;
        };
        while self.running && self.halted.is_none() {
            match script.steps.get(self.pc) {
                None | Some(Step::Halt) => self.halted = Some(HaltKind::Normal),
                Some(Step::Fault) => self.halted = Some(HaltKind::Abnormal),
                Some(Step::Await) => {
                    self.awaiting = true;
                    return;
                }
                Some(Step::Busy(samples)) => match self.busy_remaining {
                    None if *samples == 0 => self.pc += 1,
                    None => {
                        self.busy_remaining = Some(*samples);
                        return;
                    }
                    Some(0) => {
                        self.busy_remaining = None;
                        self.pc += 1;
                    }
                    Some(_) => return,
                },
                Some(Step::Emit(text)) => {
                    self.output.push_str(text);
                    self.pc += 1;
                }
                Some(Step::EmitWith(f)) => {
                    let text = f(&self.inputs);
                    self.output.push_str(&text);
                    self.pc += 1;
                }
                Some(Step::Spin) => return,
            }
        }
    }
}

#[async_trait]
impl SimulatorAdapter for ScriptedSimulator {
    async fn assemble(&mut self, source: &Path) -> Result<Artifact, SimulatorError> {
        if !self.programs.contains_key(source) {
            return Err(SimulatorError::AssemblyFailed {
                source_path: source.to_path_buf(),
                reason: "no script registered for source".to_string(),
            });
        }
        self.history.push(SimEvent::Assembled(source.to_path_buf()));
        Ok(Artifact::new(
            source.with_extension(ARTIFACT_EXTENSION),
            source,
        ))
    }

    fn configure_io(&mut self, modes: IoModes) {
        self.io_modes = modes;
        self.history.push(SimEvent::IoConfigured(modes));
    }

    fn load(&mut self, artifact: &Artifact) -> Result<(), SimulatorError> {
        let script = self
            .programs
            .get(&artifact.source)
            .cloned()
            .ok_or(SimulatorError::NotLoaded)?;
        self.loaded = Some(script);
        self.history.push(SimEvent::Loaded(artifact.path.clone()));
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SimulatorError> {
        if self.loaded.is_none() {
            return Err(SimulatorError::NotLoaded);
        }
        self.pc = 0;
        self.busy_remaining = None;
        self.inputs.clear();
        self.output.clear();
        self.awaiting = false;
        self.halted = None;
        self.running = true;
        self.history.push(SimEvent::Started);
        self.advance();
        Ok(())
    }

    fn is_halted(&mut self) -> bool {
        if let Some(remaining) = self.busy_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        self.advance();
        self.halted.is_some()
    }

    fn is_awaiting_input(&mut self) -> bool {
        self.awaiting && self.halted.is_none()
    }

    async fn inject_input(&mut self, token: &str) -> Result<(), SimulatorError> {
        if !self.is_awaiting_input() {
            debug!(token, "Scripted target not awaiting input, token ignored");
            self.history.push(SimEvent::InputIgnored(token.to_string()));
            return Ok(());
        }
        self.inputs.push(token.to_string());
        self.history.push(SimEvent::Injected(token.to_string()));
        self.awaiting = false;
        self.pc += 1;
        self.advance();
        Ok(())
    }

    fn read_output(&mut self) -> String {
        self.output.clone()
    }

    async fn force_halt(&mut self) -> Result<(), SimulatorError> {
        if self.running && self.halted.is_none() {
            self.halted = Some(HaltKind::Forced);
        }
        self.awaiting = false;
        self.history.push(SimEvent::ForceHalted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_script() -> Script {
        Script::new()
            .read()
            .read()
            .emit_with(|inputs| {
                let product: i64 = inputs.iter().filter_map(|s| s.parse::<i64>().ok()).product();
                product.to_string()
            })
            .halt()
    }

    #[tokio::test]
    async fn test_assemble_unregistered_fails() {
        let mut sim = ScriptedSimulator::new();
        let err = sim.assemble(Path::new("nope.mas")).await.unwrap_err();
        assert!(err.is_assembly_failure());
    }

    #[tokio::test]
    async fn test_assemble_uses_artifact_extension() {
        let mut sim = ScriptedSimulator::new().with_program("p.mas", Script::new().halt());
        let artifact = sim.assemble(Path::new("p.mas")).await.unwrap();
        assert_eq!(artifact.path, PathBuf::from("p.mex"));
        assert_eq!(artifact.source, PathBuf::from("p.mas"));
    }

    #[tokio::test]
    async fn test_start_without_load_fails() {
        let mut sim = ScriptedSimulator::new();
        assert!(matches!(sim.start().await, Err(SimulatorError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_product_script_consumes_inputs() {
        let mut sim = ScriptedSimulator::new().with_program("p.mas", product_script());
        let artifact = sim.assemble(Path::new("p.mas")).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();

        assert!(sim.is_awaiting_input());
        sim.inject_input("3").await.unwrap();
        assert!(sim.is_awaiting_input());
        sim.inject_input("4").await.unwrap();

        assert!(sim.is_halted());
        assert_eq!(sim.read_output(), "12");
        assert_eq!(sim.halt_kind(), Some(HaltKind::Normal));
    }

    #[tokio::test]
    async fn test_input_ignored_when_not_awaiting() {
        let mut sim = ScriptedSimulator::new().with_program("p.mas", Script::new().busy(5).halt());
        let artifact = sim.assemble(Path::new("p.mas")).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();

        sim.inject_input("7").await.unwrap();
        assert!(sim.consumed_inputs().is_empty());
        assert!(sim
            .history()
            .contains(&SimEvent::InputIgnored("7".to_string())));
    }

    #[tokio::test]
    async fn test_busy_counts_samples() {
        let mut sim =
            ScriptedSimulator::new().with_program("p.mas", Script::new().busy(2).emit("done"));
        let artifact = sim.assemble(Path::new("p.mas")).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();

        assert!(!sim.is_halted());
        assert!(sim.is_halted());
        assert_eq!(sim.read_output(), "done");
    }

    #[tokio::test]
    async fn test_spin_until_forced() {
        let mut sim = ScriptedSimulator::new().with_program("p.mas", Script::new().spin());
        let artifact = sim.assemble(Path::new("p.mas")).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();

        for _ in 0..10 {
            assert!(!sim.is_halted());
        }
        sim.force_halt().await.unwrap();
        assert!(sim.is_halted());
        assert_eq!(sim.halt_kind(), Some(HaltKind::Forced));
    }

    #[tokio::test]
    async fn test_restart_resets_output() {
        let mut sim = ScriptedSimulator::new().with_program("p.mas", Script::new().emit("x"));
        let artifact = sim.assemble(Path::new("p.mas")).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();
        assert!(sim.is_halted());
        sim.start().await.unwrap();
        assert_eq!(sim.read_output(), "x");
    }

    #[tokio::test]
    async fn test_fault_is_terminal() {
        let mut sim = ScriptedSimulator::new().with_program("p.mas", Script::new().fault().emit("never"));
        let artifact = sim.assemble(Path::new("p.mas")).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();
        assert!(sim.is_halted());
        assert_eq!(sim.halt_kind(), Some(HaltKind::Abnormal));
        assert_eq!(sim.read_output(), "");
    }
}
