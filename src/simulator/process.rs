//! Simulator adapter backed by external commands.
//!
//! Assembly runs an assembler command to completion. Execution spawns the
//! simulator as a child process and talks to it over pipes:
//!
//! - stdout is read by a background task into a shared transcript
//! - a stdout line equal to the input prompt marker means the simulator is
//!   blocked on its input register; the marker is not part of the output
//! - one input token is written to stdin per request, newline terminated
//! - once the simulator closes its stdin, further tokens are dropped
//!
//! Command templates accept `{source}`, `{artifact}`, `{artifact_stem}`,
//! `{input_mode}` and `{output_mode}` placeholders.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Artifact, IoModes, SimulatorAdapter};
use crate::error::SimulatorError;

/// Default stdout line announcing that the simulator waits for input.
pub const DEFAULT_INPUT_PROMPT: &str = "?INPUT";

/// A program plus argument templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parses a command line. Single and double quotes group words.
    pub fn parse(line: &str) -> Result<Self, SimulatorError> {
        let mut words = split_command_line(line)?.into_iter();
        let program = words
            .next()
            .ok_or_else(|| SimulatorError::Unavailable("empty command".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// Builds a command with every placeholder substituted.
    fn render(&self, vars: &[(&str, String)]) -> Command {
        let mut cmd = Command::new(&self.program);
        for arg in &self.args {
            let mut rendered = arg.clone();
            for (name, value) in vars {
                rendered = rendered.replace(&format!("{{{}}}", name), value);
            }
            cmd.arg(rendered);
        }
        cmd
    }
}

fn split_command_line(line: &str) -> Result<Vec<String>, SimulatorError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(SimulatorError::Unavailable(format!(
            "unterminated quote in command: {}",
            line
        )));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Configuration for [`ProcessSimulator`].
#[derive(Debug, Clone)]
pub struct ProcessSimulatorConfig {
    pub assembler: CommandTemplate,
    pub simulator: CommandTemplate,
    /// Extension of the file the assembler produces next to the source.
    pub artifact_extension: String,
    /// Side files of the assembler removed after a successful assembly.
    pub auxiliary_extensions: Vec<String>,
    pub input_prompt: String,
}

impl ProcessSimulatorConfig {
    pub fn new(assembler: CommandTemplate, simulator: CommandTemplate) -> Self {
        Self {
            assembler,
            simulator,
            artifact_extension: "mex".to_string(),
            auxiliary_extensions: vec!["lst".to_string(), "map".to_string()],
            input_prompt: DEFAULT_INPUT_PROMPT.to_string(),
        }
    }

    pub fn with_artifact_extension(mut self, ext: impl Into<String>) -> Self {
        self.artifact_extension = ext.into();
        self
    }

    pub fn with_auxiliary_extensions(mut self, exts: Vec<String>) -> Self {
        self.auxiliary_extensions = exts;
        self
    }

    pub fn with_input_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.input_prompt = prompt.into();
        self
    }
}

#[derive(Debug, Default)]
struct Transcript {
    output: String,
    awaiting: bool,
}

/// Adapter that runs the simulator as a child process.
pub struct ProcessSimulator {
    config: ProcessSimulatorConfig,
    io_modes: IoModes,
    artifact: Option<Artifact>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    transcript: Arc<Mutex<Transcript>>,
    exited: bool,
    forced: bool,
}

impl ProcessSimulator {
    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns `SimulatorError::Unavailable` if the simulator program cannot
    /// be found.
    pub fn new(config: ProcessSimulatorConfig) -> Result<Self, SimulatorError> {
        if resolve_program(&config.simulator.program).is_none() {
            return Err(SimulatorError::Unavailable(format!(
                "simulator program '{}' not found",
                config.simulator.program
            )));
        }
        Ok(Self {
            config,
            io_modes: IoModes::default(),
            artifact: None,
            child: None,
            stdin: None,
            reader: None,
            transcript: Arc::new(Mutex::new(Transcript::default())),
            exited: false,
            forced: false,
        })
    }

    fn transcript(&self) -> std::sync::MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove_auxiliary_files(&self, source: &Path) {
        for ext in &self.config.auxiliary_extensions {
            let path = source.with_extension(ext);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove assembler side file");
                }
            }
        }
    }

    fn stop_child(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Simulator process already gone");
            }
        }
        self.stdin = None;
    }
}

/// Looks a program up on disk or on `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.exists().then(|| path.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

async fn write_token(stdin: &mut ChildStdin, token: &str) -> io::Result<()> {
    stdin.write_all(token.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

fn artifact_stem(artifact: &Path) -> String {
    artifact.with_extension("").display().to_string()
}

#[async_trait]
impl SimulatorAdapter for ProcessSimulator {
    async fn assemble(&mut self, source: &Path) -> Result<Artifact, SimulatorError> {
        if !source.exists() {
            return Err(SimulatorError::MissingSource(source.to_path_buf()));
        }

        let artifact_path = source.with_extension(&self.config.artifact_extension);
        if artifact_path.exists() {
            fs::remove_file(&artifact_path)?;
        }

        let vars = [
            ("source", source.display().to_string()),
            ("artifact", artifact_path.display().to_string()),
            ("artifact_stem", artifact_stem(&artifact_path)),
        ];
        let output = self
            .config
            .assembler
            .render(&vars)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SimulatorError::AssemblyFailed {
                source_path: source.to_path_buf(),
                reason: format!("failed to spawn {}: {}", self.config.assembler.program, e),
            })?;

        if !artifact_path.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("{} not generated", artifact_path.display())
            } else {
                stderr
            };
            return Err(SimulatorError::AssemblyFailed {
                source_path: source.to_path_buf(),
                reason,
            });
        }

        self.remove_auxiliary_files(source);
        debug!(artifact = %artifact_path.display(), "Assembled");
        Ok(Artifact::new(artifact_path, source))
    }

    fn configure_io(&mut self, modes: IoModes) {
        self.io_modes = modes;
    }

    fn load(&mut self, artifact: &Artifact) -> Result<(), SimulatorError> {
        if !artifact.path.exists() {
            return Err(SimulatorError::NotLoaded);
        }
        self.artifact = Some(artifact.clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SimulatorError> {
        let artifact = self.artifact.clone().ok_or(SimulatorError::NotLoaded)?;
        self.stop_child();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        *self.transcript() = Transcript::default();
        self.exited = false;
        self.forced = false;

        let vars = [
            ("artifact", artifact.path.display().to_string()),
            ("artifact_stem", artifact_stem(&artifact.path)),
            ("source", artifact.source.display().to_string()),
            ("input_mode", self.io_modes.input.to_string()),
            ("output_mode", self.io_modes.output.to_string()),
        ];
        let mut child = self
            .config
            .simulator
            .render(&vars)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SimulatorError::Process(format!(
                    "failed to spawn {}: {}",
                    self.config.simulator.program, e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SimulatorError::Process("simulator stdout unavailable".to_string()))?;
        self.stdin = child.stdin.take();

        let transcript = Arc::clone(&self.transcript);
        let prompt = self.config.input_prompt.clone();
        self.reader = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut t = transcript
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if line.trim() == prompt {
                    t.awaiting = true;
                } else {
                    t.output.push_str(&line);
                    t.output.push('\n');
                }
            }
        }));

        info!(artifact = %artifact.path.display(), modes = %self.io_modes, "Simulator started");
        self.child = Some(child);
        Ok(())
    }

    fn is_halted(&mut self) -> bool {
        if self.forced {
            return true;
        }
        if !self.exited {
            if let Some(child) = self.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!(%status, "Simulator process exited");
                        self.exited = true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Failed to query simulator process");
                        self.exited = true;
                    }
                }
            }
        }
        // Halt is reported once trailing output has been drained.
        self.exited
            && self
                .reader
                .as_ref()
                .map(|reader| reader.is_finished())
                .unwrap_or(true)
    }

    fn is_awaiting_input(&mut self) -> bool {
        !self.forced && !self.exited && self.stdin.is_some() && self.transcript().awaiting
    }

    async fn inject_input(&mut self, token: &str) -> Result<(), SimulatorError> {
        if !self.is_awaiting_input() {
            debug!(token, "Simulator not awaiting input, token ignored");
            return Ok(());
        }
        self.transcript().awaiting = false;
        let Some(stdin) = self.stdin.as_mut() else {
            debug!(token, "Simulator stdin closed, token ignored");
            return Ok(());
        };
        match write_token(stdin, token).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(token, "Simulator stopped reading input, token ignored");
                self.stdin = None;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_output(&mut self) -> String {
        self.transcript().output.clone()
    }

    async fn force_halt(&mut self) -> Result<(), SimulatorError> {
        self.forced = true;
        self.stop_child();
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SimulatorError> {
        self.forced = true;
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Simulator process already gone");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_command_line() {
        let cmd = CommandTemplate::parse("marie-asm --quiet {source}").unwrap();
        assert_eq!(cmd.program, "marie-asm");
        assert_eq!(cmd.args, vec!["--quiet", "{source}"]);
    }

    #[test]
    fn test_parse_command_line_quotes() {
        let cmd = CommandTemplate::parse(r#"sh -c 'echo "a b"; read x'"#).unwrap();
        assert_eq!(cmd.program, "sh");
        assert_eq!(cmd.args, vec!["-c", r#"echo "a b"; read x"#]);
    }

    #[test]
    fn test_parse_command_line_errors() {
        assert!(CommandTemplate::parse("   ").is_err());
        assert!(CommandTemplate::parse("sh -c 'oops").is_err());
    }

    #[test]
    fn test_artifact_stem() {
        assert_eq!(artifact_stem(Path::new("dir/prog.mex")), "dir/prog");
    }

    #[test]
    fn test_missing_simulator_is_unavailable() {
        let config = ProcessSimulatorConfig::new(
            CommandTemplate::new("true", vec![]),
            CommandTemplate::new("definitely-not-a-simulator-binary", vec![]),
        );
        let err = ProcessSimulator::new(config).err().unwrap();
        assert!(matches!(err, SimulatorError::Unavailable(_)));
    }

    #[cfg(unix)]
    fn sh_simulator(script: &str) -> ProcessSimulator {
        let config = ProcessSimulatorConfig::new(
            CommandTemplate::parse("cp {source} {artifact}").unwrap(),
            CommandTemplate::new("sh", vec!["-c".to_string(), script.to_string()]),
        );
        ProcessSimulator::new(config).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_assemble_removes_side_files() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("prog.mas");
        fs::write(&source, "Halt").unwrap();
        fs::write(temp.path().join("prog.lst"), "listing").unwrap();
        fs::write(temp.path().join("prog.map"), "symbols").unwrap();

        let mut sim = sh_simulator("true");
        let artifact = sim.assemble(&source).await.unwrap();

        assert_eq!(artifact.path, temp.path().join("prog.mex"));
        assert!(artifact.path.exists());
        assert!(!temp.path().join("prog.lst").exists());
        assert!(!temp.path().join("prog.map").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_assemble_failure() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("bad.mas");
        fs::write(&source, "garbage").unwrap();

        let config = ProcessSimulatorConfig::new(
            CommandTemplate::new("false", vec![]),
            CommandTemplate::new("sh", vec![]),
        );
        let mut sim = ProcessSimulator::new(config).unwrap();
        let err = sim.assemble(&source).await.unwrap_err();
        assert!(matches!(err, SimulatorError::AssemblyFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_assemble_missing_source() {
        let temp = TempDir::new().unwrap();
        let mut sim = sh_simulator("true");
        let err = sim.assemble(&temp.path().join("nope.mas")).await.unwrap_err();
        assert!(matches!(err, SimulatorError::MissingSource(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_round_trip() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("mul.mas");
        fs::write(&source, "program").unwrap();

        let mut sim = sh_simulator("echo '?INPUT'; read a; echo '?INPUT'; read b; echo $((a*b))");
        let artifact = sim.assemble(&source).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();

        for token in ["3", "4"] {
            let mut waited = 0;
            while !sim.is_awaiting_input() && waited < 200 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                waited += 1;
            }
            sim.inject_input(token).await.unwrap();
        }

        let mut waited = 0;
        while !sim.is_halted() && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert!(sim.is_halted());
        assert_eq!(sim.read_output().trim(), "12");
        sim.shutdown().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_input_dropped_after_stdin_closed() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("deaf.mas");
        fs::write(&source, "program").unwrap();

        let mut sim = sh_simulator("echo '?INPUT'; exec 0<&-; sleep 1");
        let artifact = sim.assemble(&source).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();

        let mut waited = 0;
        while !sim.is_awaiting_input() && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        // Let the shell close its end of the pipe.
        tokio::time::sleep(Duration::from_millis(200)).await;

        sim.inject_input("1").await.unwrap();
        sim.inject_input("2").await.unwrap();
        assert!(!sim.is_awaiting_input());
        sim.shutdown().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_force_halt_stops_spinning_process() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("loop.mas");
        fs::write(&source, "program").unwrap();

        let mut sim = sh_simulator("while true; do sleep 1; done");
        let artifact = sim.assemble(&source).await.unwrap();
        sim.load(&artifact).unwrap();
        sim.start().await.unwrap();

        assert!(!sim.is_halted());
        sim.force_halt().await.unwrap();
        assert!(sim.is_halted());
        assert!(!sim.is_awaiting_input());
        sim.shutdown().await.unwrap();
    }
}
