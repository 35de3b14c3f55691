//! Test suite documents.
//!
//! A suite lists the runs to perform on every program of a session, in
//! order, along with the I/O modes of the target.
//!
//! ```yaml
//! name: multiply
//! input_mode: dec
//! output_mode: dec
//! max_polls: 3
//! runs:
//!   - input: "3 4"
//!     expected: "12"
//!   - input: [5, 0]
//!     expected: 0
//!     max_polls: 5
//!   - input: null
//!     expected: null
//! ```
//!
//! A run's input is either one whitespace-separated line or a list of
//! tokens. Numbers and booleans are accepted wherever text is and are fed in
//! decimal. Suites with a `hex` mode must quote their values, since YAML
//! reads `0x0C` as the number 12.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::batch::ProgramUnderTest;
use crate::error::HarnessError;
use crate::runner::{split_input, RunSpec};
use crate::simulator::{IoMode, IoModes};

/// Scalar value written as text, a number or a boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Token {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Token {
    /// True if YAML parsed the value as a number.
    pub fn is_number(&self) -> bool {
        matches!(self, Token::Integer(_) | Token::Float(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{}", n),
            Token::Float(x) => write!(f, "{}", x),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Input of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    /// Explicit tokens, fed one per request.
    Tokens(Vec<Token>),
    /// One line, split on whitespace.
    Line(Token),
}

impl InputSpec {
    pub fn tokens(&self) -> Vec<String> {
        match self {
            InputSpec::Tokens(tokens) => tokens.iter().map(Token::to_string).collect(),
            InputSpec::Line(line) => split_input(&line.to_string()),
        }
    }

    fn values(&self) -> &[Token] {
        match self {
            InputSpec::Tokens(tokens) => tokens,
            InputSpec::Line(line) => std::slice::from_ref(line),
        }
    }
}

/// One run entry of a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteRun {
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default)]
    pub expected: Option<Token>,
    #[serde(default)]
    pub max_polls: Option<u32>,
}

/// A suite document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input_mode: IoMode,
    #[serde(default)]
    pub output_mode: IoMode,
    /// Poll budget of runs that do not set their own.
    #[serde(default)]
    pub max_polls: Option<u32>,
    pub runs: Vec<SuiteRun>,
}

impl Suite {
    /// Parses a suite from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, HarnessError> {
        let suite: Suite = serde_yaml::from_str(content)?;
        Ok(suite)
    }

    /// Reads and parses a suite file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HarnessError::MissingResource(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| HarnessError::Suite(format!("{}: {}", path.display(), e)))
    }

    /// Checks that the suite has runs, every run has a usable poll budget,
    /// and hex-mode values are quoted.
    pub fn validate(&self, default_max_polls: u32) -> Result<(), HarnessError> {
        if self.runs.is_empty() {
            return Err(HarnessError::Suite("suite has no runs".to_string()));
        }
        for (index, run) in self.runs.iter().enumerate() {
            if self.effective_max_polls(run, default_max_polls) == 0 {
                return Err(HarnessError::Suite(format!(
                    "run {} has max_polls 0",
                    index + 1
                )));
            }
            if self.input_mode == IoMode::Hex {
                let inputs = run.input.as_ref().map(InputSpec::values).unwrap_or(&[]);
                if let Some(token) = inputs.iter().find(|t| t.is_number()) {
                    return Err(unquoted_hex(index, "input", token));
                }
            }
            if self.output_mode == IoMode::Hex {
                if let Some(token) = run.expected.as_ref().filter(|t| t.is_number()) {
                    return Err(unquoted_hex(index, "expected output", token));
                }
            }
        }
        Ok(())
    }

    pub fn io_modes(&self) -> IoModes {
        IoModes {
            input: self.input_mode,
            output: self.output_mode,
        }
    }

    /// Run specifications in suite order.
    pub fn run_specs(&self, default_max_polls: u32) -> Vec<RunSpec> {
        self.runs
            .iter()
            .map(|run| RunSpec {
                input: run.input.as_ref().map(InputSpec::tokens),
                expected: run.expected.as_ref().map(Token::to_string),
                max_polls: self.effective_max_polls(run, default_max_polls),
            })
            .collect()
    }

    /// Applies the suite to one program source.
    pub fn program(&self, source: &Path, default_max_polls: u32) -> ProgramUnderTest {
        ProgramUnderTest::new(source, self.run_specs(default_max_polls))
            .with_io_modes(self.io_modes())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed suite")
    }

    fn effective_max_polls(&self, run: &SuiteRun, default_max_polls: u32) -> u32 {
        run.max_polls
            .or(self.max_polls)
            .unwrap_or(default_max_polls)
    }
}

fn unquoted_hex(index: usize, field: &str, token: &Token) -> HarnessError {
    HarnessError::Suite(format!(
        "run {}: {} {} is an unquoted number in a hex suite, write it as a quoted string",
        index + 1,
        field,
        token
    ))
}
