//! Immutable description of one run.

use serde::{Deserialize, Serialize};

/// Inputs, expected output and poll budget of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Tokens to feed on request. `None` means no input is ever injected.
    #[serde(default)]
    pub input: Option<Vec<String>>,
    /// Expected output. `None` means no output is expected.
    #[serde(default)]
    pub expected: Option<String>,
    /// Number of polling ticks before the run is force-halted.
    pub max_polls: u32,
}

impl RunSpec {
    /// Creates a run with no input and no expected output.
    pub fn new(max_polls: u32) -> Self {
        Self {
            input: None,
            expected: None,
            max_polls,
        }
    }

    /// Sets the input from a whitespace-delimited line.
    pub fn with_input_line(mut self, line: &str) -> Self {
        self.input = Some(split_input(line));
        self
    }

    /// Sets the input tokens.
    pub fn with_inputs<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input = Some(tokens.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the expected output.
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Input rendered for log lines.
    pub fn input_display(&self) -> String {
        match &self.input {
            Some(tokens) => tokens.join(" "),
            None => "(none)".to_string(),
        }
    }
}

/// Splits an input line into tokens. Empty tokens are never produced.
pub fn split_input(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
