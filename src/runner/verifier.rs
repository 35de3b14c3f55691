//! Whitespace-insensitive output verification.
//!
//! Both sides are normalized by collapsing every run of whitespace to one
//! space and trimming the ends, then compared for exact equality. Order,
//! case and missing tokens all count as mismatches.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static WHITESPACE: OnceLock<Regex> = OnceLock::new();

fn whitespace() -> &'static Regex {
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Result of comparing one run's output with its expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub passed: bool,
    /// Normalized expected output.
    pub expected: String,
    /// Normalized actual output.
    pub actual: String,
}

/// Normalizes and compares outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputVerifier;

impl OutputVerifier {
    /// Collapses whitespace runs to one space and trims. `None` becomes empty.
    pub fn normalize(text: Option<&str>) -> String {
        match text {
            Some(text) => whitespace().replace_all(text, " ").trim().to_string(),
            None => String::new(),
        }
    }

    /// Compares normalized expected and actual outputs.
    pub fn verify(expected: Option<&str>, actual: Option<&str>) -> Verification {
        let expected = Self::normalize(expected);
        let actual = Self::normalize(actual);
        Verification {
            passed: expected == actual,
            expected,
            actual,
        }
    }
}
