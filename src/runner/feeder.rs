//! Input feeding policy for one run.

/// Ordered input tokens of a run.
///
/// A feeder built from `None` never yields a token, however often the target
/// asks. Once the tokens are exhausted further requests go unserviced and the
/// run ends through the target's own halt or the poll budget.
#[derive(Debug, Clone, Default)]
pub struct InputFeeder {
    tokens: Option<Vec<String>>,
}

impl InputFeeder {
    pub fn new(tokens: Option<Vec<String>>) -> Self {
        Self { tokens }
    }

    /// True if a token exists at `index`.
    pub fn has_next(&self, index: usize) -> bool {
        self.tokens
            .as_ref()
            .map(|tokens| index < tokens.len())
            .unwrap_or(false)
    }

    /// Token at `index`, if any.
    pub fn next(&self, index: usize) -> Option<&str> {
        self.tokens
            .as_ref()
            .and_then(|tokens| tokens.get(index))
            .map(String::as_str)
    }

    /// Number of tokens supplied.
    pub fn len(&self) -> usize {
        self.tokens.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the run was declared without input.
    pub fn is_null(&self) -> bool {
        self.tokens.is_none()
    }
}
