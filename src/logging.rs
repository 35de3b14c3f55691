//! Line-oriented test transcripts.
//!
//! A [`RunLog`] receives the human-readable status lines of a test session
//! (assembly result, injected inputs, run completion, verdicts). Exactly one
//! destination is active at a time; the batch coordinator redirects the log
//! to a per-program destination before testing each program.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Append-only line sink with a swappable destination.
pub trait RunLog: Send {
    /// Makes `destination` the active sink, truncating any previous content.
    fn redirect(&mut self, destination: &Path);

    /// Appends one line to the active destination and echoes it to the console.
    fn line(&mut self, text: &str);

    /// Currently active destination, if any.
    fn destination(&self) -> Option<&Path>;
}

/// Writes transcript lines to a file and echoes them through `tracing`.
///
/// When the destination cannot be opened the log keeps echoing to the
/// console only.
#[derive(Debug, Default)]
pub struct FileLog {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl FileLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunLog for FileLog {
    fn redirect(&mut self, destination: &Path) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "Failed to flush previous log destination");
            }
        }
        self.path = Some(destination.to_path_buf());
        match File::create(destination) {
            Ok(file) => self.writer = Some(BufWriter::new(file)),
            Err(e) => {
                warn!(
                    path = %destination.display(),
                    error = %e,
                    "Cannot open log file, logging to console only"
                );
            }
        }
    }

    fn line(&mut self, text: &str) {
        if let Some(writer) = self.writer.as_mut() {
            let written = writeln!(writer, "{}", text).and_then(|_| writer.flush());
            if let Err(e) = written {
                warn!(error = %e, "Failed to write log line, logging to console only");
                self.writer = None;
            }
        }
        info!(target: "sim_harness::transcript", "{}", text);
    }

    fn destination(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Keeps transcript lines in memory, grouped by destination.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    current: Option<PathBuf>,
    entries: Vec<(Option<PathBuf>, String)>,
    redirects: Vec<PathBuf>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines in write order.
    pub fn lines(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, line)| line.as_str()).collect()
    }

    /// Lines written while `destination` was active.
    pub fn lines_for(&self, destination: &Path) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(dest, _)| dest.as_deref() == Some(destination))
            .map(|(_, line)| line.as_str())
            .collect()
    }

    /// Destinations in the order they were activated.
    pub fn redirects(&self) -> &[PathBuf] {
        &self.redirects
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|(_, line)| line.contains(needle))
    }
}

impl RunLog for MemoryLog {
    fn redirect(&mut self, destination: &Path) {
        self.entries
            .retain(|(dest, _)| dest.as_deref() != Some(destination));
        self.current = Some(destination.to_path_buf());
        self.redirects.push(destination.to_path_buf());
    }

    fn line(&mut self, text: &str) {
        self.entries.push((self.current.clone(), text.to_string()));
    }

    fn destination(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_log_writes_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prog.log");

        let mut log = FileLog::new();
        log.redirect(&path);
        log.line("Assembly successful");
        log.line("Run 1 completed");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Assembly successful\nRun 1 completed\n");
        assert_eq!(log.destination(), Some(path.as_path()));
    }

    #[test]
    fn test_file_log_redirect_truncates() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a.log");
        let second = temp.path().join("b.log");
        fs::write(&second, "stale content\n").unwrap();

        let mut log = FileLog::new();
        log.redirect(&first);
        log.line("first program");
        log.redirect(&second);
        log.line("second program");

        assert_eq!(fs::read_to_string(&first).unwrap(), "first program\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "second program\n");
    }

    #[test]
    fn test_file_log_unwritable_destination() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing-dir").join("prog.log");

        let mut log = FileLog::new();
        log.redirect(&path);
        log.line("still echoed");
        assert!(!path.exists());
    }

    #[test]
    fn test_file_log_without_destination() {
        let mut log = FileLog::new();
        log.line("console only");
        assert!(log.destination().is_none());
    }

    #[test]
    fn test_memory_log_groups_by_destination() {
        let mut log = MemoryLog::new();
        log.line("preamble");
        log.redirect(Path::new("a.log"));
        log.line("a1");
        log.redirect(Path::new("b.log"));
        log.line("b1");
        log.line("b2");

        assert_eq!(log.lines(), vec!["preamble", "a1", "b1", "b2"]);
        assert_eq!(log.lines_for(Path::new("a.log")), vec!["a1"]);
        assert_eq!(log.lines_for(Path::new("b.log")), vec!["b1", "b2"]);
        assert_eq!(log.redirects().len(), 2);
        assert!(log.contains("b2"));
    }

    #[test]
    fn test_memory_log_redirect_truncates() {
        let mut log = MemoryLog::new();
        log.redirect(Path::new("a.log"));
        log.line("old");
        log.redirect(Path::new("a.log"));
        log.line("new");
        assert_eq!(log.lines_for(Path::new("a.log")), vec!["new"]);
    }
}
