//! Program selection from a path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::HarnessError;

/// How the programs of a session were selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// One program given by file path. Assembly failure aborts the session.
    Single,
    /// Every program of a directory. Assembly failure skips the program.
    Batch,
}

/// Programs selected for one session, in test order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub mode: SelectionMode,
    pub programs: Vec<PathBuf>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Selects the programs to test.
///
/// A file selects itself. A directory selects its direct child files with
/// `source_extension`, ordered by file name so that batches are reproducible.
pub fn discover_programs(path: &Path, source_extension: &str) -> Result<Selection, HarnessError> {
    if !path.exists() {
        return Err(HarnessError::MissingResource(path.to_path_buf()));
    }

    if !path.is_dir() {
        return Ok(Selection {
            mode: SelectionMode::Single,
            programs: vec![path.to_path_buf()],
        });
    }

    let mut programs = Vec::new();
    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|ext| ext == source_extension)
            .unwrap_or(false);
        if matches {
            programs.push(entry.into_path());
        }
    }

    debug!(
        dir = %path.display(),
        count = programs.len(),
        "Discovered programs"
    );

    Ok(Selection {
        mode: SelectionMode::Batch,
        programs,
    })
}
