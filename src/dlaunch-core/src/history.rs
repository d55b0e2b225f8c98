//! Activation history.
//!
//! Every line is `provider-name:action-text`. The list keeps at most
//! `2 * HISTORY_SIZE` lines; once full, the oldest `HISTORY_SIZE` are
//! dropped. Re-adding one of the last `DEDUP_WINDOW` lines moves it to the
//! end instead of storing it twice.

use crate::provider::FIELD_SEPARATOR;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HISTORY_SIZE: usize = 8192;
pub const DEDUP_WINDOW: usize = 16;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write history file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
pub struct History {
    lines: Vec<String>,
    cursor: Option<usize>,
    path: Option<PathBuf>,
}

impl History {
    /// An in-memory history that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the history file at `path`; a missing file starts an empty history.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let mut history = Self {
            lines: Vec::new(),
            cursor: None,
            path: Some(path.to_path_buf()),
        };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(history),
            Err(source) => {
                return Err(HistoryError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| HistoryError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if line.is_empty() {
                continue;
            }
            history.push_line(line);
        }
        // Loading may have deduplicated or truncated; persist the canonical form.
        history.rewrite()?;
        Ok(history)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Record an activation of `text` through the provider called `provider`.
    pub fn add(&mut self, provider: &str, text: &str) -> Result<(), HistoryError> {
        self.add_line(format!("{provider}{FIELD_SEPARATOR}{text}"))
    }

    pub fn add_line(&mut self, line: String) -> Result<(), HistoryError> {
        self.cursor = None;
        match self.push_line(line) {
            Change::Appended => self.append_last(),
            Change::Rewritten => self.rewrite(),
        }
    }

    /// Step back to an older entry. Stays on the oldest one once reached.
    pub fn previous(&mut self) -> Option<&str> {
        if self.lines.is_empty() {
            return None;
        }
        let index = match self.cursor {
            None => self.lines.len() - 1,
            Some(0) => 0,
            Some(index) => index - 1,
        };
        self.cursor = Some(index);
        self.lines.get(index).map(String::as_str)
    }

    /// Step forward to a newer entry. Stays on the newest one once reached.
    pub fn next(&mut self) -> Option<&str> {
        if self.lines.is_empty() {
            return None;
        }
        let last = self.lines.len() - 1;
        let index = match self.cursor {
            None => last,
            Some(index) => (index + 1).min(last),
        };
        self.cursor = Some(index);
        self.lines.get(index).map(String::as_str)
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    /// Split a history line into provider name and text.
    pub fn split_entry(line: &str) -> Option<(&str, &str)> {
        line.split_once(FIELD_SEPARATOR)
    }

    fn push_line(&mut self, line: String) -> Change {
        let window_start = self.lines.len().saturating_sub(DEDUP_WINDOW);
        if let Some(pos) = self.lines[window_start..]
            .iter()
            .rposition(|existing| *existing == line)
        {
            let index = window_start + pos;
            let existing = self.lines.remove(index);
            self.lines.push(existing);
            return Change::Rewritten;
        }

        let mut change = Change::Appended;
        if self.lines.len() >= HISTORY_SIZE * 2 {
            self.lines.drain(..HISTORY_SIZE);
            change = Change::Rewritten;
        }
        self.lines.push(line);
        change
    }

    fn append_last(&self) -> Result<(), HistoryError> {
        let (Some(path), Some(line)) = (self.path.as_ref(), self.lines.last()) else {
            return Ok(());
        };
        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{line}")?;
            file.flush()
        };
        write(path).map_err(|source| HistoryError::Write {
            path: path.clone(),
            source,
        })
    }

    fn rewrite(&self) -> Result<(), HistoryError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let mut contents = String::new();
        for line in &self.lines {
            contents.push_str(line);
            contents.push('\n');
        }
        fs::write(path, contents).map_err(|source| HistoryError::Write {
            path: path.clone(),
            source,
        })
    }
}

enum Change {
    Appended,
    Rewritten,
}
