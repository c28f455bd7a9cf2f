//! Log storage for simulated process output.
//!
//! Each project owns a capped `LogBuffer`; the `LogStore` maps project ids to buffers and
//! hands out entry ids. Generated text passes through `sanitize_text` before it is stored.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use strip_ansi_escapes::strip;

use crate::project::ProjectId;

/// Default number of entries kept per project.
pub const DEFAULT_MAX_LINES: usize = 500;

/// Severity tag of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
    Success,
}

/// A single line of simulated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: u64,
    pub at: DateTime<Utc>,
    pub text: String,
    pub severity: Severity,
}

/// A fixed-capacity ring buffer for storing `LogEntry`s.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    /// Creates a new `LogBuffer` with the specified maximum capacity.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            entries: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds an entry to the buffer, dropping the oldest entries past the cap.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_lines {
            self.entries.pop_front();
        }
    }

    /// Returns the number of entries currently in the buffer.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns an iterator over the entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

/// Per-project log buffers.
#[derive(Debug)]
pub struct LogStore {
    max_lines: usize,
    next_id: u64,
    buffers: HashMap<ProjectId, LogBuffer>,
}

impl LogStore {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            next_id: 1,
            buffers: HashMap::new(),
        }
    }

    /// Appends a new entry stamped with the current time, evicting the oldest past the cap.
    pub fn append(&mut self, id: &ProjectId, text: impl Into<String>, severity: Severity) -> u64 {
        let entry_id = self.next_id;
        self.next_id += 1;
        let max_lines = self.max_lines;
        self.buffers
            .entry(id.clone())
            .or_insert_with(|| LogBuffer::new(max_lines))
            .push(LogEntry {
                id: entry_id,
                at: Utc::now(),
                text: text.into(),
                severity,
            });
        entry_id
    }

    /// Returns the full ordered sequence for a project, empty if it has never logged.
    pub fn read(&self, id: &ProjectId) -> Vec<LogEntry> {
        self.iter(id).cloned().collect()
    }

    /// Iterates a project's entries without copying them.
    pub fn iter<'a>(&'a self, id: &ProjectId) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.buffers.get(id).into_iter().flat_map(|buffer| buffer.iter())
    }

    pub fn len(&self, id: &ProjectId) -> usize {
        self.buffers.get(id).map(LogBuffer::len).unwrap_or(0)
    }

    pub fn last(&self, id: &ProjectId) -> Option<&LogEntry> {
        self.buffers.get(id).and_then(|buffer| buffer.entries.back())
    }

    /// Drops a project's buffer.
    pub fn remove(&mut self, id: &ProjectId) {
        self.buffers.remove(id);
    }
}

/// Sanitizes text for display, optionally stripping ANSI escape codes.
///
/// If `strip_ansi` is true, ANSI codes are removed. Invalid UTF-8 sequences are replaced.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}
