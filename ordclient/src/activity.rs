//! User-facing activity log
//!
//! A bounded buffer of human-readable lines. Lines generated locally are
//! appended with a timestamp; the backend's own log tail replaces the whole
//! buffer, but only when its line count changed since the last refresh.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

/// Prefix marking a locally generated error line
pub const ERROR_MARKER: &str = "ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySource {
    Local,
    Backend,
}

/// One line of the activity log
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    /// Generation time of a local line; backend lines carry their own
    pub timestamp: Option<DateTime<Local>>,
    pub level: ActivityLevel,
    pub source: ActivitySource,
    pub message: String,
}

impl ActivityEntry {
    pub fn is_error(&self) -> bool {
        self.level == ActivityLevel::Error
    }
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.timestamp {
            Some(ts) => write!(f, "{}  {}", ts.format("%H:%M:%S"), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Level of a line taken from the backend log file
pub fn classify_backend_line(line: &str) -> ActivityLevel {
    if line.contains("[ERROR]") {
        ActivityLevel::Error
    } else if line.contains("[WARNING]") {
        ActivityLevel::Warning
    } else {
        ActivityLevel::Info
    }
}

/// Bounded activity buffer
#[derive(Debug)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
    last_backend_count: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            last_backend_count: 0,
        }
    }

    fn push(&mut self, entry: ActivityEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Append a locally generated line, stamped now
    pub fn push_local(&mut self, message: impl Into<String>) -> &ActivityEntry {
        let message = message.into();
        let level = if message.starts_with(ERROR_MARKER) {
            ActivityLevel::Error
        } else {
            ActivityLevel::Info
        };
        self.push(ActivityEntry {
            timestamp: Some(Local::now()),
            level,
            source: ActivitySource::Local,
            message,
        });
        // push always leaves at least one entry
        &self.entries[self.entries.len() - 1]
    }

    /// Append an error line with the error marker
    pub fn push_error(&mut self, message: impl fmt::Display) -> &ActivityEntry {
        self.push_local(format!("{}: {}", ERROR_MARKER, message))
    }

    /// Replace the buffer with the backend's log tail
    ///
    /// Returns `false` without touching anything when the backend reports
    /// the same number of lines as last time.
    pub fn replace_from_backend(&mut self, lines: Vec<String>) -> bool {
        if lines.len() == self.last_backend_count {
            return false;
        }
        self.last_backend_count = lines.len();
        self.entries.clear();
        for line in lines {
            self.push(ActivityEntry {
                timestamp: None,
                level: classify_backend_line(&line),
                source: ActivitySource::Backend,
                message: line,
            });
        }
        true
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<ActivityEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&ActivityEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
