//! Append-only display logs and the latest-status cell.
//!
//! The peripheral streams log lines for the lifetime of a sniff or deauth
//! run, which can be hours, so each stream is a ring capped at
//! [`DEFAULT_LOG_CAPACITY`] lines, evicting the oldest on overflow. Lines
//! are never deduplicated.

use std::collections::VecDeque;

/// Cap per log stream. Old lines are evicted beyond this.
pub const DEFAULT_LOG_CAPACITY: usize = 2000;

/// Ordered, bounded, append-only sequence of display lines.
pub struct LogStream {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogStream {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity,
        }
    }

    /// Append a line, evicting the oldest if at capacity.
    pub fn append(&mut self, line: impl Into<String>) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines oldest-first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest peripheral status, formatted `{channel}:{value}`. Overwritten on
/// every status update; no history.
#[derive(Debug, Default)]
pub struct StatusCell {
    value: Option<String>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, channel: &str, value: &str) {
        self.value = Some(format!("{channel}:{value}"));
    }

    pub fn get(&self) -> Option<String> {
        self.value.clone()
    }

    pub fn clear(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut log = LogStream::new();
        log.append("first");
        log.append("second");
        log.append("third");

        assert_eq!(log.snapshot(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_no_deduplication() {
        let mut log = LogStream::new();
        log.append("same line");
        log.append("same line");

        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = LogStream::with_capacity(3);
        for i in 1..=5 {
            log.append(format!("line {i}"));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshot(), vec!["line 3", "line 4", "line 5"]);
    }

    #[test]
    fn test_clear() {
        let mut log = LogStream::new();
        log.append("line");
        log.clear();

        assert!(log.is_empty());
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_status_cell_overwrites() {
        let mut status = StatusCell::new();
        assert_eq!(status.get(), None);

        status.set("SNIFF", "STARTED");
        assert_eq!(status.get(), Some("SNIFF:STARTED".to_string()));

        status.set("DEAUTH", "RUNNING");
        assert_eq!(status.get(), Some("DEAUTH:RUNNING".to_string()));

        status.clear();
        assert_eq!(status.get(), None);
    }
}
