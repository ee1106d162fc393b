//! Bounded, append-only record of every transition attempt and its outcome.
//!
//! The log behaves like a ring buffer: once [`ActivityLog::capacity`] entries
//! are stored, appending evicts the oldest one. Reads and appends are
//! serialized by an internal mutex, so the REST surface can read the log while
//! a reconciliation pass is appending to it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Number of entries kept when no explicit capacity is given.
pub const DEFAULT_CAPACITY: usize = 200;

/// What happened in a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Pause,
    Unpause,
    /// The runtime was already in the requested state.
    Skip,
    /// The cached state was refreshed from the runtime.
    Resync,
    Error,
    Started,
    Stopped,
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogAction::Pause => "pause",
            LogAction::Unpause => "unpause",
            LogAction::Skip => "skip",
            LogAction::Resync => "resync",
            LogAction::Error => "error",
            LogAction::Started => "started",
            LogAction::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// An immutable activity record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LogEntry {
    /// Seconds since the UNIX epoch.
    pub timestamp: u64,
    /// The container concerned, or `None` for monitor-wide events.
    pub container: Option<String>,
    pub action: LogAction,
    pub detail: String,
}

#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    /// Creates an empty log that keeps at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a new entry stamped with the current time and returns a copy of it.
    pub fn record(
        &self,
        container: Option<&str>,
        action: LogAction,
        detail: impl Into<String>,
    ) -> LogEntry {
        let entry = LogEntry {
            timestamp: unix_timestamp(),
            container: container.map(str::to_owned),
            action,
            detail: detail.into(),
        };
        self.push(entry.clone());
        entry
    }

    /// Appends an already built entry, evicting the oldest one on overflow.
    fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Current time as seconds since the UNIX epoch; `0` if the clock is before it.
pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_recent_is_most_recent_first() {
        let log = ActivityLog::with_capacity(10);
        log.record(Some("a"), LogAction::Pause, "first");
        log.record(Some("b"), LogAction::Unpause, "second");
        log.record(None, LogAction::Stopped, "third");

        let recent = log.recent(10);
        let details: Vec<&str> = recent.iter().map(|e| e.detail.as_str()).collect();
        assert_eq!(details, vec!["third", "second", "first"]);
        assert_eq!(recent[0].container, None);
        assert_eq!(recent[1].container.as_deref(), Some("b"));
    }

    #[test]
    fn test_recent_respects_limit() {
        let log = ActivityLog::with_capacity(10);
        for i in 0..5 {
            log.record(Some("x"), LogAction::Pause, format!("entry {i}"));
        }

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].detail, "entry 4");
        assert_eq!(recent[1].detail, "entry 3");
        assert!(log.recent(0).is_empty());
    }

    #[test]
    fn test_oldest_entries_are_evicted() {
        let log = ActivityLog::with_capacity(3);
        for i in 0..5 {
            log.record(Some("x"), LogAction::Pause, format!("entry {i}"));
        }

        assert_eq!(log.len(), 3);
        let details: Vec<String> = log.recent(10).into_iter().map(|e| e.detail).collect();
        assert_eq!(details, vec!["entry 4", "entry 3", "entry 2"]);
    }

    #[test]
    fn test_zero_capacity_keeps_latest_entry() {
        let log = ActivityLog::with_capacity(0);
        log.record(None, LogAction::Started, "one");
        log.record(None, LogAction::Stopped, "two");

        assert_eq!(log.capacity(), 1);
        assert_eq!(log.recent(5)[0].detail, "two");
    }

    #[test]
    fn test_concurrent_appends_stay_bounded() {
        let log = Arc::new(ActivityLog::with_capacity(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        log.record(Some("x"), LogAction::Skip, format!("{t}-{i}"));
                        let _ = log.recent(5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 50);
    }

    #[test]
    fn test_log_action_serializes_snake_case() {
        let value = serde_json::to_value(LogAction::Unpause).unwrap();
        assert_eq!(value, serde_json::json!("unpause"));
        assert_eq!(LogAction::Resync.to_string(), "resync");
    }
}
