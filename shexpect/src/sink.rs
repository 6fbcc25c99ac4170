//! Session transcripts.
//!
//! Every line sent to or received from a session can be recorded as
//! `"<prefix><name>: <line>"`, with `>>` marking input and `<<` output.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::Level;

use crate::channel::filter::split_lines;

/// `log` target used by [`LogSink::Log`].
pub const TRANSCRIPT_TARGET: &str = "shexpect::transcript";

/// Prefix of lines sent to the session.
pub const SENT: &str = ">>";

/// Prefix of lines received from the session.
pub const RECEIVED: &str = "<<";

/// Where a session's transcript goes.
#[derive(Clone, Default)]
pub enum LogSink {
    /// Nothing is recorded.
    #[default]
    Disabled,

    /// Each line goes to the `log` facade at the given level.
    Log(Level),

    /// Each line is handed to a callback.
    Forward(Arc<dyn Fn(&str) + Send + Sync>),

    /// Lines are kept in memory; see [`LogSink::records`].
    Store(Arc<Mutex<Vec<String>>>),
}

impl LogSink {
    /// A sink that forwards lines to `callback`.
    pub fn forward<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        LogSink::Forward(Arc::new(callback))
    }

    /// An empty in-memory sink.
    pub fn store() -> Self {
        LogSink::Store(Arc::default())
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, LogSink::Disabled)
    }

    /// Record `data` one line at a time.
    pub fn write(&self, prefix: &str, name: &str, data: &str) {
        if !self.is_enabled() {
            return;
        }
        for line in split_lines(data) {
            let record = format!("{prefix}{name}: {line}");
            match self {
                LogSink::Disabled => {}
                LogSink::Log(level) => log::log!(target: TRANSCRIPT_TARGET, *level, "{record}"),
                LogSink::Forward(callback) => callback(&record),
                LogSink::Store(records) => records
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(record),
            }
        }
    }

    /// Everything stored so far, newline separated.
    ///
    /// `None` unless this is a [`LogSink::Store`].
    pub fn records(&self) -> Option<String> {
        match self {
            LogSink::Store(records) => Some(
                records
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .join("\n"),
            ),
            _ => None,
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Disabled => f.write_str("Disabled"),
            LogSink::Log(level) => f.debug_tuple("Log").field(level).finish(),
            LogSink::Forward(_) => f.write_str("Forward(..)"),
            LogSink::Store(records) => f
                .debug_tuple("Store")
                .field(&records.lock().map(|r| r.len()).unwrap_or_default())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store() {
        let sink = LogSink::store();
        sink.write(SENT, "sh", "ls -l");
        sink.write(RECEIVED, "sh", "a\r\nb\r\n");
        assert_eq!(
            sink.records().unwrap(),
            ">>sh: ls -l\n<<sh: a\n<<sh: b"
        );

        // Clones share the same store
        let clone = sink.clone();
        clone.write(SENT, "sh", "pwd");
        assert!(sink.records().unwrap().ends_with(">>sh: pwd"));
    }

    #[test]
    fn test_forward() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            LogSink::forward(move |line| seen.lock().unwrap().push(line.to_string()))
        };
        sink.write(RECEIVED, "box", "one\ntwo");
        assert_eq!(*seen.lock().unwrap(), ["<<box: one", "<<box: two"]);
        assert_eq!(sink.records(), None);
    }

    #[test]
    fn test_disabled() {
        let sink = LogSink::default();
        assert!(!sink.is_enabled());
        sink.write(SENT, "x", "ignored");
        assert_eq!(sink.records(), None);
        assert_eq!(format!("{sink:?}"), "Disabled");
    }
}
