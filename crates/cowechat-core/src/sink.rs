//! Observability sink injected into each client.
//!
//! The client never configures logging itself. It reports token and delivery
//! events to an [`EventSink`] handed over at construction; the default
//! [`LogSink`] forwards them to the `log` facade.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::Level;

/// Log target used by [`LogSink`].
pub const LOG_TARGET: &str = "cowechat";

/// Receiver for client events.
pub trait EventSink: fmt::Debug + Send + Sync {
    /// Record a single event.
    fn record(&self, level: Level, message: &str);

    /// Record an informational event.
    fn info(&self, message: &str) {
        self.record(Level::Info, message);
    }

    /// Record an error event.
    fn error(&self, message: &str) {
        self.record(Level::Error, message);
    }

    /// Record a debug event.
    fn debug(&self, message: &str) {
        self.record(Level::Debug, message);
    }
}

/// Sink that forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, level: Level, message: &str) {
        log::log!(target: LOG_TARGET, level, "{message}");
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEvent {
    /// Severity.
    pub level: Level,
    /// Event text.
    pub message: String,
}

/// Sink that keeps every event in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded events at the given level.
    #[must_use]
    pub fn at_level(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, level: Level, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SinkEvent {
                level,
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_events() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        sink.info("token refreshed");
        sink.error("send failed");
        sink.debug("payload");

        assert_eq!(handle.events().len(), 3);
        assert_eq!(handle.at_level(Level::Error), vec!["send failed".to_string()]);
    }
}
