//! Destination checks before writing into a remote stream.

use crate::client::EventLog;
use crate::{Error, Result};

/// Collaborator that decides whether records may be appended to a stream
/// that already holds data.
pub trait AppendGate {
    /// Returns `true` to allow appending after `existing` events.
    fn confirm_append(&mut self, stream: &str, existing: u64) -> bool;
}

impl<F> AppendGate for F
where
    F: FnMut(&str, u64) -> bool,
{
    fn confirm_append(&mut self, stream: &str, existing: u64) -> bool {
        self(stream, existing)
    }
}

/// Gate with a fixed answer, for non-interactive runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedGate(pub bool);

impl AppendGate for FixedGate {
    fn confirm_append(&mut self, _stream: &str, _existing: u64) -> bool {
        self.0
    }
}

/// Outcome of [`StreamInspector::check_before_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The stream is missing or empty.
    ProceedEmpty,
    /// The stream holds this many events and appending was confirmed.
    ProceedAppend(u64),
    /// The stream holds this many events and appending was declined.
    Blocked {
        /// Events already present.
        existing: u64,
    },
}

/// Queries stream existence and length, and gates writes into non-empty
/// streams.
pub struct StreamInspector<L: EventLog> {
    log: L,
}

impl<L: EventLog> StreamInspector<L> {
    /// Creates an inspector over `log`.
    pub const fn new(log: L) -> Self {
        Self { log }
    }

    /// Number of events in `stream`, with a missing stream counted as empty.
    ///
    /// # Errors
    ///
    /// Returns any client error other than [`Error::StreamNotFound`].
    pub fn existing_events(&self, stream: &str) -> Result<u64> {
        match self.log.stream_length(stream) {
            Ok(n) => Ok(n),
            Err(Error::StreamNotFound { .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Decides whether records may be written into `stream`.
    ///
    /// The gate is consulted only when the stream already holds events.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream length cannot be determined.
    pub fn check_before_write(&self, stream: &str, gate: &mut dyn AppendGate) -> Result<Decision> {
        let existing = self.existing_events(stream)?;
        if existing == 0 {
            return Ok(Decision::ProceedEmpty);
        }

        let decision = if gate.confirm_append(stream, existing) {
            Decision::ProceedAppend(existing)
        } else {
            Decision::Blocked { existing }
        };
        tracing::info!(stream, existing, ?decision, "Checked destination stream");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryEventLog;
    use crate::models::EventRecord;
    use serde_json::json;

    fn seeded(n: u64) -> InMemoryEventLog {
        let log = InMemoryEventLog::new();
        log.seed(
            "orders",
            (0..n).map(|i| EventRecord::from_json("T", &json!(i)).unwrap()),
        );
        log
    }

    #[test]
    fn test_missing_stream_proceeds_without_asking() {
        let log = InMemoryEventLog::new();
        let mut asked = false;
        let mut gate = |_: &str, _: u64| {
            asked = true;
            false
        };
        let decision = StreamInspector::new(&log)
            .check_before_write("orders", &mut gate)
            .unwrap();
        assert_eq!(decision, Decision::ProceedEmpty);
        assert!(!asked);
    }

    #[test]
    fn test_empty_stream_proceeds() {
        let decision = StreamInspector::new(seeded(0))
            .check_before_write("orders", &mut FixedGate(false))
            .unwrap();
        assert_eq!(decision, Decision::ProceedEmpty);
    }

    #[test]
    fn test_non_empty_stream_asks_gate() {
        let log = seeded(3);
        let inspector = StreamInspector::new(&log);

        let mut seen = None;
        let mut gate = |stream: &str, existing: u64| {
            seen = Some((stream.to_string(), existing));
            true
        };
        assert_eq!(
            inspector.check_before_write("orders", &mut gate).unwrap(),
            Decision::ProceedAppend(3)
        );
        assert_eq!(seen, Some(("orders".to_string(), 3)));

        assert_eq!(
            inspector
                .check_before_write("orders", &mut FixedGate(false))
                .unwrap(),
            Decision::Blocked { existing: 3 }
        );
    }
}
