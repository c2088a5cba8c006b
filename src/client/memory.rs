//! In-memory [`EventLog`] with fault injection.
//!
//! Used by engine tests and integration tests. Injected faults go through the
//! same [`RetryPolicy`] as the HTTP client, so retry behavior is observable
//! through the attempt counters.

use super::retry::{FailureAction, RetryPolicy};
use super::{EventLog, Page, PageCursor};
use crate::models::EventRecord;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Faults {
    failing_reads: u32,
    failing_appends: u32,
    reject_append_at: Option<u64>,
}

/// In-memory event log.
///
/// # Example
///
/// ```rust,ignore
/// let log = InMemoryEventLog::new();
/// log.seed("orders", records);
/// log.fail_next_reads(2);
/// ```
#[derive(Debug)]
pub struct InMemoryEventLog {
    streams: Mutex<HashMap<String, Vec<EventRecord>>>,
    faults: Mutex<Faults>,
    retry: RetryPolicy,
    read_calls: AtomicU64,
    read_attempts: AtomicU64,
    append_calls: AtomicU64,
    append_attempts: AtomicU64,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventLog {
    /// Creates an empty log that retries up to five times without delay.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::immediate(5))
    }

    /// Creates an empty log with the given retry policy.
    #[must_use]
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            retry,
            read_calls: AtomicU64::new(0),
            read_attempts: AtomicU64::new(0),
            append_calls: AtomicU64::new(0),
            append_attempts: AtomicU64::new(0),
        }
    }

    /// Creates `stream` (if needed) and appends `records`, renumbering them.
    pub fn seed(&self, stream: &str, records: impl IntoIterator<Item = EventRecord>) {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let events = streams.entry(stream.to_string()).or_default();
        for record in records {
            let number = events.len() as u64;
            events.push(record.with_stream_id(stream).with_event_number(number));
        }
    }

    /// Makes the next `n` read attempts fail with a transient error.
    pub fn fail_next_reads(&self, n: u32) {
        self.faults_mut().failing_reads = n;
    }

    /// Makes the next `n` append attempts fail with a transient error.
    pub fn fail_next_appends(&self, n: u32) {
        self.faults_mut().failing_appends = n;
    }

    /// Rejects the append call with the given zero-based index with HTTP 400.
    pub fn reject_append_at(&self, index: u64) {
        self.faults_mut().reject_append_at = Some(index);
    }

    /// Snapshot of the records stored in `stream`.
    #[must_use]
    pub fn events(&self, stream: &str) -> Vec<EventRecord> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `read_page` calls.
    #[must_use]
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::Relaxed)
    }

    /// Number of read attempts, retries included.
    #[must_use]
    pub fn read_attempts(&self) -> u64 {
        self.read_attempts.load(Ordering::Relaxed)
    }

    /// Number of `append` calls.
    #[must_use]
    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::Relaxed)
    }

    /// Number of append attempts, retries included.
    #[must_use]
    pub fn append_attempts(&self) -> u64 {
        self.append_attempts.load(Ordering::Relaxed)
    }

    fn faults_mut(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(stream: &str) -> Error {
        Error::StreamNotFound {
            stream: stream.to_string(),
        }
    }
}

impl EventLog for InMemoryEventLog {
    fn read_page(&self, stream: &str, cursor: PageCursor, page_size: usize) -> Result<Page> {
        if page_size == 0 {
            return Err(Error::InvalidInput("page size must be positive".to_string()));
        }
        self.read_calls.fetch_add(1, Ordering::Relaxed);

        self.retry.run("read_page", stream, || {
            self.read_attempts.fetch_add(1, Ordering::Relaxed);
            {
                let mut faults = self.faults_mut();
                if faults.failing_reads > 0 {
                    faults.failing_reads -= 1;
                    return Err(FailureAction::Retry("HTTP 503".to_string()));
                }
            }

            let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
            let events = streams
                .get(stream)
                .ok_or_else(|| FailureAction::Fail(Self::not_found(stream)))?;
            let start = usize::try_from(cursor.offset())
                .unwrap_or(usize::MAX)
                .min(events.len());
            let end = start.saturating_add(page_size).min(events.len());
            let records = events[start..end].to_vec();
            Ok(Page {
                next: PageCursor::at(end as u64),
                is_end: end >= events.len(),
                records,
            })
        })
    }

    fn append(&self, stream: &str, record: &EventRecord) -> Result<()> {
        let call = self.append_calls.fetch_add(1, Ordering::Relaxed);
        let event_id = record
            .event_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.retry.run("append", stream, || {
            self.append_attempts.fetch_add(1, Ordering::Relaxed);
            {
                let mut faults = self.faults_mut();
                if faults.reject_append_at == Some(call) {
                    return Err(FailureAction::Fail(Error::RejectedByService {
                        stream: stream.to_string(),
                        operation: "append".to_string(),
                        status: 400,
                        reason: "rejected by test double".to_string(),
                    }));
                }
                if faults.failing_appends > 0 {
                    faults.failing_appends -= 1;
                    return Err(FailureAction::Retry("HTTP 503".to_string()));
                }
            }

            let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
            let events = streams.entry(stream.to_string()).or_default();
            let mut stored = record.clone().with_stream_id(stream);
            stored.event_number = events.len() as u64;
            stored.event_id = Some(event_id.clone());
            events.push(stored);
            Ok(())
        })
    }

    fn stream_length(&self, stream: &str) -> Result<u64> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .map(|events| events.len() as u64)
            .ok_or_else(|| Self::not_found(stream))
    }

    fn list_streams(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(n: u64) -> Vec<EventRecord> {
        (0..n)
            .map(|i| EventRecord::from_json("Tick", &json!({ "i": i })).unwrap())
            .collect()
    }

    #[test]
    fn test_paging() {
        let log = InMemoryEventLog::new();
        log.seed("ticks", records(5));

        let first = log.read_page("ticks", PageCursor::start(), 2).unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.next, PageCursor::at(2));
        assert!(!first.is_end);

        let last = log.read_page("ticks", PageCursor::at(4), 2).unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.records[0].event_number, 4);
        assert!(last.is_end);

        let beyond = log.read_page("ticks", PageCursor::at(9), 2).unwrap();
        assert!(beyond.records.is_empty());
        assert!(beyond.is_end);
    }

    #[test]
    fn test_missing_stream() {
        let log = InMemoryEventLog::new();
        assert!(matches!(
            log.stream_length("nope"),
            Err(Error::StreamNotFound { .. })
        ));
        assert!(matches!(
            log.read_page("nope", PageCursor::start(), 1),
            Err(Error::StreamNotFound { .. })
        ));
    }

    #[test]
    fn test_transient_read_faults_are_retried() {
        let log = InMemoryEventLog::new();
        log.seed("ticks", records(1));
        log.fail_next_reads(2);

        let page = log.read_page("ticks", PageCursor::start(), 10).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(log.read_calls(), 1);
        assert_eq!(log.read_attempts(), 3);
    }

    #[test]
    fn test_append_keeps_event_id_across_retries() {
        let log = InMemoryEventLog::new();
        log.fail_next_appends(1);
        let record = records(1).remove(0);

        log.append("ticks", &record).unwrap();
        let stored = log.events("ticks");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_number, 0);
        assert!(stored[0].event_id.is_some());
        assert_eq!(log.append_attempts(), 2);
    }

    #[test]
    fn test_rejected_append_is_not_retried() {
        let log = InMemoryEventLog::new();
        log.reject_append_at(0);

        let err = log.append("ticks", &records(1)[0]).unwrap_err();
        assert!(matches!(err, Error::RejectedByService { status: 400, .. }));
        assert_eq!(log.append_attempts(), 1);
        assert!(log.events("ticks").is_empty());
    }
}
