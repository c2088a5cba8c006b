//! Event log client.
//!
//! Thin protocol layer over an append-only event log service.
//!
//! # Architecture
//!
//! ```text
//! TransferEngine / StreamInspector
//!            |
//!            v
//!     dyn EventLog ----+---- HttpEventLog     (Atom HTTP API, reqwest)
//!                      +---- InMemoryEventLog (test double)
//!            |
//!            v
//!       RetryPolicy (capped exponential backoff)
//! ```
//!
//! Transient faults are retried inside the client; every other failure is
//! surfaced to the caller unchanged.

mod atom;
mod http;
mod memory;
pub mod retry;

pub use http::HttpEventLog;
pub use memory::InMemoryEventLog;
pub use retry::{FailureAction, RetryPolicy};

use crate::Result;
use crate::models::EventRecord;
use std::sync::Arc;
use std::time::Duration;

/// Offset (next event number) from which the next page is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PageCursor(u64);

impl PageCursor {
    /// Cursor at the beginning of a stream.
    #[must_use]
    pub const fn start() -> Self {
        Self(0)
    }

    /// Cursor at the given event number.
    #[must_use]
    pub const fn at(offset: u64) -> Self {
        Self(offset)
    }

    /// Event number of the next record to read.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0
    }
}

/// One page of a forward read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Records in ascending event-number order.
    pub records: Vec<EventRecord>,
    /// Cursor for the following page.
    pub next: PageCursor,
    /// Whether this is the last page of the stream.
    pub is_end: bool,
}

/// Protocol operations against the remote event log.
///
/// Implementations must be safe to share with a prefetch worker thread.
pub trait EventLog: Send + Sync {
    /// Reads up to `page_size` records starting at `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StreamNotFound`] for a missing stream and
    /// [`crate::Error::TransferFailed`] once transient failures exhaust the
    /// retry budget.
    fn read_page(&self, stream: &str, cursor: PageCursor, page_size: usize) -> Result<Page>;

    /// Appends a single record to the end of `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RejectedByService`] when the service refuses
    /// the record and [`crate::Error::TransferFailed`] once transient
    /// failures exhaust the retry budget.
    fn append(&self, stream: &str, record: &EventRecord) -> Result<()>;

    /// Returns the number of records currently in `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StreamNotFound`] for a missing stream.
    fn stream_length(&self, stream: &str) -> Result<u64>;

    /// Lists the names of all user streams known to the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be read.
    fn list_streams(&self) -> Result<Vec<String>>;
}

impl<T: EventLog + ?Sized> EventLog for &T {
    fn read_page(&self, stream: &str, cursor: PageCursor, page_size: usize) -> Result<Page> {
        (**self).read_page(stream, cursor, page_size)
    }

    fn append(&self, stream: &str, record: &EventRecord) -> Result<()> {
        (**self).append(stream, record)
    }

    fn stream_length(&self, stream: &str) -> Result<u64> {
        (**self).stream_length(stream)
    }

    fn list_streams(&self) -> Result<Vec<String>> {
        (**self).list_streams()
    }
}

impl<T: EventLog + ?Sized> EventLog for Arc<T> {
    fn read_page(&self, stream: &str, cursor: PageCursor, page_size: usize) -> Result<Page> {
        (**self).read_page(stream, cursor, page_size)
    }

    fn append(&self, stream: &str, record: &EventRecord) -> Result<()> {
        (**self).append(stream, record)
    }

    fn stream_length(&self, stream: &str) -> Result<u64> {
        (**self).stream_length(stream)
    }

    fn list_streams(&self) -> Result<Vec<String>> {
        (**self).list_streams()
    }
}

/// Settings for refreshing the `$streams` projection before listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSettings {
    /// Whether to run the projection before listing streams.
    pub refresh: bool,
    /// Delay between progress polls.
    pub poll_interval: Duration,
    /// Maximum number of progress polls before listing anyway.
    pub max_polls: u32,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            refresh: true,
            poll_interval: Duration::from_millis(250),
            max_polls: 120,
        }
    }
}

/// Connection settings for [`HttpEventLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Stream listing behavior.
    pub projection: ProjectionSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            projection: ProjectionSettings::default(),
        }
    }
}
