//! Core traits for archive reading and writing.
//!
//! Defines the [`RecordSource`] and [`RecordSink`] traits that container
//! adapters implement.

use crate::Result;
use crate::models::EventRecord;

/// Lazy, forward-only source of event records.
///
/// Implementations decode incrementally so that arbitrarily large archives
/// are never loaded into memory at once.
///
/// # Example Implementation
///
/// ```rust,ignore
/// impl RecordSource for LineSource {
///     fn next(&mut self) -> Result<Option<EventRecord>> {
///         // Read next line, parse JSON, return record
///     }
///
///     fn position(&self) -> u64 {
///         self.index
///     }
/// }
/// ```
pub trait RecordSource {
    /// Reads the next record.
    ///
    /// Returns `Ok(None)` when the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedRecord`] for an undecodable record and
    /// [`crate::Error::CorruptArchive`] for a truncated or broken container.
    fn next(&mut self) -> Result<Option<EventRecord>>;

    /// Number of records yielded so far, which is also the index of the next
    /// record.
    fn position(&self) -> u64;
}

/// Sink for exported records.
///
/// # Lifecycle
///
/// 1. Open the sink for a path and container kind
/// 2. Call `write()` for each record, in stream order
/// 3. Call `finalize()` exactly once, on success and on failure alike
pub trait RecordSink {
    /// Writes a single record and returns the number of uncompressed bytes
    /// it occupied.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or I/O fails.
    fn write(&mut self, record: &EventRecord) -> Result<u64>;

    /// Writes container trailers and flushes.
    ///
    /// After this returns `Ok`, the file on disk is a complete, valid
    /// container holding every record written so far.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails; the partial file is left in place.
    fn finalize(self: Box<Self>) -> Result<()>;
}
