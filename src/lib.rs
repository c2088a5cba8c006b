//! # Eventshuttle
//!
//! Moves event streams between an EventStoreDB-style HTTP event log and local
//! files.
//!
//! Exports page through a remote stream and write each event, in order, to a
//! raw JSON, zip or tar.xz archive. Imports read an archive lazily and append
//! each event to a remote stream in the exact order it was read.
//!
//! ## Features
//!
//! - Bounded memory: one page (export) or one record (import) at a time
//! - Capped exponential backoff for transient network faults
//! - Mandatory confirmation gate before appending to a non-empty stream
//! - Archives are finalized on every exit path, including failures
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventshuttle::client::{HttpEventLog, ClientSettings};
//! use eventshuttle::services::{TransferEngine, TransferJob};
//!
//! let log = HttpEventLog::new("http://localhost:2113", &ClientSettings::default())?;
//! let job = TransferJob::export("orders", "http://localhost:2113", "orders.tar.xz")?;
//! let report = TransferEngine::new(log).export(job, None)?;
//! println!("exported {} events", report.records);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod client;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;

pub use client::{EventLog, HttpEventLog, InMemoryEventLog, Page, PageCursor};
pub use config::ShuttleConfig;
pub use io::ContainerKind;
pub use models::EventRecord;
pub use services::{
    AppendGate, CancelToken, Decision, Direction, JobState, StreamInspector, TransferEngine,
    TransferJob, TransferReport,
};

/// Error type for eventshuttle operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `StreamNotFound` | The service answers 404/410 for a stream |
/// | `TransferFailed` | A transient fault outlived the retry budget |
/// | `RejectedByService` | The service refused a request with a non-retryable status |
/// | `UnsupportedFormat` | The file extension is not `.json`, `.zip` or `.tar.xz` |
/// | `CorruptArchive` | A container or document is malformed or truncated |
/// | `MalformedRecord` | A record is not valid JSON or misses a required field |
/// | `Blocked` | Appending to a non-empty stream was not confirmed |
/// | `Cancelled` | The job was cancelled between records |
/// | `InvalidInput` | Bad parameters from the caller |
/// | `OperationFailed` | Local I/O or configuration failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The remote stream does not exist.
    #[error("stream '{stream}' not found")]
    StreamNotFound {
        /// Stream identifier.
        stream: String,
    },

    /// A retryable fault persisted past the retry budget.
    #[error("{operation} on stream '{stream}' failed after {attempts} attempt(s): {cause}")]
    TransferFailed {
        /// Stream identifier.
        stream: String,
        /// Protocol operation (`read_page`, `append`, ...).
        operation: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last observed failure.
        cause: String,
    },

    /// The service definitively refused a request.
    ///
    /// Never retried: a malformed payload stays malformed.
    #[error("service rejected {operation} on stream '{stream}' (HTTP {status}): {reason}")]
    RejectedByService {
        /// Stream identifier.
        stream: String,
        /// Protocol operation.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        reason: String,
    },

    /// The file extension does not map to a container kind.
    #[error("unsupported file format: {path} (expected .json, .zip or .tar.xz)")]
    UnsupportedFormat {
        /// Offending path.
        path: String,
    },

    /// The container or document could not be decoded.
    #[error("corrupt archive {path}: {cause}")]
    CorruptArchive {
        /// Archive path.
        path: String,
        /// Decoder failure.
        cause: String,
    },

    /// A single record could not be decoded.
    #[error("malformed record at index {index} in {path}: {cause}")]
    MalformedRecord {
        /// Archive path.
        path: String,
        /// Zero-based record index.
        index: u64,
        /// Parse failure.
        cause: String,
    },

    /// The append gate declined writing into a non-empty stream.
    #[error("stream '{stream}' already holds {existing} event(s) and appending was not confirmed")]
    Blocked {
        /// Stream identifier.
        stream: String,
        /// Events already present.
        existing: u64,
    },

    /// The job was cancelled between records.
    #[error("transfer cancelled after {records} record(s)")]
    Cancelled {
        /// Records transferred before cancellation.
        records: u64,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A local operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Short machine-friendly name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StreamNotFound { .. } => "stream_not_found",
            Self::TransferFailed { .. } => "transfer_failed",
            Self::RejectedByService { .. } => "rejected_by_service",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::CorruptArchive { .. } => "corrupt_archive",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::Blocked { .. } => "blocked",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidInput(_) => "invalid_input",
            Self::OperationFailed { .. } => "operation_failed",
        }
    }

    /// Shorthand for [`Error::OperationFailed`].
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for eventshuttle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
