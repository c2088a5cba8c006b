//! Transfer services.
//!
//! - [`StreamInspector`] checks a destination stream and asks an
//!   [`AppendGate`] before anything is appended to existing data
//! - [`TransferEngine`] runs export (event log to archive) and import
//!   (archive to event log) as streaming pipelines

mod inspector;
mod transfer;

pub use inspector::{AppendGate, Decision, FixedGate, StreamInspector};
pub use transfer::{
    CancelToken, DEFAULT_PAGE_SIZE, Direction, JobState, ProgressCallback, TransferEngine,
    TransferJob, TransferProgress, TransferReport,
};
