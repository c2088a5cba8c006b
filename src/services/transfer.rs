//! Transfer engine.
//!
//! Export and import run as two symmetric streaming pipelines:
//!
//! ```text
//! Export: EventLog::read_page --> page --> RecordSink::write    (per record)
//! Import: RecordSource::next  --> record --> EventLog::append   (per record)
//! ```
//!
//! # Job Lifecycle
//!
//! ```text
//! Init --> Validating --> Transferring --> Completed
//!              |               |
//!              +--> Aborted <--+
//! ```
//!
//! Export sinks are finalized on every exit path, so an aborted export leaves
//! a valid container holding the records written before the failure.

use super::inspector::{AppendGate, Decision, StreamInspector};
use crate::client::{EventLog, Page, PageCursor};
use crate::io::{ContainerKind, RecordSink, RecordSource, open_reader, open_writer};
use crate::models::EventRecord;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Records requested per read when no page size is configured.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Event log to archive.
    Export,
    /// Archive to event log.
    Import,
}

impl Direction {
    /// Returns the direction as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Import => "import",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a [`TransferJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Created, nothing checked yet.
    Init,
    /// Checking the stream and opening files.
    Validating,
    /// Moving records.
    Transferring,
    /// All records moved.
    Completed,
    /// Stopped by an error or cancellation.
    Aborted,
}

impl JobState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Validating)
                | (Self::Validating, Self::Transferring | Self::Aborted)
                | (Self::Transferring, Self::Completed | Self::Aborted)
        )
    }

    /// Whether the state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// One export or import run.
///
/// Owned by the engine for the duration of the run.
#[derive(Debug, Clone)]
pub struct TransferJob {
    direction: Direction,
    stream: String,
    address: String,
    path: PathBuf,
    kind: ContainerKind,
    page_size: usize,
    state: JobState,
    records: u64,
    bytes: u64,
}

impl TransferJob {
    /// Creates an export job; the container kind is inferred from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty stream name or an unsupported extension.
    pub fn export(
        stream: impl Into<String>,
        address: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::new(Direction::Export, stream.into(), address.into(), path.into())
    }

    /// Creates an import job; the container kind is inferred from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty stream name or an unsupported extension.
    pub fn import(
        stream: impl Into<String>,
        address: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::new(Direction::Import, stream.into(), address.into(), path.into())
    }

    fn new(direction: Direction, stream: String, address: String, path: PathBuf) -> Result<Self> {
        if stream.trim().is_empty() {
            return Err(Error::InvalidInput("stream name must not be empty".to_string()));
        }
        let kind = ContainerKind::from_path(&path)?;
        Ok(Self {
            direction,
            stream,
            address,
            path,
            kind,
            page_size: DEFAULT_PAGE_SIZE,
            state: JobState::Init,
            records: 0,
            bytes: 0,
        })
    }

    /// Sets the number of records requested per read (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Transfer direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Remote stream identifier.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Service address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Local file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container kind of the local file.
    #[must_use]
    pub const fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Records requested per read.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Records transferred so far.
    #[must_use]
    pub const fn records(&self) -> u64 {
        self.records
    }

    /// Uncompressed bytes transferred so far.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::operation(
                "job_transition",
                format!("illegal transition {:?} -> {next:?}", self.state),
            ));
        }
        tracing::debug!(from = ?self.state, to = ?next, "Job state change");
        self.state = next;
        Ok(())
    }

    fn record_progress(&mut self, bytes: u64) {
        self.records += 1;
        self.bytes += bytes;
    }

    /// Moves the job to `Aborted` and hands the error back.
    fn abort(&mut self, err: Error) -> Error {
        if self.state.can_transition_to(JobState::Aborted) {
            self.state = JobState::Aborted;
        }
        tracing::warn!(
            direction = %self.direction,
            stream = %self.stream,
            path = %self.path.display(),
            records = self.records,
            kind = err.kind(),
            error = %err,
            "Transfer aborted"
        );
        err
    }

    fn report(&self, existing: u64, elapsed: Duration) -> TransferReport {
        TransferReport {
            direction: self.direction,
            stream: self.stream.clone(),
            path: self.path.clone(),
            kind: self.kind,
            records: self.records,
            bytes: self.bytes,
            existing,
            elapsed,
        }
    }
}

/// Progress snapshot passed to the progress callback after each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Transfer direction.
    pub direction: Direction,
    /// Records transferred so far.
    pub records: u64,
    /// Uncompressed bytes transferred so far.
    pub bytes: u64,
    /// Expected record count, when known.
    pub total: Option<u64>,
    /// Job state at the time of the snapshot.
    pub state: JobState,
}

/// Progress callback for transfers.
pub type ProgressCallback = Box<dyn Fn(&TransferProgress) + Send>;

/// Final counts of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Transfer direction.
    pub direction: Direction,
    /// Remote stream identifier.
    pub stream: String,
    /// Local file path.
    pub path: PathBuf,
    /// Container kind of the local file.
    pub kind: ContainerKind,
    /// Records transferred.
    pub records: u64,
    /// Uncompressed bytes transferred.
    pub bytes: u64,
    /// Events already in the destination stream before an import.
    pub existing: u64,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// Cooperative cancellation flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs export and import jobs against an [`EventLog`].
pub struct TransferEngine<L: EventLog> {
    log: L,
    prefetch: bool,
    cancel: CancelToken,
}

impl<L: EventLog> TransferEngine<L> {
    /// Creates an engine over `log`.
    pub fn new(log: L) -> Self {
        Self {
            log,
            prefetch: false,
            cancel: CancelToken::new(),
        }
    }

    /// Enables reading the next export page on a worker thread while the
    /// current one is written.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Uses `token` for cancellation.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// The underlying event log.
    pub const fn log(&self) -> &L {
        &self.log
    }

    /// Copies every record of the job's stream into the job's file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamNotFound`] if the stream does not exist, or the
    /// first client, codec or cancellation error. The file written so far is
    /// finalized and kept.
    pub fn export(
        &self,
        mut job: TransferJob,
        progress: Option<ProgressCallback>,
    ) -> Result<TransferReport> {
        expect_direction(&job, Direction::Export)?;
        let span = tracing::info_span!(
            "transfer.export",
            stream = %job.stream,
            path = %job.path.display(),
            kind = %job.kind,
            page_size = job.page_size
        );
        let _enter = span.enter();
        let started = Instant::now();

        job.transition(JobState::Validating)?;
        let total = match self.log.stream_length(&job.stream) {
            Ok(total) => total,
            Err(e) => return Err(job.abort(e)),
        };
        let mut sink = match open_writer(&job.path, job.kind) {
            Ok(sink) => sink,
            Err(e) => return Err(job.abort(e)),
        };

        job.transition(JobState::Transferring)?;
        let pumped = if self.prefetch {
            self.pump_prefetched(&mut job, sink.as_mut(), total, progress.as_ref())
        } else {
            self.pump_pages(&mut job, sink.as_mut(), total, progress.as_ref())
        };
        let finalized = sink.finalize();

        match (pumped, finalized) {
            (Ok(()), Ok(())) => {},
            (Err(e), Ok(())) | (Ok(()), Err(e)) => return Err(job.abort(e)),
            (Err(e), Err(finalize_err)) => {
                tracing::warn!(error = %finalize_err, "Failed to finalize partial export");
                return Err(job.abort(e));
            },
        }

        job.transition(JobState::Completed)?;
        notify(progress.as_ref(), &job, Some(total));
        tracing::info!(
            records = job.records,
            bytes = job.bytes,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Export completed"
        );
        Ok(job.report(0, started.elapsed()))
    }

    /// Appends every record of the job's file to the job's stream, in file
    /// order.
    ///
    /// Runs the [`StreamInspector`] first; a non-empty stream is only written
    /// when `gate` confirms.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Blocked`] when the gate declines, or the first codec,
    /// client or cancellation error. Records appended before the failure stay
    /// in the stream.
    pub fn import(
        &self,
        mut job: TransferJob,
        gate: &mut dyn AppendGate,
        progress: Option<ProgressCallback>,
    ) -> Result<TransferReport> {
        expect_direction(&job, Direction::Import)?;
        let span = tracing::info_span!(
            "transfer.import",
            stream = %job.stream,
            path = %job.path.display(),
            kind = %job.kind
        );
        let _enter = span.enter();
        let started = Instant::now();

        job.transition(JobState::Validating)?;
        let mut source = match open_reader(&job.path, job.kind) {
            Ok(source) => source,
            Err(e) => return Err(job.abort(e)),
        };
        let existing = match StreamInspector::new(&self.log).check_before_write(&job.stream, gate)
        {
            Ok(Decision::ProceedEmpty) => 0,
            Ok(Decision::ProceedAppend(existing)) => existing,
            Ok(Decision::Blocked { existing }) => {
                let err = Error::Blocked {
                    stream: job.stream.clone(),
                    existing,
                };
                return Err(job.abort(err));
            },
            Err(e) => return Err(job.abort(e)),
        };

        job.transition(JobState::Transferring)?;
        if let Err(e) = self.pump_records(&mut job, source.as_mut(), progress.as_ref()) {
            return Err(job.abort(e));
        }

        job.transition(JobState::Completed)?;
        notify(progress.as_ref(), &job, Some(job.records));
        tracing::info!(
            records = job.records,
            bytes = job.bytes,
            existing,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Import completed"
        );
        Ok(job.report(existing, started.elapsed()))
    }

    fn pump_pages(
        &self,
        job: &mut TransferJob,
        sink: &mut dyn RecordSink,
        total: u64,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        let mut cursor = PageCursor::start();
        loop {
            self.check_cancelled(job)?;
            let page = self.log.read_page(&job.stream, cursor, job.page_size)?;
            let next = advance(&job.stream, cursor, &page)?;
            self.write_page(job, sink, page.records, total, progress)?;
            match next {
                Some(next) => cursor = next,
                None => return Ok(()),
            }
        }
    }

    /// Like [`Self::pump_pages`], with reads running one page ahead on a
    /// scoped worker. The channel is FIFO and only this thread writes, so
    /// record order is unchanged.
    fn pump_prefetched(
        &self,
        job: &mut TransferJob,
        sink: &mut dyn RecordSink,
        total: u64,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        let stream = job.stream.clone();
        let page_size = job.page_size;
        let log = &self.log;
        let cancel = &self.cancel;

        std::thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel::<Result<Page>>(1);
            scope.spawn(move || {
                let mut cursor = PageCursor::start();
                while !cancel.is_cancelled() {
                    let page = log.read_page(&stream, cursor, page_size).and_then(|page| {
                        advance(&stream, cursor, &page).map(|next| (page, next))
                    });
                    let (message, next) = match page {
                        Ok((page, next)) => (Ok(page), next),
                        Err(e) => (Err(e), None),
                    };
                    if tx.send(message).is_err() {
                        break;
                    }
                    match next {
                        Some(next) => cursor = next,
                        None => break,
                    }
                }
            });

            for page in rx {
                let page = page?;
                self.write_page(job, sink, page.records, total, progress)?;
            }
            self.check_cancelled(job)
        })
    }

    fn write_page(
        &self,
        job: &mut TransferJob,
        sink: &mut dyn RecordSink,
        records: Vec<EventRecord>,
        total: u64,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        for record in records {
            self.check_cancelled(job)?;
            let bytes = sink.write(&record)?;
            job.record_progress(bytes);
            metrics::counter!("eventshuttle_records_total", "direction" => "export").increment(1);
            notify(progress, job, Some(total.max(job.records)));
        }
        Ok(())
    }

    fn pump_records(
        &self,
        job: &mut TransferJob,
        source: &mut dyn RecordSource,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        loop {
            self.check_cancelled(job)?;
            let Some(record) = source.next()? else {
                return Ok(());
            };
            self.log.append(&job.stream, &record)?;
            job.record_progress(record.encoded_len());
            metrics::counter!("eventshuttle_records_total", "direction" => "import").increment(1);
            notify(progress, job, None);
        }
    }

    fn check_cancelled(&self, job: &TransferJob) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                records: job.records,
            });
        }
        Ok(())
    }
}

fn expect_direction(job: &TransferJob, direction: Direction) -> Result<()> {
    if job.direction == direction {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} job passed to {direction}",
            job.direction
        )))
    }
}

/// Cursor for the page after `page`, or `None` when `page` is the last one.
fn advance(stream: &str, cursor: PageCursor, page: &Page) -> Result<Option<PageCursor>> {
    if page.is_end {
        return Ok(None);
    }
    if page.next <= cursor {
        return Err(Error::operation(
            "read_page",
            format!(
                "cursor for stream '{stream}' did not advance past {}",
                cursor.offset()
            ),
        ));
    }
    Ok(Some(page.next))
}

fn notify(progress: Option<&ProgressCallback>, job: &TransferJob, total: Option<u64>) {
    if let Some(cb) = progress {
        cb(&TransferProgress {
            direction: job.direction,
            records: job.records,
            bytes: job.bytes,
            total,
            state: job.state,
        });
    }
}
