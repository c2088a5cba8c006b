//! Tar+xz container adapter.
//!
//! Tar headers carry the entry size up front, so exports spool the NDJSON
//! document to an anonymous temp file and pack it on finalize.

use super::json::{JsonRecordSink, JsonRecordSource};
use super::{
    ARCHIVE_ENTRY, EntryRole, corrupt, create_error, entry_role, multiple_entries_error,
    no_entry_error, open_error, spool_entry,
};
use crate::io::traits::{RecordSink, RecordSource};
use crate::models::EventRecord;
use crate::{Error, Result, current_timestamp};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// xz preset used for exports.
const XZ_LEVEL: u32 = 6;

/// Tar+xz record sink.
pub struct TarXzRecordSink {
    spool: JsonRecordSink<BufWriter<File>>,
    target: File,
    path: PathBuf,
}

impl TarXzRecordSink {
    /// Creates the archive at `path` and a spool file for its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let target = File::create(path).map_err(|e| create_error(path, &e))?;
        let spool =
            tempfile::tempfile().map_err(|e| Error::operation("create_spool_file", e))?;
        Ok(Self {
            spool: JsonRecordSink::new(BufWriter::new(spool)),
            target,
            path: path.to_path_buf(),
        })
    }
}

impl RecordSink for TarXzRecordSink {
    fn write(&mut self, record: &EventRecord) -> Result<u64> {
        self.spool.write(record)
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        let Self {
            spool,
            target,
            path,
        } = *self;
        let failed = |e: std::io::Error| {
            Error::operation("finish_tar_xz", format!("{}: {e}", path.display()))
        };

        let mut spool = spool
            .into_inner()?
            .into_inner()
            .map_err(|e| failed(e.into_error()))?;
        let size = spool.seek(SeekFrom::End(0)).map_err(failed)?;
        spool.seek(SeekFrom::Start(0)).map_err(failed)?;

        let mut header = Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header.set_mtime(current_timestamp());
        header.set_entry_type(EntryType::Regular);

        let mut builder = Builder::new(XzEncoder::new(BufWriter::new(target), XZ_LEVEL));
        builder
            .append_data(&mut header, ARCHIVE_ENTRY, &mut spool)
            .map_err(failed)?;
        let encoder = builder.into_inner().map_err(failed)?;
        let mut out = encoder.finish().map_err(failed)?;
        out.flush().map_err(failed)?;

        tracing::debug!(path = %path.display(), bytes = size, "Packed tar.xz archive");
        Ok(())
    }
}

/// Opens the record entry of the tar.xz archive at `path`.
///
/// The archive is read to its end in one pass so that truncation anywhere in
/// the tar or xz stream is reported. `events.json` is preferred, otherwise the
/// only `.json` member is used.
///
/// # Errors
///
/// Returns [`Error::CorruptArchive`] if decompression or tar parsing fails or
/// no usable entry exists.
pub fn open_source(path: &Path) -> Result<Box<dyn RecordSource>> {
    let file = File::open(path).map_err(|e| open_error(path, &e))?;
    let mut archive = Archive::new(XzDecoder::new(BufReader::new(file)));

    let mut primary: Option<(String, File)> = None;
    let mut fallback: Option<(String, File)> = None;
    let mut candidates = 0usize;

    for entry in archive.entries().map_err(|e| corrupt(path, &e))? {
        let mut entry = entry.map_err(|e| corrupt(path, &e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| corrupt(path, &e))?
            .to_string_lossy()
            .into_owned();

        match entry_role(&name) {
            EntryRole::Primary if primary.is_none() => {
                primary = Some((name, spool_entry(path, &mut entry)?));
            },
            EntryRole::Candidate => {
                candidates += 1;
                if primary.is_none() && fallback.is_none() {
                    fallback = Some((name, spool_entry(path, &mut entry)?));
                }
            },
            EntryRole::Primary | EntryRole::Ignored => {},
        }
    }

    // Tar stops at its end-of-archive marker; the xz trailer is still unread.
    io::copy(&mut archive.into_inner(), &mut io::sink()).map_err(|e| corrupt(path, &e))?;

    if let Some((name, spool)) = primary {
        return Ok(into_source(path, &name, spool));
    }
    match (candidates, fallback) {
        (1, Some((name, spool))) => Ok(into_source(path, &name, spool)),
        (0, _) | (_, None) => Err(no_entry_error(path)),
        (n, Some(_)) => Err(multiple_entries_error(path, n)),
    }
}

fn into_source(path: &Path, entry: &str, spool: File) -> Box<dyn RecordSource> {
    tracing::debug!(path = %path.display(), entry, "Reading tar.xz entry");
    Box::new(JsonRecordSource::new(
        BufReader::new(spool),
        path.display().to_string(),
    ))
}
