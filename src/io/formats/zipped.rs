//! Zip container adapter.
//!
//! A zip export holds one deflated entry, `events.json`, with the NDJSON
//! document streamed straight through the compressor.

use super::json::{JsonRecordSink, JsonRecordSource};
use super::{ARCHIVE_ENTRY, choose_entry, corrupt, create_error, open_error, spool_entry};
use crate::io::traits::{RecordSink, RecordSource};
use crate::models::EventRecord;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Zip record sink.
pub struct ZipRecordSink {
    inner: JsonRecordSink<ZipWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl ZipRecordSink {
    /// Creates the archive at `path` and opens its `events.json` entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| create_error(path, &e))?;
        let mut writer = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);
        writer
            .start_file(ARCHIVE_ENTRY, options)
            .map_err(|e| Error::operation("start_zip_entry", e))?;

        Ok(Self {
            inner: JsonRecordSink::new(writer),
            path: path.to_path_buf(),
        })
    }
}

impl RecordSink for ZipRecordSink {
    fn write(&mut self, record: &EventRecord) -> Result<u64> {
        self.inner.write(record)
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        let Self { inner, path } = *self;
        let writer = inner.into_inner()?;
        let mut file = writer
            .finish()
            .map_err(|e| Error::operation("finish_zip", format!("{}: {e}", path.display())))?;
        std::io::Write::flush(&mut file)
            .map_err(|e| Error::operation("flush_zip", format!("{}: {e}", path.display())))
    }
}

/// Opens the record entry of the zip archive at `path`.
///
/// # Errors
///
/// Returns [`Error::CorruptArchive`] if the file is not a readable zip or
/// holds no usable `.json` entry.
pub fn open_source(path: &Path) -> Result<Box<dyn RecordSource>> {
    let file = File::open(path).map_err(|e| open_error(path, &e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(path, &e))?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let chosen = choose_entry(path, names.iter().map(String::as_str))?;
    tracing::debug!(path = %path.display(), entry = %chosen, "Reading zip entry");

    let mut entry = archive.by_name(&chosen).map_err(|e| corrupt(path, &e))?;
    let spool = spool_entry(path, &mut entry)?;

    Ok(Box::new(JsonRecordSource::new(
        BufReader::new(spool),
        path.display().to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn record(n: u64) -> EventRecord {
        EventRecord::from_json("Tick", &json!({ "n": n }))
            .unwrap()
            .with_event_number(n)
    }

    #[test]
    fn test_zip_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.zip");

        let mut sink = Box::new(ZipRecordSink::create(&path).unwrap());
        for n in 0..3 {
            sink.write(&record(n)).unwrap();
        }
        sink.finalize().unwrap();

        let mut source = open_source(&path).unwrap();
        let mut read = Vec::new();
        while let Some(r) = source.next().unwrap() {
            read.push(r);
        }
        assert_eq!(read, (0..3).map(record).collect::<Vec<_>>());
    }

    #[test]
    fn test_zip_single_foreign_json_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.zip");

        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("README.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"not records").unwrap();
        writer
            .start_file("dump/orders.json", SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(br#"[{"event_number":0,"event_type":"A","data":{}}]"#)
            .unwrap();
        writer.finish().unwrap();

        let mut source = open_source(&path).unwrap();
        assert_eq!(source.next().unwrap().unwrap().event_type, "A");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_zip_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"PK\x03\x04 definitely not a zip").unwrap();

        let err = open_source(&path).err().unwrap();
        assert!(matches!(err, Error::CorruptArchive { .. }));
    }
}
