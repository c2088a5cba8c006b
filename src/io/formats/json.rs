//! JSON document adapter shared by every container kind.
//!
//! Exports always write newline-delimited JSON (one record per line).
//! Imports additionally accept a top-level JSON array, decoded one element at
//! a time so the array is never materialized.

use crate::io::traits::{RecordSink, RecordSource};
use crate::models::EventRecord;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::error::Category;
use serde_json::value::RawValue;
use std::io::{BufRead, Write};

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Undetected,
    Lines,
    /// Inside a top-level array; `first` until the first element is read.
    Array { first: bool },
    Done,
}

/// Lazy JSON record source.
///
/// Detects the layout on first read:
/// - **NDJSON**: one record per line, blank lines skipped
/// - **Array**: `[{...}, {...}]`, streamed element by element
pub struct JsonRecordSource<R: BufRead> {
    reader: R,
    /// Label used in error messages, usually the archive path.
    origin: String,
    mode: Mode,
    index: u64,
}

impl<R: BufRead> JsonRecordSource<R> {
    /// Creates a new source reading from `reader`.
    #[must_use]
    pub fn new(reader: R, origin: impl Into<String>) -> Self {
        Self {
            reader,
            origin: origin.into(),
            mode: Mode::Undetected,
            index: 0,
        }
    }

    /// Returns the next non-whitespace byte without consuming it.
    fn peek_significant(&mut self) -> Result<Option<u8>> {
        loop {
            let buf = self
                .reader
                .fill_buf()
                .map_err(|e| corrupt(&self.origin, &e))?;
            if buf.is_empty() {
                return Ok(None);
            }
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            if skip < buf.len() {
                let next = buf[skip];
                self.reader.consume(skip);
                return Ok(Some(next));
            }
            let len = buf.len();
            self.reader.consume(len);
        }
    }

    fn detect(&mut self) -> Result<()> {
        let buf = self
            .reader
            .fill_buf()
            .map_err(|e| corrupt(&self.origin, &e))?;
        if buf.starts_with(BOM) {
            self.reader.consume(BOM.len());
        }
        self.mode = match self.peek_significant()? {
            None => Mode::Done,
            Some(b'[') => {
                self.reader.consume(1);
                Mode::Array { first: true }
            },
            Some(_) => Mode::Lines,
        };
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<EventRecord>> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| self.corrupt(&e))?;
            if read == 0 {
                self.mode = Mode::Done;
                return Ok(None);
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                break;
            }
        }

        let terminated = line.ends_with(b"\n");
        let text = std::str::from_utf8(&line).map_err(|e| self.malformed(&e))?;
        match EventRecord::decode(text.trim()) {
            Ok(record) => Ok(Some(record)),
            // A final line cut off mid-record means the file was truncated.
            Err(e) if !terminated && e.classify() == Category::Eof => Err(self.corrupt(&e)),
            Err(e) => Err(self.malformed(&e)),
        }
    }

    fn next_element(&mut self, first: bool) -> Result<Option<EventRecord>> {
        match self.peek_significant()? {
            None => {
                return Err(self.corrupt(&"unexpected end of file inside JSON array"));
            },
            Some(b']') => {
                self.reader.consume(1);
                self.mode = Mode::Done;
                return self.expect_trailer().map(|()| None);
            },
            Some(b',') if !first => {
                self.reader.consume(1);
            },
            Some(_) if first => {},
            Some(other) => {
                return Err(self.corrupt(&format!(
                    "expected ',' or ']' after element {}, found '{}'",
                    self.index.saturating_sub(1),
                    char::from(other)
                )));
            },
        }

        let element = {
            let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
            Box::<RawValue>::deserialize(&mut de)
        };
        let element = match element {
            Ok(element) => element,
            Err(e) if matches!(e.classify(), Category::Eof | Category::Io) => {
                return Err(self.corrupt(&e));
            },
            Err(e) => return Err(self.malformed(&e)),
        };
        let record = EventRecord::decode(element.get()).map_err(|e| self.malformed(&e))?;
        self.mode = Mode::Array { first: false };
        Ok(Some(record))
    }

    fn expect_trailer(&mut self) -> Result<()> {
        match self.peek_significant()? {
            None => Ok(()),
            Some(other) => Err(self.corrupt(&format!(
                "unexpected '{}' after closing ']'",
                char::from(other)
            ))),
        }
    }

    fn corrupt(&self, cause: &dyn std::fmt::Display) -> Error {
        corrupt(&self.origin, cause)
    }

    fn malformed(&self, cause: &dyn std::fmt::Display) -> Error {
        Error::MalformedRecord {
            path: self.origin.clone(),
            index: self.index,
            cause: cause.to_string(),
        }
    }
}

impl<R: BufRead> RecordSource for JsonRecordSource<R> {
    fn next(&mut self) -> Result<Option<EventRecord>> {
        if self.mode == Mode::Undetected {
            self.detect()?;
        }

        let record = match self.mode {
            Mode::Lines => self.next_line()?,
            Mode::Array { first } => self.next_element(first)?,
            Mode::Undetected | Mode::Done => None,
        };
        if record.is_some() {
            self.index += 1;
        }
        Ok(record)
    }

    fn position(&self) -> u64 {
        self.index
    }
}

fn corrupt(origin: &str, cause: &dyn std::fmt::Display) -> Error {
    Error::CorruptArchive {
        path: origin.to_string(),
        cause: cause.to_string(),
    }
}

/// NDJSON record sink.
pub struct JsonRecordSink<W: Write> {
    writer: W,
    count: u64,
}

impl<W: Write> JsonRecordSink<W> {
    /// Creates a new sink writing to `writer`.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// Number of records written so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Flushes and hands back the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer
            .flush()
            .map_err(|e| Error::operation("flush_json", e))?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for JsonRecordSink<W> {
    fn write(&mut self, record: &EventRecord) -> Result<u64> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| Error::operation("encode_record", e))?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .map_err(|e| Error::operation("write_json", e))?;
        self.count += 1;
        Ok(line.len() as u64)
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        self.into_inner().map(drop)
    }
}
