//! Wire types for the Atom JSON feed and the append payload.

use super::{Page, PageCursor};
use crate::models::EventRecord;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Atom feed returned by stream reads with `embed=body`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomFeed {
    #[serde(default)]
    pub entries: Vec<AtomEntry>,
    #[serde(default)]
    pub head_of_stream: bool,
}

/// One feed entry. Link events (as in `$streams`) carry a position in the
/// read stream that differs from the resolved event's own number.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomEntry {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_number: Option<u64>,
    #[serde(default)]
    pub position_event_number: Option<u64>,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
    #[serde(default)]
    pub meta_data: Option<Box<RawValue>>,
    #[serde(default)]
    pub is_json: bool,
    #[serde(default)]
    pub title: Option<String>,
}

impl AtomEntry {
    /// Position of the entry in the stream that was read.
    pub fn position(&self) -> Option<u64> {
        self.position_event_number.or(self.event_number)
    }

    /// Name of the stream this entry points at, for `$streams` listings.
    ///
    /// Titles have the form `N@stream`.
    pub fn linked_stream(&self) -> Option<String> {
        self.title
            .as_deref()
            .and_then(|t| t.split_once('@'))
            .map(|(_, name)| name.to_string())
            .or_else(|| self.stream_id.clone())
            .filter(|name| !name.is_empty())
    }

    fn into_record(self, stream: &str) -> Result<EventRecord> {
        let position = self.position().ok_or_else(|| missing(stream, "eventNumber"))?;
        let event_type = self
            .event_type
            .ok_or_else(|| missing(stream, "eventType"))?;
        let data = match self.data {
            Some(raw) => unwrap_embedded(raw, self.is_json),
            None => RawValue::from_string("null".to_string())
                .map_err(|e| Error::operation("decode_feed", e))?,
        };
        let metadata = self
            .meta_data
            .map(|raw| unwrap_embedded(raw, true))
            .filter(|raw| !matches!(raw.get(), "null" | "\"\""));

        Ok(EventRecord {
            stream_id: self.stream_id.or_else(|| Some(stream.to_string())),
            event_number: position,
            event_id: self.event_id,
            event_type,
            data,
            metadata,
        })
    }
}

/// The service embeds JSON bodies as strings; unwrap them so payloads are
/// stored as the JSON they are. Anything that does not parse stays a string.
fn unwrap_embedded(raw: Box<RawValue>, is_json: bool) -> Box<RawValue> {
    if !is_json || !raw.get().starts_with('"') {
        return raw;
    }
    serde_json::from_str::<String>(raw.get())
        .ok()
        .filter(|text| !text.trim().is_empty())
        .and_then(|text| RawValue::from_string(text).ok())
        .unwrap_or(raw)
}

fn missing(stream: &str, field: &str) -> Error {
    Error::operation(
        "decode_feed",
        format!("entry in stream '{stream}' has no {field}"),
    )
}

impl AtomFeed {
    /// Converts a forward-read feed into a page in ascending order.
    pub fn into_page(self, stream: &str, cursor: PageCursor, page_size: usize) -> Result<Page> {
        let head_of_stream = self.head_of_stream;
        let mut records = self
            .entries
            .into_iter()
            .map(|entry| entry.into_record(stream))
            .collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.event_number);

        let next = records
            .last()
            .map_or(cursor, |last| PageCursor::at(last.event_number + 1));
        let is_end = records.len() < page_size || head_of_stream;
        Ok(Page {
            records,
            next,
            is_end,
        })
    }

    /// Highest position in the feed, if any.
    pub fn head_position(&self) -> Option<u64> {
        self.entries.iter().filter_map(AtomEntry::position).max()
    }
}

/// Progress document of a projection.
#[derive(Debug, Deserialize)]
pub struct ProjectionStatus {
    #[serde(default)]
    pub progress: f64,
}

/// One element of the append request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEvent<'a> {
    pub event_id: &'a str,
    pub event_type: &'a str,
    pub data: &'a RawValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a RawValue>,
}
