//! Event records as carried between the event log and archives.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// One entry of an append-only stream.
///
/// `data` and `metadata` are carried verbatim as raw JSON text; the engine
/// never inspects or reformats them.
///
/// # Field Mapping
///
/// | Field | Required in files | Notes |
/// |-------|-------------------|-------|
/// | `stream_id` | No | Owning stream, informational |
/// | `event_number` | Yes | Assigned by the service, ignored on import |
/// | `event_id` | No | Reused on import, generated if absent |
/// | `event_type` | Yes | - |
/// | `data` | Yes | Opaque JSON |
/// | `metadata` | No | Opaque JSON |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Owning stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    /// Position of the event within its stream.
    pub event_number: u64,
    /// Client-visible unique event id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Payload shape tag.
    pub event_type: String,
    /// Opaque payload.
    pub data: Box<RawValue>,
    /// Opaque metadata payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Box<RawValue>>,
}

impl EventRecord {
    /// Creates a record with the given type and raw payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Box<RawValue>) -> Self {
        Self {
            stream_id: None,
            event_number: 0,
            event_id: None,
            event_type: event_type.into(),
            data,
            metadata: None,
        }
    }

    /// Creates a record whose payload is `data` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized.
    pub fn from_json<T: Serialize + ?Sized>(event_type: impl Into<String>, data: &T) -> Result<Self> {
        let raw = serde_json::value::to_raw_value(data)
            .map_err(|e| Error::InvalidInput(format!("event payload is not serializable: {e}")))?;
        Ok(Self::new(event_type, raw))
    }

    /// Sets the stream id.
    #[must_use]
    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Sets the event number.
    #[must_use]
    pub const fn with_event_number(mut self, event_number: u64) -> Self {
        self.event_number = event_number;
        self
    }

    /// Sets the event id.
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Sets the metadata payload.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Box<RawValue>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Compares type, data and metadata, ignoring service-assigned fields.
    ///
    /// This is the equality that survives an export/import round trip: the
    /// destination stream assigns fresh event numbers.
    #[must_use]
    pub fn same_payload(&self, other: &Self) -> bool {
        self.event_type == other.event_type
            && self.data.get() == other.data.get()
            && self.metadata.as_deref().map(RawValue::get)
                == other.metadata.as_deref().map(RawValue::get)
    }

    /// Size of the record as one NDJSON line, newline included.
    ///
    /// Used for byte counters so that both transfer directions agree.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        serde_json::to_vec(self).map_or(0, |line| line.len() as u64 + 1)
    }
}

/// Event resource as served for a single event URL, with the record fields
/// nested under `content`. Older backups hold one of these per line.
#[derive(Deserialize)]
struct EventResource {
    content: ResourceContent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceContent {
    #[serde(default)]
    event_stream_id: Option<String>,
    event_number: u64,
    #[serde(default)]
    event_id: Option<String>,
    event_type: String,
    data: Box<RawValue>,
    #[serde(default)]
    metadata: Option<Box<RawValue>>,
}

impl From<ResourceContent> for EventRecord {
    fn from(content: ResourceContent) -> Self {
        Self {
            stream_id: content.event_stream_id,
            event_number: content.event_number,
            event_id: content.event_id.filter(|id| !id.is_empty()),
            event_type: content.event_type,
            data: content.data,
            metadata: content
                .metadata
                .filter(|raw| !matches!(raw.get(), "null" | "\"\"")),
        }
    }
}

impl EventRecord {
    /// Decodes one stored record.
    ///
    /// Accepts the flat layout written by exports and, failing that, an event
    /// resource whose fields sit under `content`. Errors describe the flat
    /// layout.
    ///
    /// # Errors
    ///
    /// Returns the serde error for the flat layout when neither form matches.
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        match serde_json::from_str::<Self>(text) {
            Ok(record) => Ok(record),
            Err(flat) => serde_json::from_str::<EventResource>(text)
                .map(|resource| resource.content.into())
                .map_err(|_| flat),
        }
    }
}

impl PartialEq for EventRecord {
    fn eq(&self, other: &Self) -> bool {
        self.stream_id == other.stream_id
            && self.event_number == other.event_number
            && self.event_id == other.event_id
            && self.same_payload(other)
    }
}

impl Eq for EventRecord {}
