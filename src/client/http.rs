//! HTTP implementation of [`EventLog`] over the Atom JSON API.
//!
//! # Status Handling
//!
//! | Response | Outcome |
//! |----------|---------|
//! | 2xx | Success |
//! | 404, 410 | `StreamNotFound`, not retried |
//! | 408, 429, 5xx | Transient, retried with backoff |
//! | Other 4xx | `RejectedByService`, not retried |
//! | Connect error, timeout | Transient, retried with backoff |

use super::atom::{AppendEvent, AtomFeed, ProjectionStatus};
use super::retry::{FailureAction, RetryPolicy};
use super::{ClientSettings, EventLog, Page, PageCursor, ProjectionSettings};
use crate::models::EventRecord;
use crate::{Error, Result};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use std::collections::HashSet;

const ATOM_JSON: &str = "application/vnd.eventstore.atom+json";
const EVENTS_JSON: &str = "application/vnd.eventstore.events+json";
const STREAMS_PROJECTION: &str = "$streams";
const LISTING_PAGE_SIZE: usize = 100;
/// Longest response body quoted in a rejection diagnostic.
const MAX_REASON_LEN: usize = 512;

/// Event log client for an EventStoreDB-style HTTP endpoint.
pub struct HttpEventLog {
    client: Client,
    base: Url,
    retry: RetryPolicy,
    projection: ProjectionSettings,
}

impl HttpEventLog {
    /// Creates a client for the service at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `address` is not an http(s) URL.
    pub fn new(address: &str, settings: &ClientSettings) -> Result<Self> {
        let base = Url::parse(address.trim())
            .map_err(|e| Error::InvalidInput(format!("invalid service address '{address}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!(
                "service address must be an http(s) URL, got '{address}'"
            )));
        }

        let client = Client::builder()
            .user_agent(format!("eventshuttle/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::operation("build_http_client", e))?;

        Ok(Self {
            client,
            base,
            retry: settings.retry.clone(),
            projection: settings.projection.clone(),
        })
    }

    /// Base URL of the service.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str], embed_body: bool) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidInput(format!("cannot build URL from '{}'", self.base)))?
            .pop_if_empty()
            .extend(segments);
        if embed_body {
            url.query_pairs_mut().append_pair("embed", "body");
        }
        Ok(url)
    }

    /// Sends the request built by `build` under the retry policy and returns
    /// the body of the first successful response.
    fn exchange<F>(&self, operation: &'static str, stream: &str, build: F) -> Result<String>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let span = tracing::info_span!(
            "event_log.request",
            operation,
            stream,
            attempts = tracing::field::Empty
        );
        let _enter = span.enter();

        let mut attempts = 0u32;
        let result = self.retry.run(operation, stream, || {
            attempts += 1;
            metrics::counter!("eventshuttle_http_requests_total", "operation" => operation)
                .increment(1);
            let response = build(&self.client)
                .send()
                .map_err(|e| transport_failure(&e))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .map_err(|e| FailureAction::Retry(format!("reading response body: {e}")))?;
            classify(operation, stream, status, body)
        });
        span.record("attempts", attempts);
        result
    }

    fn fetch_feed(
        &self,
        operation: &'static str,
        stream: &str,
        cursor: PageCursor,
        page_size: usize,
    ) -> Result<AtomFeed> {
        let from = cursor.offset().to_string();
        let count = page_size.to_string();
        let url = self.endpoint(&["streams", stream, &from, "forward", &count], true)?;
        let body = self.exchange(operation, stream, |client| {
            client.get(url.clone()).header(ACCEPT, ATOM_JSON)
        })?;
        decode_feed(stream, &body)
    }

    /// Enables a projection, waits for it to catch up, then disables it.
    fn run_projection(&self, name: &str) -> Result<()> {
        let command = |verb: &str| self.endpoint(&["projection", name, "command", verb], false);
        let enable = command("enable")?;
        let disable = command("disable")?;
        let status_url = self.endpoint(&["projection", name], false)?;

        self.exchange("enable_projection", name, |client| {
            client.post(enable.clone()).header(CONTENT_LENGTH, "0")
        })?;

        let mut caught_up = false;
        for _ in 0..self.projection.max_polls {
            let body = self.exchange("projection_status", name, |client| {
                client.get(status_url.clone()).header(ACCEPT, "application/json")
            })?;
            let status: ProjectionStatus = serde_json::from_str(&body)
                .map_err(|e| Error::operation("decode_projection_status", e))?;
            tracing::debug!(projection = name, progress = status.progress, "Projection progress");
            if status.progress >= 100.0 {
                caught_up = true;
                break;
            }
            std::thread::sleep(self.projection.poll_interval);
        }
        if !caught_up {
            tracing::warn!(
                projection = name,
                polls = self.projection.max_polls,
                "Projection did not reach 100% progress, listing may be incomplete"
            );
        }

        self.exchange("disable_projection", name, |client| {
            client.post(disable.clone()).header(CONTENT_LENGTH, "0")
        })?;
        Ok(())
    }
}

impl EventLog for HttpEventLog {
    fn read_page(&self, stream: &str, cursor: PageCursor, page_size: usize) -> Result<Page> {
        if page_size == 0 {
            return Err(Error::InvalidInput("page size must be positive".to_string()));
        }
        self.fetch_feed("read_page", stream, cursor, page_size)?
            .into_page(stream, cursor, page_size)
    }

    fn append(&self, stream: &str, record: &EventRecord) -> Result<()> {
        // One id per record, shared by every retry of it.
        let event_id = record
            .event_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let body = serde_json::to_vec(&[AppendEvent {
            event_id: &event_id,
            event_type: &record.event_type,
            data: &record.data,
            metadata: record.metadata.as_deref(),
        }])
        .map_err(|e| Error::operation("encode_append", e))?;

        let url = self.endpoint(&["streams", stream], false)?;
        self.exchange("append", stream, |client| {
            client
                .post(url.clone())
                .header(CONTENT_TYPE, EVENTS_JSON)
                .header(ACCEPT, "application/json")
                .body(body.clone())
        })
        .map(drop)
    }

    fn stream_length(&self, stream: &str) -> Result<u64> {
        let url = self.endpoint(&["streams", stream, "head", "backward", "1"], true)?;
        let body = self.exchange("stream_length", stream, |client| {
            client.get(url.clone()).header(ACCEPT, ATOM_JSON)
        })?;
        let feed = decode_feed(stream, &body)?;
        Ok(feed.head_position().map_or(0, |head| head + 1))
    }

    fn list_streams(&self) -> Result<Vec<String>> {
        if self.projection.refresh
            && let Err(e) = self.run_projection(STREAMS_PROJECTION)
        {
            tracing::warn!(error = %e, "Could not refresh $streams projection");
        }

        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = PageCursor::start();
        loop {
            let mut feed = match self.fetch_feed(
                "list_streams",
                STREAMS_PROJECTION,
                cursor,
                LISTING_PAGE_SIZE,
            ) {
                Ok(feed) => feed,
                Err(Error::StreamNotFound { .. }) => break,
                Err(e) => return Err(e),
            };
            let is_end = feed.head_of_stream || feed.entries.len() < LISTING_PAGE_SIZE;
            let next = feed
                .head_position()
                .map_or(cursor, |head| PageCursor::at(head + 1));

            feed.entries.sort_by_key(super::atom::AtomEntry::position);
            for name in feed.entries.iter().filter_map(super::atom::AtomEntry::linked_stream) {
                if !name.starts_with('$') && seen.insert(name.clone()) {
                    names.push(name);
                }
            }

            if is_end || next == cursor {
                break;
            }
            cursor = next;
        }
        Ok(names)
    }
}

fn decode_feed(stream: &str, body: &str) -> Result<AtomFeed> {
    serde_json::from_str(body)
        .map_err(|e| Error::operation("decode_feed", format!("stream '{stream}': {e}")))
}

fn transport_failure(e: &reqwest::Error) -> FailureAction {
    if e.is_builder() {
        FailureAction::Fail(Error::operation("build_request", e))
    } else {
        FailureAction::Retry(e.to_string())
    }
}

/// Maps an HTTP status to success, a transient failure or a permanent one.
fn classify(
    operation: &str,
    stream: &str,
    status: u16,
    body: String,
) -> std::result::Result<String, FailureAction> {
    match status {
        200..=299 => Ok(body),
        404 | 410 => Err(FailureAction::Fail(Error::StreamNotFound {
            stream: stream.to_string(),
        })),
        408 | 429 | 500..=599 => Err(FailureAction::Retry(format!("HTTP {status}"))),
        _ => {
            let mut reason = body.trim().to_string();
            if reason.len() > MAX_REASON_LEN {
                let mut cut = MAX_REASON_LEN;
                while !reason.is_char_boundary(cut) {
                    cut -= 1;
                }
                reason.truncate(cut);
            }
            Err(FailureAction::Fail(Error::RejectedByService {
                stream: stream.to_string(),
                operation: operation.to_string(),
                status,
                reason,
            }))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn client(address: &str) -> HttpEventLog {
        HttpEventLog::new(address, &ClientSettings::default()).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let log = client("http://localhost:2113/");
        let url = log
            .endpoint(&["streams", "orders 2024", "0", "forward", "20"], true)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:2113/streams/orders%202024/0/forward/20?embed=body"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let log = client("https://events.example.com/es");
        let url = log.endpoint(&["streams", "$streams"], false).unwrap();
        assert_eq!(url.as_str(), "https://events.example.com/es/streams/$streams");
    }

    #[test_case("localhost:2113" ; "missing scheme")]
    #[test_case("ftp://localhost" ; "wrong scheme")]
    #[test_case("not a url" ; "garbage")]
    fn test_rejects_bad_address(address: &str) {
        let err = HttpEventLog::new(address, &ClientSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test_case(500 ; "internal error")]
    #[test_case(503 ; "unavailable")]
    #[test_case(408 ; "request timeout")]
    #[test_case(429 ; "too many requests")]
    fn test_classify_transient(status: u16) {
        let outcome = classify("read_page", "orders", status, String::new());
        assert!(matches!(outcome, Err(FailureAction::Retry(_))));
    }

    #[test_case(404 ; "not found")]
    #[test_case(410 ; "gone")]
    fn test_classify_missing_stream(status: u16) {
        let outcome = classify("read_page", "orders", status, String::new());
        assert!(matches!(
            outcome,
            Err(FailureAction::Fail(Error::StreamNotFound { .. }))
        ));
    }

    #[test]
    fn test_classify_rejected_keeps_reason() {
        let outcome = classify("append", "orders", 400, " Bad eventId \n".to_string());
        match outcome {
            Err(FailureAction::Fail(Error::RejectedByService { status, reason, .. })) => {
                assert_eq!(status, 400);
                assert_eq!(reason, "Bad eventId");
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
