//! HTTP event log client tests against a mock event store.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use eventshuttle::client::{
    ClientSettings, EventLog, HttpEventLog, PageCursor, ProjectionSettings, RetryPolicy,
};
use eventshuttle::models::EventRecord;
use eventshuttle::services::{TransferEngine, TransferJob};
use eventshuttle::Error;
use httpmock::prelude::*;
use serde_json::{Value, json};
use std::ops::Range;
use std::time::Duration;

const ATOM_JSON: &str = "application/vnd.eventstore.atom+json";

fn settings(attempts: u32) -> ClientSettings {
    ClientSettings {
        retry: RetryPolicy::immediate(attempts),
        timeout: Duration::from_secs(5),
        projection: ProjectionSettings {
            refresh: false,
            poll_interval: Duration::ZERO,
            max_polls: 3,
        },
    }
}

/// Atom feed for `stream` holding `numbers`, newest first like the service.
fn feed(stream: &str, numbers: Range<u64>, head_of_stream: bool) -> Value {
    let entries: Vec<Value> = numbers
        .rev()
        .map(|n| {
            json!({
                "eventId": format!("00000000-0000-4000-8000-{n:012}"),
                "eventType": "OrderPlaced",
                "eventNumber": n,
                "positionEventNumber": n,
                "streamId": stream,
                "isJson": true,
                "data": json!({ "order": n }).to_string(),
                "metaData": "",
                "title": format!("{n}@{stream}"),
            })
        })
        .collect();
    json!({ "headOfStream": head_of_stream, "entries": entries })
}

fn listing(names: &[&str]) -> Value {
    let entries: Vec<Value> = names
        .iter()
        .enumerate()
        .rev()
        .map(|(i, name)| {
            json!({
                "eventType": "$>",
                "eventNumber": 0,
                "positionEventNumber": i,
                "streamId": name,
                "title": format!("0@{name}"),
            })
        })
        .collect();
    json!({ "headOfStream": true, "entries": entries })
}

#[test]
fn test_export_pages_through_stream() {
    let server = MockServer::start();
    let head = server.mock(|when, then| {
        when.method(GET)
            .path("/streams/orders/head/backward/1")
            .header("accept", ATOM_JSON);
        then.status(200).json_body(feed("orders", 4..5, true));
    });
    let pages: Vec<_> = [(0, 0..2, false), (2, 2..4, false), (4, 4..5, true)]
        .into_iter()
        .map(|(from, numbers, is_head)| {
            server.mock(|when, then| {
                when.method(GET)
                    .path(format!("/streams/orders/{from}/forward/2"))
                    .query_param("embed", "body");
                then.status(200).json_body(feed("orders", numbers, is_head));
            })
        })
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.json");
    let log = HttpEventLog::new(&server.base_url(), &settings(3)).unwrap();
    let job = TransferJob::export("orders", server.base_url(), &path)
        .unwrap()
        .with_page_size(2);
    let report = TransferEngine::new(log).export(job, None).unwrap();

    assert_eq!(report.records, 5);
    head.assert_hits(1);
    for page in &pages {
        page.assert_hits(1);
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let records: Vec<EventRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let numbers: Vec<u64> = records.iter().map(|r| r.event_number).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    assert_eq!(records[3].data.get(), r#"{"order":3}"#);
    assert!(records[3].metadata.is_none());
    assert_eq!(records[3].stream_id.as_deref(), Some("orders"));
}

#[test]
fn test_missing_stream_is_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/streams/ghost/head/backward/1");
        then.status(404);
    });

    let log = HttpEventLog::new(&server.base_url(), &settings(5)).unwrap();
    let err = log.stream_length("ghost").unwrap_err();

    assert!(matches!(err, Error::StreamNotFound { ref stream } if stream == "ghost"));
    mock.assert_hits(1);
}

#[test]
fn test_unavailable_service_exhausts_retries() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/streams/orders/0/forward/20");
        then.status(503).body("try later");
    });

    let log = HttpEventLog::new(&server.base_url(), &settings(3)).unwrap();
    let err = log.read_page("orders", PageCursor::start(), 20).unwrap_err();

    match err {
        Error::TransferFailed {
            attempts, cause, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(cause.contains("503"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert_hits(3);
}

#[test]
fn test_rejected_append_is_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/streams/orders");
        then.status(400).body("Write request body invalid.");
    });

    let log = HttpEventLog::new(&server.base_url(), &settings(5)).unwrap();
    let record = EventRecord::from_json("OrderPlaced", &json!({ "order": 1 })).unwrap();
    let err = log.append("orders", &record).unwrap_err();

    match err {
        Error::RejectedByService { status, reason, .. } => {
            assert_eq!(status, 400);
            assert_eq!(reason, "Write request body invalid.");
        },
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert_hits(1);
}

#[test]
fn test_append_sends_event_store_payload() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/streams/orders")
            .header("content-type", "application/vnd.eventstore.events+json")
            .json_body(json!([{
                "eventId": "9a1d3c52-8f5e-4d47-a5b0-6d7d59a0d001",
                "eventType": "OrderPlaced",
                "data": { "order": 1 },
                "metadata": { "source": "backup" }
            }]));
        then.status(201);
    });

    let log = HttpEventLog::new(&server.base_url(), &settings(1)).unwrap();
    let record = EventRecord::from_json("OrderPlaced", &json!({ "order": 1 }))
        .unwrap()
        .with_event_id("9a1d3c52-8f5e-4d47-a5b0-6d7d59a0d001")
        .with_metadata(serde_json::value::to_raw_value(&json!({ "source": "backup" })).unwrap());
    log.append("orders", &record).unwrap();

    mock.assert();
}

#[test]
fn test_connection_refused_is_transient() {
    // Port 9 (discard) is not expected to accept HTTP connections.
    let log = HttpEventLog::new("http://127.0.0.1:9", &settings(2)).unwrap();
    let err = log.stream_length("orders").unwrap_err();
    assert!(matches!(err, Error::TransferFailed { attempts: 2, .. }));
}

#[test]
fn test_list_streams_hides_system_streams() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/streams/$streams/0/forward/100")
            .query_param("embed", "body");
        then.status(200)
            .json_body(listing(&["orders", "$settings", "payments", "orders"]));
    });

    let log = HttpEventLog::new(&server.base_url(), &settings(1)).unwrap();
    let streams = log.list_streams().unwrap();

    assert_eq!(streams, vec!["orders".to_string(), "payments".to_string()]);
    mock.assert_hits(1);
}

#[test]
fn test_list_streams_refreshes_projection() {
    let server = MockServer::start();
    let enable = server.mock(|when, then| {
        when.method(POST).path("/projection/$streams/command/enable");
        then.status(200);
    });
    let status = server.mock(|when, then| {
        when.method(GET).path("/projection/$streams");
        then.status(200).json_body(json!({ "progress": 100.0 }));
    });
    let disable = server.mock(|when, then| {
        when.method(POST).path("/projection/$streams/command/disable");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(GET).path("/streams/$streams/0/forward/100");
        then.status(200).json_body(listing(&["orders"]));
    });

    let mut refreshing = settings(1);
    refreshing.projection.refresh = true;
    let log = HttpEventLog::new(&server.base_url(), &refreshing).unwrap();

    assert_eq!(log.list_streams().unwrap(), vec!["orders".to_string()]);
    enable.assert_hits(1);
    status.assert_hits(1);
    disable.assert_hits(1);
}

#[test]
fn test_missing_listing_is_empty() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/streams/$streams/0/forward/100");
        then.status(404);
    });

    let log = HttpEventLog::new(&server.base_url(), &settings(1)).unwrap();
    assert!(log.list_streams().unwrap().is_empty());
}
