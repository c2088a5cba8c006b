//! Data models for eventshuttle.
//!
//! The unit of transfer is the [`EventRecord`].

mod event;

pub use event::EventRecord;
