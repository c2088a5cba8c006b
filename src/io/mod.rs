//! Archive codec.
//!
//! Uniform record-level access to the three on-disk container kinds.
//!
//! # Architecture
//!
//! - **Container adapters** implement [`RecordSource`] and [`RecordSink`]
//! - [`open_reader`] and [`open_writer`] pick the adapter for a [`ContainerKind`]
//! - Every container holds the same NDJSON document, one record per line
//!
//! # Supported Containers
//!
//! | Kind | Extension | Layout |
//! |------|-----------|--------|
//! | Raw | `.json` (or none) | NDJSON, or a JSON array on import |
//! | Zip | `.zip` | Single deflated entry `events.json` |
//! | Tar+xz | `.tar.xz` | Single entry `events.json`, xz-compressed tar |
//!
//! # Examples
//!
//! ```rust,ignore
//! use eventshuttle::io::{ContainerKind, open_reader};
//!
//! let path = Path::new("orders.zip");
//! let mut source = open_reader(path, ContainerKind::from_path(path)?)?;
//! while let Some(record) = source.next()? {
//!     println!("{} {}", record.event_number, record.event_type);
//! }
//! ```

pub mod formats;
pub mod traits;

pub use formats::{ARCHIVE_ENTRY, ContainerKind, open_reader, open_writer};
pub use traits::{RecordSink, RecordSource};
