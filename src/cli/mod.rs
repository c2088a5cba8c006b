//! CLI command implementations.
//!
//! The binary parses flags and hands them here; anything not given on the
//! command line is asked for interactively.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | (default) | Export a stream to a file, or import a file into a stream |
//! | `streams` | List the streams known to the service |
//!
//! # Example Usage
//!
//! ```bash
//! # Export a stream into a tar.xz archive
//! eventshuttle -m export -s orders -f orders.tar.xz
//!
//! # Import, appending to a stream that already has events
//! eventshuttle -m import -s orders-copy -f orders.tar.xz --append
//!
//! # Fully interactive
//! eventshuttle
//! ```

mod interrupt;
mod prompt;
mod transfer;

pub use interrupt::{INTERRUPTED_EXIT_CODE, Interrupt, InterruptAction};
pub use prompt::{InteractiveGate, Prompter, validate_stream_name};
pub use transfer::{TransferArgs, cmd_streams, cmd_transfer};
