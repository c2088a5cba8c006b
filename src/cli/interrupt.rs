//! Ctrl-C handling for interactive runs.
//!
//! While prompts are showing, nothing has been written yet and an interrupt
//! quits right away. Once the transfer starts the first interrupt only
//! requests cancellation, so the file is finalized and the in-flight append
//! finishes; a second one quits.

use crate::services::CancelToken;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status used when quitting on an interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// What the signal handler should do with an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Terminate the process now.
    Exit,
    /// Cancellation was requested; the engine stops at the next record.
    Cancel,
}

/// Interrupt state shared between the signal handler and the command.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    cancel: CancelToken,
    armed: Arc<AtomicBool>,
}

impl Interrupt {
    /// Creates an unarmed interrupt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches from quit-on-interrupt to cooperative cancellation.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Token handed to the transfer engine.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Records one interrupt and decides how to react.
    pub fn on_signal(&self) -> InterruptAction {
        if !self.armed.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return InterruptAction::Exit;
        }
        self.cancel.cancel();
        InterruptAction::Cancel
    }
}
