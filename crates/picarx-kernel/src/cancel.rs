//! Out-of-band cancellation for long-running navigation calls.
//!
//! Navigators poll [`CancelToken::is_cancelled`] between attempts, never in
//! the middle of an actuation.  Clones share the same flag, so the shell's
//! Ctrl-C handler can cancel a navigation running on a worker thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag before starting the next navigation.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
