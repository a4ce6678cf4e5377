//! Cooperative cancellation for the pipeline
//!
//! A cloneable atomic flag checked between pipeline stages and between poll
//! attempts. The CLI trips it from a SIGINT handler; cancelling unwinds the
//! pipeline cleanly, which still runs archive cleanup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
