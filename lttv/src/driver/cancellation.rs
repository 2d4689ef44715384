//! Cooperative cancellation: a `cancel()` from any thread sets a flag that
//! [`crate::driver::Driver::middle`] polls at each event boundary. There are
//! no timeouts in the engine proper; this is the only way an in-progress
//! analysis is interrupted early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
