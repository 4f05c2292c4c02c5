//! Cooperative cancellation shared by every phase of a shuffle.

use crate::error::{Result, ShuffleError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable cancellation flag.
///
/// Components check the token once per record or line. Once cancelled, the token stays
/// cancelled; a cancelled run has to be restarted from scratch.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return [`ShuffleError::Cancelled`] if cancellation was requested.
    ///
    /// # Errors
    /// Returns `Cancelled` once [`cancel`](Self::cancel) has been called on any clone.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ShuffleError::Cancelled)
        } else {
            Ok(())
        }
    }
}
