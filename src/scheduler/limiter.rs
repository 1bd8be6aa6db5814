//! Concurrency limiter whose limit can change at runtime.
//!
//! Bounds the number of in-flight update requests. Lowering the limit never
//! revokes permits that are already held; new acquisitions wait until the
//! number in use drops below the new limit.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, UpdaterError};

#[derive(Debug)]
struct LimiterState {
    limit: usize,
    in_use: usize,
}

/// A counting limiter with a mutable limit.
#[derive(Debug)]
pub struct MutableLimiter {
    state: Mutex<LimiterState>,
    changed: Notify,
}

impl MutableLimiter {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LimiterState { limit, in_use: 0 }),
            changed: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    pub fn in_use(&self) -> usize {
        self.lock().in_use
    }

    pub fn set_limit(&self, limit: usize) {
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut state.limit, limit)
        };
        if previous != limit {
            debug!(previous, limit, "limiter limit changed");
            self.changed.notify_waiters();
        }
    }

    /// Wait for a free slot. Fails only when `cancel` fires first.
    pub async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> Result<LimiterPermit> {
        loop {
            if cancel.is_cancelled() {
                return Err(UpdaterError::Cancelled);
            }

            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.in_use < state.limit {
                    state.in_use += 1;
                    return Ok(LimiterPermit {
                        limiter: Arc::clone(self),
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(UpdaterError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    fn release(&self) {
        {
            let mut state = self.lock();
            state.in_use = state.in_use.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }
}

/// A held limiter slot, released on drop.
#[derive(Debug)]
pub struct LimiterPermit {
    limiter: Arc<MutableLimiter>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
