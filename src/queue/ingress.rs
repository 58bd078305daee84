use crate::error::{CacheError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// Bounded buffer between producer transports and the ingestion driver.
///
/// Producers push from any thread and ring the doorbell; the driver drains
/// everything pending in one go. Blocking waiters (the reentrant warmup path)
/// use the condition variable, async driver loops use the `Notify`.
pub(crate) struct Ingress<U> {
    pending: Mutex<VecDeque<U>>,
    ready: Condvar,
    doorbell: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl<U> Ingress<U> {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            doorbell: Notify::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push(&self, update: U) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.len() >= self.capacity {
                return Err(CacheError::IngressFull {
                    capacity: self.capacity,
                });
            }
            pending.push_back(update);
        }

        self.ready.notify_all();
        self.doorbell.notify_one();
        Ok(())
    }

    /// Take everything currently pending, in arrival order
    pub fn take_all(&self) -> Vec<U> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Block until something is pending, the buffer closes, or `timeout`
    /// elapses. Returns true if updates are pending.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (pending, _) = self
            .ready
            .wait_timeout_while(pending, timeout, |p| {
                p.is_empty() && !self.closed.load(Ordering::Acquire)
            })
            .unwrap_or_else(PoisonError::into_inner);
        !pending.is_empty()
    }

    /// Wait for the next doorbell ring
    pub async fn rung(&self) {
        self.doorbell.notified().await;
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        {
            // Taken so a waiter cannot miss the flag between its check and its wait
            let _pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::Release);
        }
        self.ready.notify_all();
        self.doorbell.notify_one();
    }
}
