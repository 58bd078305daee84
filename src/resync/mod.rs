use crate::class::EntityClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Why a class needs a fresh Full
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResyncReason {
    /// A delta skipped ahead of the class sequence
    Gap { expected: u64, received: u64 },
    /// Deltas arrived before any Full
    NoBaseline,
    /// A caller invalidated the class
    Explicit,
}

/// Advisory request for the producer to emit a Full for `class`.
///
/// The cache never fetches data itself; the producer's loop watches
/// [`crate::store::StateStore::subscribe_resyncs`] or polls
/// [`crate::store::StateStore::pending_resyncs`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResyncRequest {
    pub class: EntityClass,
    #[serde(flatten)]
    pub reason: ResyncReason,
    pub raised_at: DateTime<Utc>,
}

/// Pending-resync flag of one class. Set by the ingestion path or by
/// callers, cleared only when a Full is applied.
#[derive(Debug, Default)]
pub(crate) struct ResyncFlag {
    stale: AtomicBool,
    pending: Mutex<Option<ResyncRequest>>,
}

impl ResyncFlag {
    /// Raise the flag. Returns the new request, or `None` if one was already
    /// outstanding (the first reason is kept).
    pub fn raise(&self, class: &EntityClass, reason: ResyncReason) -> Option<ResyncRequest> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            return None;
        }
        let request = ResyncRequest {
            class: class.clone(),
            reason,
            raised_at: Utc::now(),
        };
        *pending = Some(request.clone());
        self.stale.store(true, Ordering::Release);
        Some(request)
    }

    /// Clear the flag, returning the request that was outstanding
    pub fn clear(&self) -> Option<ResyncRequest> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        self.stale.store(false, Ordering::Release);
        pending.take()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> Option<ResyncRequest> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
