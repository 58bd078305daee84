use crate::class::{EntityClass, EntityKey};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to cache callers.
///
/// Duplicate/stale updates and sequence gaps never show up here: they are
/// absorbed by the queue and reported through metrics, logs and the
/// staleness flag.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("warmup of '{class}' timed out after {waited:?}")]
    WarmupTimeout { class: EntityClass, waited: Duration },

    #[error("state store is shut down")]
    Closed,

    #[error("ingress buffer is full ({capacity} pending updates)")]
    IngressFull { capacity: usize },

    #[error("unknown view '{0}'")]
    UnknownView(String),

    #[error("record {key} of '{class}' does not decode: {message}")]
    Decode {
        class: EntityClass,
        key: EntityKey,
        message: String,
    },
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
