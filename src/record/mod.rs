use crate::class::{EntityClass, EntityKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod domain;

/// One tracked item at a point in time.
///
/// Records are immutable once published; a later Delta or Full replaces the
/// record wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord<P> {
    pub class: EntityClass,

    pub key: EntityKey,

    /// Sequence of the update that produced this record
    pub sequence: u64,

    /// Domain payload (opaque to the cache)
    pub payload: P,

    pub updated_at: DateTime<Utc>,
}

/// Update kind tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Full,
    Delta,
    Remove,
}

/// Body of an update
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOp<P> {
    /// Authoritative replacement of every record in the class
    Full(Vec<(EntityKey, P)>),
    /// Insert or replace one keyed record
    Delta { key: EntityKey, payload: P },
    /// Delete one keyed record
    Remove { key: EntityKey },
}

/// A sequenced change notification for one class
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateRecord<P> {
    pub class: EntityClass,
    pub sequence: u64,
    pub op: UpdateOp<P>,
}

impl<P> UpdateRecord<P> {
    pub fn full<K, I>(class: EntityClass, sequence: u64, entries: I) -> Self
    where
        K: Into<EntityKey>,
        I: IntoIterator<Item = (K, P)>,
    {
        Self {
            class,
            sequence,
            op: UpdateOp::Full(entries.into_iter().map(|(k, p)| (k.into(), p)).collect()),
        }
    }

    pub fn delta(class: EntityClass, sequence: u64, key: impl Into<EntityKey>, payload: P) -> Self {
        Self {
            class,
            sequence,
            op: UpdateOp::Delta {
                key: key.into(),
                payload,
            },
        }
    }

    pub fn remove(class: EntityClass, sequence: u64, key: impl Into<EntityKey>) -> Self {
        Self {
            class,
            sequence,
            op: UpdateOp::Remove { key: key.into() },
        }
    }

    pub fn kind(&self) -> UpdateKind {
        match self.op {
            UpdateOp::Full(_) => UpdateKind::Full,
            UpdateOp::Delta { .. } => UpdateKind::Delta,
            UpdateOp::Remove { .. } => UpdateKind::Remove,
        }
    }

    /// Target key for Delta/Remove, `None` for Full
    pub fn key(&self) -> Option<EntityKey> {
        match &self.op {
            UpdateOp::Full(_) => None,
            UpdateOp::Delta { key, .. } | UpdateOp::Remove { key } => Some(*key),
        }
    }
}

/// Change notification broadcast to subscribers after every accepted update
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassChanged {
    pub class: EntityClass,
    pub version: u64,
    pub sequence: u64,
    pub kind: UpdateKind,
    pub timestamp: DateTime<Utc>,
}
