use crate::class::{EntityClass, EntityKey};
use crate::record::{EntityRecord, UpdateOp, UpdateRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable contents of one class at one version.
///
/// Tables are never mutated after publication: every accepted update builds
/// a replacement table that the store swaps in atomically.
#[derive(Debug)]
pub struct ClassTable<P> {
    class: EntityClass,
    version: u64,
    sequence: u64,
    records: HashMap<EntityKey, Arc<EntityRecord<P>>>,
}

impl<P> ClassTable<P> {
    pub(crate) fn empty(class: EntityClass) -> Self {
        Self {
            class,
            version: 0,
            sequence: 0,
            records: HashMap::new(),
        }
    }

    /// Table of a composite view, rebuilt from its derived entries
    pub(crate) fn derived(class: EntityClass, version: u64, entries: Vec<(EntityKey, P)>) -> Self {
        let now = Utc::now();
        let records = entries
            .into_iter()
            .map(|(key, payload)| {
                let record = EntityRecord {
                    class: class.clone(),
                    key,
                    sequence: version,
                    payload,
                    updated_at: now,
                };
                (key, Arc::new(record))
            })
            .collect();

        Self {
            class,
            version,
            sequence: version,
            records,
        }
    }

    /// Build the successor table with `update` applied. Untouched records
    /// are shared with `self`.
    pub(crate) fn with_update(&self, update: UpdateRecord<P>, now: DateTime<Utc>) -> Self {
        let sequence = update.sequence;
        let class = &self.class;
        let record = |key: EntityKey, payload: P| {
            Arc::new(EntityRecord {
                class: class.clone(),
                key,
                sequence,
                payload,
                updated_at: now,
            })
        };

        let records = match update.op {
            UpdateOp::Full(entries) => entries
                .into_iter()
                .map(|(key, payload)| (key, record(key, payload)))
                .collect(),
            UpdateOp::Delta { key, payload } => {
                let mut records = self.records.clone();
                records.insert(key, record(key, payload));
                records
            }
            UpdateOp::Remove { key } => {
                let mut records = self.records.clone();
                records.remove(&key);
                records
            }
        };

        Self {
            class: self.class.clone(),
            version: self.version + 1,
            sequence,
            records,
        }
    }

    pub fn class(&self) -> &EntityClass {
        &self.class
    }

    /// Monotonic count of accepted updates (max of inputs for views)
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sequence of the last applied update
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: impl Into<EntityKey>) -> Option<&EntityRecord<P>> {
        self.records.get(&key.into()).map(|r| r.as_ref())
    }

    /// Records in key order
    pub fn records(&self) -> Vec<&EntityRecord<P>> {
        let mut records: Vec<&EntityRecord<P>> = self.records.values().map(|r| r.as_ref()).collect();
        records.sort_by_key(|r| r.key);
        records
    }

    /// Keys in order
    pub fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self.records.keys().copied().collect();
        keys.sort();
        keys
    }
}
