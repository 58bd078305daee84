use super::table::ClassTable;
use crate::class::{EntityClass, EntityKey};
use crate::error::{CacheError, Result};
use crate::record::EntityRecord;
use crate::warmup::WarmupState;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One class as captured by a snapshot
#[derive(Debug)]
pub struct ClassView<P> {
    pub(crate) table: Arc<ClassTable<P>>,
    pub(crate) warmup: WarmupState,
    pub(crate) stale: bool,
}

impl<P> Clone for ClassView<P> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            warmup: self.warmup,
            stale: self.stale,
        }
    }
}

impl<P> ClassView<P> {
    pub fn table(&self) -> &ClassTable<P> {
        &self.table
    }

    pub fn version(&self) -> u64 {
        self.table.version()
    }

    pub fn warmup(&self) -> WarmupState {
        self.warmup
    }

    /// Served data predates a pending resync
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// Point-in-time view over one or more classes.
///
/// Each class is a single published table: no class mixes records from
/// before and after an update. Different classes in the same snapshot may
/// have been captured at different moments.
#[derive(Debug)]
pub struct Snapshot<P> {
    taken_at: DateTime<Utc>,
    classes: HashMap<EntityClass, ClassView<P>>,
}

impl<P> Snapshot<P> {
    pub(crate) fn new(classes: HashMap<EntityClass, ClassView<P>>) -> Self {
        Self {
            taken_at: Utc::now(),
            classes,
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// `None` when the class was not requested or names an unknown view
    pub fn class(&self, class: &EntityClass) -> Option<&ClassView<P>> {
        self.classes.get(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &EntityClass> {
        self.classes.keys()
    }

    pub fn get(&self, class: &EntityClass, key: impl Into<EntityKey>) -> Option<&EntityRecord<P>> {
        self.classes.get(class).and_then(|view| view.table.get(key))
    }

    /// Records of `class` in key order; empty if absent
    pub fn records(&self, class: &EntityClass) -> Vec<&EntityRecord<P>> {
        self.classes
            .get(class)
            .map(|view| view.table.records())
            .unwrap_or_default()
    }

    pub fn len(&self, class: &EntityClass) -> usize {
        self.classes.get(class).map_or(0, |view| view.table.len())
    }

    pub fn version(&self, class: &EntityClass) -> Option<u64> {
        self.classes.get(class).map(|view| view.version())
    }

    pub fn warmup(&self, class: &EntityClass) -> WarmupState {
        self.classes
            .get(class)
            .map_or(WarmupState::Cold, |view| view.warmup)
    }

    pub fn is_stale(&self, class: &EntityClass) -> bool {
        self.classes.get(class).map_or(false, |view| view.stale)
    }
}

impl Snapshot<Value> {
    /// Decode every record of `class` into a typed payload, in key order
    pub fn decode<T: DeserializeOwned>(&self, class: &EntityClass) -> Result<Vec<(EntityKey, T)>> {
        self.records(class)
            .into_iter()
            .map(|record| decode_record(record).map(|payload| (record.key, payload)))
            .collect()
    }

    /// Decode one record, `Ok(None)` if it is absent
    pub fn decode_one<T: DeserializeOwned>(
        &self,
        class: &EntityClass,
        key: impl Into<EntityKey>,
    ) -> Result<Option<T>> {
        self.get(class, key).map(decode_record).transpose()
    }
}

fn decode_record<T: DeserializeOwned>(record: &EntityRecord<Value>) -> Result<T> {
    T::deserialize(&record.payload).map_err(|e| CacheError::Decode {
        class: record.class.clone(),
        key: record.key,
        message: e.to_string(),
    })
}
