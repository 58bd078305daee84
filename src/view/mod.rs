//! Composite views: aggregates derived from several entity classes.
//!
//! A view is rebuilt lazily when a reader asks for it and at least one input
//! version advanced since the last build; otherwise the memoized table is
//! served. While any input awaits a resync the last build is served with the
//! stale marker and rebuilding is deferred.

mod interfaces;

pub use interfaces::{open_interfaces, OpenInterface, OPEN_INTERFACES};

use crate::class::{EntityClass, EntityKey};
use crate::record::EntityRecord;
use crate::store::{ClassTable, ClassView};
use crate::warmup::WarmupState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[cfg(test)]
mod tests;

/// Inputs handed to a view's derive function
pub struct ViewInputs<'a, P> {
    tables: &'a [(EntityClass, Arc<ClassTable<P>>)],
}

impl<'a, P> ViewInputs<'a, P> {
    pub fn table(&self, class: &EntityClass) -> Option<&'a ClassTable<P>> {
        self.tables
            .iter()
            .find(|(c, _)| c == class)
            .map(|(_, t)| t.as_ref())
    }

    /// Records of `class` in key order; empty if it is not an input
    pub fn records(&self, class: &EntityClass) -> Vec<&'a EntityRecord<P>> {
        self.table(class).map(|t| t.records()).unwrap_or_default()
    }
}

type DeriveFn<P> = dyn Fn(&ViewInputs<'_, P>) -> Vec<(EntityKey, P)> + Send + Sync;

struct Memo<P> {
    observed: Vec<u64>,
    table: Arc<ClassTable<P>>,
}

/// A derived class exposed through snapshots as `EntityClass::View(name)`
pub struct CompositeView<P> {
    name: String,
    inputs: Vec<EntityClass>,
    derive: Box<DeriveFn<P>>,
    memo: Mutex<Option<Memo<P>>>,
    rebuilds: AtomicU64,
}

impl<P> CompositeView<P> {
    pub fn new<F>(name: impl Into<String>, inputs: Vec<EntityClass>, derive: F) -> Self
    where
        F: Fn(&ViewInputs<'_, P>) -> Vec<(EntityKey, P)> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inputs,
            derive: Box::new(derive),
            memo: Mutex::new(None),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> EntityClass {
        EntityClass::View(self.name.clone())
    }

    pub fn inputs(&self) -> &[EntityClass] {
        &self.inputs
    }

    /// Number of times the derive function has run
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Current table of the view, rebuilding it if an input moved on.
    /// `load` returns the currently published view of an input class.
    pub(crate) fn read<L>(&self, load: L) -> ClassView<P>
    where
        L: Fn(&EntityClass) -> ClassView<P>,
    {
        let states: Vec<ClassView<P>> = self.inputs.iter().map(&load).collect();
        let warmup = combined_warmup(&states);
        let blocked = states.iter().any(|s| s.is_stale());
        let versions: Vec<u64> = states.iter().map(|s| s.version()).collect();

        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = memo.as_ref() {
            // A concurrent reader may already have built from newer inputs
            if blocked || covers(&current.observed, &versions) {
                return ClassView {
                    table: Arc::clone(&current.table),
                    warmup,
                    stale: blocked,
                };
            }
        }

        let tables: Vec<(EntityClass, Arc<ClassTable<P>>)> = self
            .inputs
            .iter()
            .cloned()
            .zip(states.into_iter().map(|s| s.table))
            .collect();
        let entries = (self.derive)(&ViewInputs { tables: &tables });
        let version = versions.iter().copied().max().unwrap_or(0);
        let table = Arc::new(ClassTable::derived(self.class(), version, entries));
        self.rebuilds.fetch_add(1, Ordering::Relaxed);

        debug!(
            view = %self.name,
            version = version,
            records = table.len(),
            "Rebuilt composite view"
        );

        let behind = memo
            .as_ref()
            .is_some_and(|current| !covers(&versions, &current.observed));
        if !behind {
            *memo = Some(Memo {
                observed: versions,
                table: Arc::clone(&table),
            });
        }

        ClassView {
            table,
            warmup,
            stale: blocked,
        }
    }
}

/// Every version in `newer` is at least the matching one in `older`
fn covers(newer: &[u64], older: &[u64]) -> bool {
    newer.len() == older.len() && newer.iter().zip(older).all(|(n, o)| n >= o)
}

/// Warm when every input is warm, Cold when none has seen activity
fn combined_warmup<P>(states: &[ClassView<P>]) -> WarmupState {
    if states.iter().all(|s| s.warmup() == WarmupState::Warm) {
        WarmupState::Warm
    } else if states.iter().all(|s| s.warmup() == WarmupState::Cold) {
        WarmupState::Cold
    } else {
        WarmupState::Warming
    }
}
