use crate::class::{EntityClass, EntityKey};
use crate::record::{UpdateOp, UpdateRecord};
use crate::resync::ResyncReason;
use std::collections::{BTreeMap, HashMap};

/// Decision for one incoming update
#[derive(Debug)]
pub enum Admission<P> {
    /// Apply these updates to the store, in order
    Apply(Admitted<P>),
    /// Duplicate or stale (sequence already consumed); dropped harmlessly
    Stale,
    /// Held back until the class is resynchronised by a Full
    Buffered(BufferOutcome),
}

#[derive(Debug)]
pub struct Admitted<P> {
    pub updates: Vec<UpdateRecord<P>>,
    /// Buffered deltas made obsolete by an applying Full
    pub discarded: usize,
    /// The applying Full ended a gap or a missing baseline
    pub resynced: bool,
    /// Replaying buffered deltas after a Full hit another hole
    pub regapped: Option<ResyncReason>,
}

#[derive(Debug, PartialEq)]
pub struct BufferOutcome {
    /// Set when this update newly put the class into the resync-needed state
    pub raised: Option<ResyncReason>,
    /// Oldest buffered deltas evicted to respect the buffer bound
    pub evicted: usize,
}

/// Sequencing state of one class
#[derive(Debug)]
struct ClassSequence<P> {
    /// Highest accepted sequence
    last: u64,
    /// A Full has been applied at least once
    baseline: bool,
    /// Every key's lastApplied is at least this (sequence of the last Full)
    floor: u64,
    last_applied: HashMap<EntityKey, u64>,
    /// Delta application is suspended until the next Full
    gapped: bool,
    buffered: BTreeMap<u64, UpdateRecord<P>>,
}

impl<P> Default for ClassSequence<P> {
    fn default() -> Self {
        Self {
            last: 0,
            baseline: false,
            floor: 0,
            last_applied: HashMap::new(),
            gapped: false,
            buffered: BTreeMap::new(),
        }
    }
}

impl<P> ClassSequence<P> {
    fn last_applied(&self, key: &EntityKey) -> u64 {
        self.last_applied
            .get(key)
            .copied()
            .unwrap_or(0)
            .max(self.floor)
    }

    fn is_stale(&self, key: &EntityKey, sequence: u64) -> bool {
        sequence <= self.last_applied(key) || (self.baseline && sequence <= self.last)
    }

    fn accept_keyed(&mut self, key: EntityKey, sequence: u64) {
        self.last = sequence;
        self.last_applied.insert(key, sequence);
    }

    /// Returns how many deltas were evicted
    fn buffer(&mut self, update: UpdateRecord<P>, max: usize) -> usize {
        self.buffered.insert(update.sequence, update);
        let mut evicted = 0;
        while self.buffered.len() > max {
            self.buffered.pop_first();
            evicted += 1;
        }
        evicted
    }
}

/// Per-class ordering state. Owned by the single ingestion path.
///
/// - Full: applies unless its sequence was already consumed; resets every
///   key's lastApplied to the Full's sequence and ends any gap
/// - Delta/Remove with sequence <= lastApplied: stale, dropped
/// - Delta/Remove with sequence > last + 1: gap, buffered, resync raised
/// - Gapped (or never-baselined) classes buffer every delta until a Full
#[derive(Debug)]
pub struct Sequencer<P> {
    classes: HashMap<EntityClass, ClassSequence<P>>,
    max_buffered: usize,
}

impl<P> Sequencer<P> {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            classes: HashMap::new(),
            max_buffered: max_buffered.max(1),
        }
    }

    /// Decide what to do with `update`
    pub fn admit(&mut self, update: UpdateRecord<P>) -> Admission<P> {
        let max_buffered = self.max_buffered;
        let state = self.classes.entry(update.class.clone()).or_default();

        let key = match &update.op {
            UpdateOp::Full(_) => return Self::admit_full(state, update),
            UpdateOp::Delta { key, .. } | UpdateOp::Remove { key } => *key,
        };

        if !state.baseline {
            let raised = if state.buffered.is_empty() {
                Some(ResyncReason::NoBaseline)
            } else {
                None
            };
            let evicted = state.buffer(update, max_buffered);
            return Admission::Buffered(BufferOutcome { raised, evicted });
        }

        if state.is_stale(&key, update.sequence) {
            return Admission::Stale;
        }

        if state.gapped {
            let evicted = state.buffer(update, max_buffered);
            return Admission::Buffered(BufferOutcome {
                raised: None,
                evicted,
            });
        }

        let expected = state.last.saturating_add(1);
        if update.sequence > expected {
            state.gapped = true;
            let raised = Some(ResyncReason::Gap {
                expected,
                received: update.sequence,
            });
            let evicted = state.buffer(update, max_buffered);
            return Admission::Buffered(BufferOutcome { raised, evicted });
        }

        state.accept_keyed(key, update.sequence);
        Admission::Apply(Admitted {
            updates: vec![update],
            discarded: 0,
            resynced: false,
            regapped: None,
        })
    }

    fn admit_full(state: &mut ClassSequence<P>, full: UpdateRecord<P>) -> Admission<P> {
        let sequence = full.sequence;
        if state.baseline && sequence <= state.last {
            return Admission::Stale;
        }

        let resynced = state.gapped || !state.baseline;
        state.baseline = true;
        state.gapped = false;
        state.last = sequence;
        state.floor = sequence;
        state.last_applied.clear();

        // Deltas at or below the Full are superseded by it
        let discarded = state.buffered.range(..=sequence).count();
        state.buffered.retain(|&buffered, _| buffered > sequence);

        let mut updates = vec![full];
        let mut regapped = None;
        while let Some((&next, _)) = state.buffered.first_key_value() {
            let expected = state.last.saturating_add(1);
            if next > expected {
                state.gapped = true;
                regapped = Some(ResyncReason::Gap {
                    expected,
                    received: next,
                });
                break;
            }
            let Some((_, delta)) = state.buffered.pop_first() else {
                break;
            };
            if let Some(key) = delta.key() {
                state.accept_keyed(key, delta.sequence);
                updates.push(delta);
            }
        }

        Admission::Apply(Admitted {
            updates,
            discarded,
            resynced,
            regapped,
        })
    }

    pub fn is_gapped(&self, class: &EntityClass) -> bool {
        self.classes.get(class).map_or(false, |s| s.gapped)
    }

    pub fn last_sequence(&self, class: &EntityClass) -> u64 {
        self.classes.get(class).map_or(0, |s| s.last)
    }

    pub fn buffered_len(&self, class: &EntityClass) -> usize {
        self.classes.get(class).map_or(0, |s| s.buffered.len())
    }
}
