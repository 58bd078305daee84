use crate::class::EntityClass;
use crate::record::UpdateKind;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Tracks ingestion metrics for the state store
#[derive(Clone)]
pub struct IngestMetrics {
    /// Total updates received by the ingestion path (lifetime counter)
    total_events: Arc<AtomicU64>,

    fulls_applied: Arc<AtomicU64>,
    deltas_applied: Arc<AtomicU64>,
    removes_applied: Arc<AtomicU64>,

    /// Duplicate or stale updates dropped
    stale_dropped: Arc<AtomicU64>,

    /// Sequence gaps detected
    gaps: Arc<AtomicU64>,

    /// Deltas held back for a resync
    buffered: Arc<AtomicU64>,

    /// Buffered deltas thrown away (superseded by a Full, or evicted)
    discarded: Arc<AtomicU64>,

    malformed: Arc<AtomicU64>,

    /// Submits refused (ingress full or store shut down)
    rejected: Arc<AtomicU64>,

    /// Event timestamps for rate calculation (sliding window)
    event_timestamps: Arc<RwLock<VecDeque<i64>>>,

    /// Active classes (class -> last_seen_timestamp_ms)
    active_classes: Arc<RwLock<HashMap<EntityClass, i64>>>,

    window_ms: i64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl IngestMetrics {
    /// Create new metrics tracker with a rate window in seconds
    pub fn new(rate_window_seconds: u64) -> Self {
        Self {
            total_events: Arc::new(AtomicU64::new(0)),
            fulls_applied: Arc::new(AtomicU64::new(0)),
            deltas_applied: Arc::new(AtomicU64::new(0)),
            removes_applied: Arc::new(AtomicU64::new(0)),
            stale_dropped: Arc::new(AtomicU64::new(0)),
            gaps: Arc::new(AtomicU64::new(0)),
            buffered: Arc::new(AtomicU64::new(0)),
            discarded: Arc::new(AtomicU64::new(0)),
            malformed: Arc::new(AtomicU64::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
            event_timestamps: Arc::new(RwLock::new(VecDeque::new())),
            active_classes: Arc::new(RwLock::new(HashMap::new())),
            window_ms: (rate_window_seconds.max(1) * 1000) as i64,
        }
    }

    /// Record an incoming update (call from the ingestion path)
    pub fn record_event(&self, class: &EntityClass) {
        bump(&self.total_events);

        let now = Utc::now().timestamp_millis();

        // Update sliding window for rate calculation
        {
            let mut timestamps = self
                .event_timestamps
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            timestamps.push_back(now);

            // Prune timestamps older than the window
            while let Some(&oldest) = timestamps.front() {
                if now - oldest > self.window_ms {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
        }

        // Update active classes
        {
            let mut classes = self
                .active_classes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            classes.insert(class.clone(), now);
        }
    }

    pub fn record_applied(&self, kind: UpdateKind) {
        match kind {
            UpdateKind::Full => bump(&self.fulls_applied),
            UpdateKind::Delta => bump(&self.deltas_applied),
            UpdateKind::Remove => bump(&self.removes_applied),
        }
    }

    pub fn record_stale(&self) {
        bump(&self.stale_dropped);
    }

    pub fn record_gap(&self) {
        bump(&self.gaps);
    }

    pub fn record_buffered(&self) {
        bump(&self.buffered);
    }

    pub fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        bump(&self.malformed);
    }

    pub fn record_rejected(&self) {
        bump(&self.rejected);
    }

    /// Get current ingest rate (updates per second over the window)
    pub fn get_event_rate(&self) -> f64 {
        let timestamps = self
            .event_timestamps
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        timestamps.len() as f64 / (self.window_ms as f64 / 1000.0)
    }

    /// Get count of classes that received updates within the window
    pub fn get_active_class_count(&self, window_seconds: i64) -> usize {
        let now = Utc::now().timestamp_millis();
        let threshold = now - (window_seconds * 1000);

        let classes = self
            .active_classes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        classes
            .values()
            .filter(|&&last_seen| last_seen > threshold)
            .count()
    }

    pub fn get_total_events(&self) -> u64 {
        read(&self.total_events)
    }

    /// Get snapshot of all metrics
    pub fn get_snapshot(&self, active_window_seconds: i64) -> MetricsSnapshot {
        MetricsSnapshot {
            total_events: self.get_total_events(),
            event_rate: self.get_event_rate(),
            active_classes: self.get_active_class_count(active_window_seconds),
            fulls_applied: read(&self.fulls_applied),
            deltas_applied: read(&self.deltas_applied),
            removes_applied: read(&self.removes_applied),
            stale_dropped: read(&self.stale_dropped),
            gaps: read(&self.gaps),
            buffered: read(&self.buffered),
            discarded: read(&self.discarded),
            malformed: read(&self.malformed),
            rejected: read(&self.rejected),
        }
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_events: u64,
    pub event_rate: f64,
    pub active_classes: usize,
    pub fulls_applied: u64,
    pub deltas_applied: u64,
    pub removes_applied: u64,
    pub stale_dropped: u64,
    pub gaps: u64,
    pub buffered: u64,
    pub discarded: u64,
    pub malformed: u64,
    pub rejected: u64,
}
