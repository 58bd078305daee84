use super::metrics::{IngestMetrics, MetricsSnapshot};
use super::snapshot::{ClassView, Snapshot};
use super::table::ClassTable;
use crate::class::EntityClass;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::event::parse_update;
use crate::queue::{Admission, Ingress, Sequencer};
use crate::record::{ClassChanged, UpdateKind, UpdateRecord};
use crate::resync::{ResyncFlag, ResyncReason, ResyncRequest};
use crate::view::{open_interfaces, CompositeView};
use crate::warmup::{WaitOutcome, WarmupCell, WarmupState};
use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What the ingestion path did with one update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Updates published (the update itself plus any replayed buffered deltas)
    Applied(usize),
    /// Duplicate or stale, dropped
    Stale,
    /// Held back until the class is resynchronised
    Buffered,
    /// Accepted into the ingress buffer, awaiting the driver
    Queued,
    /// Failed validation, dropped
    Malformed,
    /// Store is shut down
    Closed,
}

/// Per-class state shared between the writer and readers
struct ClassSlot<P> {
    /// Current table; replaced wholesale on every accepted update
    table: ArcSwap<ClassTable<P>>,
    warmup: WarmupCell,
    resync: ResyncFlag,
    /// Mirror of the sequencer's gap state, readable without the writer lock
    gapped: AtomicBool,
}

impl<P> ClassSlot<P> {
    fn new(class: EntityClass) -> Self {
        Self {
            table: ArcSwap::from_pointee(ClassTable::empty(class)),
            warmup: WarmupCell::new(),
            resync: ResyncFlag::default(),
            gapped: AtomicBool::new(false),
        }
    }

    fn view(&self) -> ClassView<P> {
        ClassView {
            table: self.table.load_full(),
            warmup: self.warmup.state(),
            stale: self.resync.is_stale(),
        }
    }
}

/// State store maintains the in-memory mirror of the client's state.
///
/// One ingestion path writes (`ingest` / `pump`); any number of threads read
/// through `snapshot`, `await_warm` and friends. Every class is published as
/// an immutable table behind an atomic pointer, so readers never block the
/// writer and never observe half of an update.
///
/// Create one per process with [`StateStore::new`], share it as
/// `Arc<StateStore>`, and call [`StateStore::shutdown`] on the way out.
pub struct StateStore<P = Value> {
    config: CacheConfig,

    /// Lock-free concurrent map of per-class slots
    classes: DashMap<EntityClass, Arc<ClassSlot<P>>>,

    /// Sequencing state; holding it makes the caller the writer
    writer: Mutex<Sequencer<P>>,

    /// Producer updates awaiting the driver
    ingress: Ingress<UpdateRecord<P>>,

    views: DashMap<String, Arc<CompositeView<P>>>,

    /// Thread currently driving ingestion
    driver: RwLock<Option<ThreadId>>,

    /// Broadcast channel for accepted updates
    change_tx: broadcast::Sender<ClassChanged>,

    /// Broadcast channel for resync requests
    resync_tx: broadcast::Sender<ResyncRequest>,

    closed: AtomicBool,

    /// Metrics tracker for monitoring
    pub metrics: IngestMetrics,
}

impl<P> StateStore<P>
where
    P: Send + Sync + 'static,
{
    /// Create a new store with no classes and no views
    pub fn new(config: CacheConfig) -> Arc<Self> {
        let capacity = config.ingest.broadcast_capacity.max(1);
        let (change_tx, _) = broadcast::channel(capacity);
        let (resync_tx, _) = broadcast::channel(capacity);

        let store = Self {
            classes: DashMap::new(),
            writer: Mutex::new(Sequencer::new(config.ingest.max_buffered_deltas)),
            ingress: Ingress::new(config.ingest.ingress_capacity),
            views: DashMap::new(),
            driver: RwLock::new(None),
            change_tx,
            resync_tx,
            closed: AtomicBool::new(false),
            metrics: IngestMetrics::new(config.metrics.rate_window_seconds),
            config,
        };

        info!(
            max_buffered_deltas = store.config.ingest.max_buffered_deltas,
            warmup_timeout_ms = store.config.warmup.default_timeout_ms,
            "State store created"
        );

        Arc::new(store)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn slot(&self, class: &EntityClass) -> Arc<ClassSlot<P>> {
        if let Some(slot) = self.classes.get(class) {
            return Arc::clone(slot.value());
        }
        let slot = self
            .classes
            .entry(class.clone())
            .or_insert_with(|| Arc::new(ClassSlot::new(class.clone())));
        Arc::clone(slot.value())
    }

    fn existing_slot(&self, class: &EntityClass) -> Option<Arc<ClassSlot<P>>> {
        self.classes.get(class).map(|slot| Arc::clone(slot.value()))
    }

    pub(super) fn lock_writer(&self) -> std::sync::MutexGuard<'_, Sequencer<P>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Ingestion ──────────────────────────────────────────────────────────

    /// Apply one update from the ingestion context.
    pub fn ingest(&self, update: UpdateRecord<P>) -> IngestOutcome {
        let mut writer = self.lock_writer();
        self.ingest_locked(&mut writer, update)
    }

    /// Queue an update for the driver. Safe from any thread.
    pub fn submit(&self, update: UpdateRecord<P>) -> Result<()> {
        self.ingress.push(update).inspect_err(|e| {
            self.metrics.record_rejected();
            warn!(error = %e, "Update submit refused");
        })
    }

    /// Drain every pending submitted update through the ingestion path.
    /// Returns how many updates were drained.
    pub fn pump(&self) -> usize {
        let mut writer = self.lock_writer();
        let batch = self.ingress.take_all();
        let count = batch.len();

        let start = Instant::now();
        for update in batch {
            self.ingest_locked(&mut writer, update);
        }

        if count > 10 {
            let elapsed = start.elapsed();
            debug!(
                events = count,
                elapsed_us = elapsed.as_micros() as u64,
                "Drained ingress"
            );
        }

        count
    }

    /// Updates submitted but not yet drained
    pub fn pending_ingress(&self) -> usize {
        self.ingress.len()
    }

    fn ingest_locked(&self, writer: &mut Sequencer<P>, update: UpdateRecord<P>) -> IngestOutcome {
        let class = update.class.clone();
        let sequence = update.sequence;
        let kind = update.kind();

        if self.closed.load(Ordering::Acquire) {
            self.metrics.record_rejected();
            debug!(class = %class, sequence = sequence, "Store shut down, update ignored");
            return IngestOutcome::Closed;
        }

        if class.is_view() {
            self.metrics.record_malformed();
            warn!(class = %class, sequence = sequence, "Update targets a derived view, skipping");
            return IngestOutcome::Malformed;
        }

        self.metrics.record_event(&class);

        let slot = self.slot(&class);
        if slot.warmup.mark_warming() {
            debug!(class = %class, "Class warming");
        }

        let admission = writer.admit(update);
        slot.gapped.store(writer.is_gapped(&class), Ordering::Release);

        match admission {
            Admission::Apply(admitted) => {
                if admitted.discarded > 0 {
                    self.metrics.record_discarded(admitted.discarded);
                    debug!(
                        class = %class,
                        discarded = admitted.discarded,
                        "Discarded buffered deltas superseded by full update"
                    );
                }

                let count = admitted.updates.len();
                let full_applied = kind == UpdateKind::Full;
                for update in admitted.updates {
                    self.publish(&slot, update);
                }

                if full_applied {
                    if let Some(request) = slot.resync.clear() {
                        info!(
                            class = %class,
                            sequence = sequence,
                            reason = ?request.reason,
                            "Resync satisfied"
                        );
                    }
                    if slot.warmup.mark_warm() {
                        info!(class = %class, sequence = sequence, "Class warm");
                    }
                    if let Some(reason) = admitted.regapped {
                        self.metrics.record_gap();
                        self.raise_resync(&class, &slot, reason);
                    }
                }

                IngestOutcome::Applied(count)
            }
            Admission::Stale => {
                self.metrics.record_stale();
                debug!(
                    class = %class,
                    sequence = sequence,
                    kind = ?kind,
                    "Dropped duplicate or stale update"
                );
                IngestOutcome::Stale
            }
            Admission::Buffered(outcome) => {
                self.metrics.record_buffered();
                if outcome.evicted > 0 {
                    self.metrics.record_discarded(outcome.evicted);
                    warn!(
                        class = %class,
                        evicted = outcome.evicted,
                        "Gap buffer full, evicted oldest deltas"
                    );
                }
                if let Some(reason) = outcome.raised {
                    if matches!(reason, ResyncReason::Gap { .. }) {
                        self.metrics.record_gap();
                    }
                    self.raise_resync(&class, &slot, reason);
                }
                IngestOutcome::Buffered
            }
        }
    }

    /// Build and publish the successor table. Single writer, so a plain
    /// load/store pair cannot lose an update.
    fn publish(&self, slot: &ClassSlot<P>, update: UpdateRecord<P>) {
        let kind = update.kind();
        let current = slot.table.load();
        let next = current.with_update(update, Utc::now());
        let change = ClassChanged {
            class: next.class().clone(),
            version: next.version(),
            sequence: next.sequence(),
            kind,
            timestamp: Utc::now(),
        };

        slot.table.store(Arc::new(next));
        self.metrics.record_applied(kind);

        // No subscribers is fine
        let _ = self.change_tx.send(change);
    }

    fn raise_resync(&self, class: &EntityClass, slot: &ClassSlot<P>, reason: ResyncReason) {
        let Some(request) = slot.resync.raise(class, reason) else {
            return;
        };

        match reason {
            ResyncReason::Gap { expected, received } => warn!(
                class = %class,
                expected = expected,
                received = received,
                missed = received - expected,
                "Sequence gap detected, resync requested"
            ),
            ResyncReason::NoBaseline => info!(
                class = %class,
                "Update arrived before any full update, resync requested"
            ),
            ResyncReason::Explicit => info!(class = %class, "Resync requested"),
        }

        let _ = self.resync_tx.send(request);
    }

    // ── Ingestion driver ───────────────────────────────────────────────────

    /// Mark the calling thread as the one driving ingestion. `await_warm`
    /// called from this thread drains the ingress itself instead of blocking.
    pub fn register_driver(&self) {
        let id = thread::current().id();
        *self.driver.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    /// Clear the registration if the calling thread holds it
    pub fn unregister_driver(&self) {
        let id = thread::current().id();
        let mut driver = self.driver.write().unwrap_or_else(PoisonError::into_inner);
        if *driver == Some(id) {
            *driver = None;
        }
    }

    pub(crate) fn clear_driver(&self) {
        *self.driver.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_driver_thread(&self) -> bool {
        let driver = self.driver.read().unwrap_or_else(PoisonError::into_inner);
        *driver == Some(thread::current().id())
    }

    pub(crate) async fn ingress_rung(&self) {
        self.ingress.rung().await;
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    /// Capture the current table of each requested class (primary or view).
    /// Unknown views are left out of the snapshot.
    pub fn snapshot(&self, classes: &[EntityClass]) -> Snapshot<P> {
        let mut captured = HashMap::with_capacity(classes.len());

        for class in classes {
            if captured.contains_key(class) {
                continue;
            }
            let view = match class {
                EntityClass::View(name) => match self.view(name) {
                    Some(view) => view.read(|input| self.class_view(input)),
                    None => {
                        debug!(view = %name, "Snapshot requested unknown view");
                        continue;
                    }
                },
                _ => self.class_view(class),
            };
            captured.insert(class.clone(), view);
        }

        Snapshot::new(captured)
    }

    fn class_view(&self, class: &EntityClass) -> ClassView<P> {
        match self.existing_slot(class) {
            Some(slot) => slot.view(),
            None => ClassView {
                table: Arc::new(ClassTable::empty(class.clone())),
                warmup: WarmupState::Cold,
                stale: false,
            },
        }
    }

    /// Current published table of a primary class
    pub fn table(&self, class: &EntityClass) -> Arc<ClassTable<P>> {
        self.class_view(class).table
    }

    /// Current version of a class (views: max of their inputs)
    pub fn version(&self, class: &EntityClass) -> u64 {
        match class {
            EntityClass::View(name) => self.view(name).map_or(0, |view| {
                view.inputs()
                    .iter()
                    .map(|input| self.class_view(input).version())
                    .max()
                    .unwrap_or(0)
            }),
            _ => self.class_view(class).version(),
        }
    }

    pub fn warmup_state(&self, class: &EntityClass) -> WarmupState {
        self.existing_slot(class)
            .map_or(WarmupState::Cold, |slot| slot.warmup.state())
    }

    /// Class is serving data that predates a pending resync. A view is stale
    /// when any of its inputs is.
    pub fn is_stale(&self, class: &EntityClass) -> bool {
        match class {
            EntityClass::View(name) => self.view(name).map_or(false, |view| {
                view.inputs().iter().any(|input| self.is_stale(input))
            }),
            _ => self
                .existing_slot(class)
                .map_or(false, |slot| slot.resync.is_stale()),
        }
    }

    /// Class delta application is suspended until the next full update
    pub fn is_gapped(&self, class: &EntityClass) -> bool {
        self.existing_slot(class)
            .map_or(false, |slot| slot.gapped.load(Ordering::Acquire))
    }

    // ── Warmup gate ────────────────────────────────────────────────────────

    /// Block until a full update of `class` has been applied, or fail with
    /// `WarmupTimeout`. For a view, every input must warm up.
    ///
    /// On the registered ingestion driver thread this drains pending
    /// producer updates synchronously between checks instead of blocking on
    /// itself.
    pub fn await_warm(&self, class: &EntityClass, timeout: Duration) -> Result<()> {
        let targets = self.warmup_targets(class)?;
        if self.all_warm(&targets) {
            return Ok(());
        }

        let deadline = deadline_after(timeout);
        for target in targets {
            self.await_class_warm(&target, timeout, deadline)?;
        }
        Ok(())
    }

    /// `await_warm` with the configured default timeout
    pub fn await_warm_default(&self, class: &EntityClass) -> Result<()> {
        self.await_warm(class, self.config.warmup.default_timeout())
    }

    /// Async variant for tokio callers. Never drains synchronously: the
    /// awaiting task yields, so a driver task on the same runtime keeps going.
    pub async fn await_warm_async(&self, class: &EntityClass, timeout: Duration) -> Result<()> {
        let targets = self.warmup_targets(class)?;
        if self.all_warm(&targets) {
            return Ok(());
        }

        let deadline = deadline_after(timeout);
        for target in targets {
            let slot = self.slot(&target);
            if slot.warmup.is_warm() {
                continue;
            }
            if self.is_closed() {
                return Err(CacheError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match slot.warmup.wait_async(remaining).await {
                WaitOutcome::Warm => {}
                WaitOutcome::Closed => return Err(CacheError::Closed),
                WaitOutcome::TimedOut => return Err(self.warmup_timeout(&target, timeout)),
            }
        }
        Ok(())
    }

    fn all_warm(&self, targets: &[EntityClass]) -> bool {
        targets
            .iter()
            .all(|target| self.warmup_state(target) == WarmupState::Warm)
    }

    fn warmup_targets(&self, class: &EntityClass) -> Result<Vec<EntityClass>> {
        match class {
            EntityClass::View(name) => self
                .view(name)
                .map(|view| view.inputs().to_vec())
                .ok_or_else(|| CacheError::UnknownView(name.clone())),
            _ => Ok(vec![class.clone()]),
        }
    }

    fn await_class_warm(
        &self,
        class: &EntityClass,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<()> {
        let slot = self.slot(class);
        if slot.warmup.is_warm() {
            return Ok(());
        }
        if self.is_closed() {
            return Err(CacheError::Closed);
        }

        if self.is_driver_thread() {
            return self.drive_until_warm(class, &slot, timeout, deadline);
        }

        match slot.warmup.wait_until(deadline) {
            WaitOutcome::Warm => Ok(()),
            WaitOutcome::Closed => Err(CacheError::Closed),
            WaitOutcome::TimedOut => Err(self.warmup_timeout(class, timeout)),
        }
    }

    /// Reentrant warmup: the caller is the driver, so nobody else will apply
    /// the full update it is waiting for.
    fn drive_until_warm(
        &self,
        class: &EntityClass,
        slot: &ClassSlot<P>,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<()> {
        debug!(class = %class, "Warmup awaited on the ingestion driver thread, draining synchronously");
        let poll = self.config.warmup.driver_poll();

        loop {
            self.pump();
            if slot.warmup.is_warm() {
                return Ok(());
            }
            if self.is_closed() {
                return Err(CacheError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(self.warmup_timeout(class, timeout));
            }
            self.ingress.wait_ready((deadline - now).min(poll));
        }
    }

    fn warmup_timeout(&self, class: &EntityClass, timeout: Duration) -> CacheError {
        warn!(
            class = %class,
            timeout_ms = timeout.as_millis() as u64,
            processed = self.metrics.get_total_events(),
            "Warmup timed out"
        );
        CacheError::WarmupTimeout {
            class: class.clone(),
            waited: timeout,
        }
    }

    // ── Resync ─────────────────────────────────────────────────────────────

    /// Invalidate a class: flag it stale and ask the producer for a full
    /// update. Deltas keep applying meanwhile. For a view, every input is
    /// invalidated.
    pub fn request_resync(&self, class: &EntityClass) {
        match class {
            EntityClass::View(name) => {
                if let Some(view) = self.view(name) {
                    for input in view.inputs() {
                        self.request_resync(input);
                    }
                }
            }
            _ => {
                let slot = self.slot(class);
                self.raise_resync(class, &slot, ResyncReason::Explicit);
            }
        }
    }

    /// Outstanding resync requests, ordered by class
    pub fn pending_resyncs(&self) -> Vec<ResyncRequest> {
        let mut pending: Vec<ResyncRequest> = self
            .classes
            .iter()
            .filter_map(|slot| slot.resync.pending())
            .collect();
        pending.sort_by(|a, b| a.class.cmp(&b.class));
        pending
    }

    /// Subscribe to resync requests as they are raised
    pub fn subscribe_resyncs(&self) -> broadcast::Receiver<ResyncRequest> {
        self.resync_tx.subscribe()
    }

    /// Subscribe to accepted updates
    pub fn subscribe(&self) -> broadcast::Receiver<ClassChanged> {
        self.change_tx.subscribe()
    }

    // ── Views ──────────────────────────────────────────────────────────────

    /// Register a composite view, replacing any view with the same name
    pub fn register_view(&self, view: CompositeView<P>) {
        info!(view = %view.name(), inputs = ?view.inputs(), "Composite view registered");
        self.views.insert(view.name().to_string(), Arc::new(view));
    }

    pub fn view(&self, name: &str) -> Option<Arc<CompositeView<P>>> {
        self.views.get(name).map(|view| Arc::clone(view.value()))
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .get_snapshot(self.config.metrics.rate_window_seconds as i64)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop ingestion and release every warmup waiter. Reads keep serving
    /// the last published state. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.ingress.close();
        for slot in self.classes.iter() {
            slot.warmup.close();
        }

        info!(
            classes = self.classes.len(),
            dropped_pending = self.ingress.len(),
            "State store shut down"
        );
    }
}

/// Longest wait honoured; larger timeouts are treated as this
const MAX_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline `timeout` from now. Timeouts past the representable range of
/// `Instant` (e.g. `Duration::MAX`) wait for `MAX_WAIT` instead.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(MAX_WAIT))
        .unwrap_or(now)
}

impl StateStore<Value> {
    /// Store with the standard composite views registered
    pub fn with_standard_views(config: CacheConfig) -> Arc<Self> {
        let store = Self::new(config);
        store.register_view(open_interfaces());
        store
    }

    /// Decode, validate and apply a JSON-encoded update. Malformed updates
    /// are logged and dropped.
    pub fn ingest_raw(&self, bytes: &[u8]) -> IngestOutcome {
        match parse_update(bytes) {
            Ok(update) => self.ingest(update),
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, "Malformed update, skipping");
                IngestOutcome::Malformed
            }
        }
    }

    /// Decode and validate a JSON-encoded update, then queue it for the
    /// driver. Malformed updates are logged, counted and dropped.
    pub fn submit_raw(&self, bytes: &[u8]) -> Result<IngestOutcome> {
        match parse_update(bytes) {
            Ok(update) => self.submit(update).map(|_| IngestOutcome::Queued),
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, "Malformed update, skipping");
                Ok(IngestOutcome::Malformed)
            }
        }
    }
}
