// State store: published per-class tables, snapshots and ingestion metrics

mod engine;
mod metrics;
mod snapshot;
mod table;

pub use engine::{IngestOutcome, StateStore};
pub use metrics::{IngestMetrics, MetricsSnapshot};
pub use snapshot::{ClassView, Snapshot};
pub use table::ClassTable;
