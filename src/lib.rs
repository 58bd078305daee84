// Entity identity: classes and keys
pub mod class;

// Records, updates and typed domain payloads
pub mod record;

// Raw event format and validation
pub mod event;

// Sequenced update queue
pub mod queue;

// State store, snapshots and metrics
pub mod store;

// Warmup gate
pub mod warmup;

// Composite views
pub mod view;

// Resync requests
pub mod resync;

// Ingestion driver
pub mod driver;

pub mod config;
pub mod error;
pub mod telemetry;

pub use class::{EntityClass, EntityKey};
pub use config::{load_config, CacheConfig};
pub use driver::Driver;
pub use error::CacheError;
pub use record::{ClassChanged, EntityRecord, UpdateKind, UpdateOp, UpdateRecord};
pub use resync::{ResyncReason, ResyncRequest};
pub use store::{ClassTable, ClassView, IngestOutcome, Snapshot, StateStore};
pub use view::CompositeView;
pub use warmup::WarmupState;
