use crate::record::{UpdateKind, UpdateRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod validation;

pub use validation::{parse_update, validate, ValidationError};

/// RawUpdate is a change notification as the client process emits it.
///
/// The envelope is fixed; the payload is domain data the cache never
/// interprets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawUpdate {
    /// Entity class string (e.g., "container:inventory", "widget")
    pub class: String,

    pub kind: UpdateKind,

    /// Per-class sequence number, starting at 1
    pub sequence: u64,

    /// Target key for delta/remove; must be absent on full
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,

    /// Record payload (delta), or every record of the class (full):
    /// an array indexed by key or an object keyed by decimal key strings
    #[serde(default)]
    pub payload: Value,
}

impl RawUpdate {
    /// Validates the envelope and converts it into a sequenced update.
    pub fn into_update(self) -> Result<UpdateRecord<Value>, ValidationError> {
        validation::validate(self)
    }
}
