use super::RawUpdate;
use crate::class::{EntityClass, EntityKey, ParseClassError};
use crate::record::{UpdateKind, UpdateRecord};
use serde_json::Value;
use thiserror::Error;

/// Reasons a raw update is malformed. Malformed updates are logged and
/// dropped; ingestion continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("failed to decode update: {0}")]
    Decode(String),
    #[error(transparent)]
    InvalidClass(#[from] ParseClassError),
    #[error("class '{0}' is a derived view and cannot be ingested")]
    ViewNotIngestible(String),
    #[error("sequence must be positive")]
    ZeroSequence,
    #[error("{0:?} update requires a key")]
    MissingKey(UpdateKind),
    #[error("full update must not carry a key")]
    UnexpectedKey,
    #[error("delta update requires a payload")]
    MissingPayload,
    #[error("full update payload must be an array or an object")]
    InvalidFullPayload,
    #[error("full update key '{0}' is not an unsigned integer")]
    InvalidFullKey(String),
}

/// Decodes a JSON-encoded raw update and validates it.
pub fn parse_update(bytes: &[u8]) -> Result<UpdateRecord<Value>, ValidationError> {
    let raw: RawUpdate =
        serde_json::from_slice(bytes).map_err(|e| ValidationError::Decode(e.to_string()))?;
    validate(raw)
}

/// Validates a raw update.
///
/// Validation rules:
/// - Class: must parse and must not be a view
/// - Sequence: must be positive
/// - Full: no key; payload is an array (index = key, null = empty slot)
///   or an object keyed by unsigned integers
/// - Delta: key and non-null payload required
/// - Remove: key required, payload ignored
pub fn validate(raw: RawUpdate) -> Result<UpdateRecord<Value>, ValidationError> {
    let class: EntityClass = raw.class.parse()?;
    if class.is_view() {
        return Err(ValidationError::ViewNotIngestible(raw.class));
    }

    if raw.sequence == 0 {
        return Err(ValidationError::ZeroSequence);
    }

    match raw.kind {
        UpdateKind::Full => {
            if raw.key.is_some() {
                return Err(ValidationError::UnexpectedKey);
            }
            let entries = full_entries(raw.payload)?;
            Ok(UpdateRecord::full(class, raw.sequence, entries))
        }
        UpdateKind::Delta => {
            let key = raw.key.ok_or(ValidationError::MissingKey(UpdateKind::Delta))?;
            if raw.payload.is_null() {
                return Err(ValidationError::MissingPayload);
            }
            Ok(UpdateRecord::delta(class, raw.sequence, key, raw.payload))
        }
        UpdateKind::Remove => {
            let key = raw.key.ok_or(ValidationError::MissingKey(UpdateKind::Remove))?;
            Ok(UpdateRecord::remove(class, raw.sequence, key))
        }
    }
}

/// Flattens a full payload into keyed entries.
fn full_entries(payload: Value) -> Result<Vec<(EntityKey, Value)>, ValidationError> {
    match payload {
        // Empty slots are sent as null and produce no record
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (EntityKey::from(i), v))
            .collect()),
        Value::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (k, v) in map {
                let key = k
                    .parse::<u64>()
                    .map_err(|_| ValidationError::InvalidFullKey(k.clone()))?;
                if !v.is_null() {
                    entries.push((EntityKey(key), v));
                }
            }
            Ok(entries)
        }
        // An empty class is sent as a null payload
        Value::Null => Ok(Vec::new()),
        _ => Err(ValidationError::InvalidFullPayload),
    }
}
