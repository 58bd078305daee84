use super::{CompositeView, ViewInputs};
use crate::class::{EntityClass, EntityKey};
use crate::record::domain::{ActiveInterface, WidgetNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const OPEN_INTERFACES: &str = "open_interfaces";

/// One open interface group with its visible widgets
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenInterface {
    pub group: u16,
    pub modal: bool,
    /// Visible widgets without a parent
    pub roots: Vec<EntityKey>,
    /// Every visible widget of the group, in key order
    pub widgets: Vec<EntityKey>,
}

/// "Currently open interface tree": joins the active interface groups with
/// the widget tree. Keyed by group id.
pub fn open_interfaces() -> CompositeView<Value> {
    CompositeView::new(
        OPEN_INTERFACES,
        vec![EntityClass::Interface, EntityClass::Widget],
        derive_open_interfaces,
    )
}

fn derive_open_interfaces(inputs: &ViewInputs<'_, Value>) -> Vec<(EntityKey, Value)> {
    let mut groups: BTreeMap<u16, OpenInterface> = BTreeMap::new();

    for record in inputs.records(&EntityClass::Interface) {
        let Ok(group) = u16::try_from(record.key.0) else {
            debug!(key = %record.key, "Interface key out of group range, skipping");
            continue;
        };
        let modal = ActiveInterface::deserialize(&record.payload)
            .map(|active| active.modal)
            .unwrap_or(false);
        groups.insert(
            group,
            OpenInterface {
                group,
                modal,
                roots: Vec::new(),
                widgets: Vec::new(),
            },
        );
    }

    if groups.is_empty() {
        return Vec::new();
    }

    for record in inputs.records(&EntityClass::Widget) {
        let node = match WidgetNode::deserialize(&record.payload) {
            Ok(node) => node,
            Err(e) => {
                debug!(key = %record.key, error = %e, "Widget payload does not decode, skipping");
                continue;
            }
        };
        if node.hidden {
            continue;
        }
        if let Some(open) = groups.get_mut(&node.group) {
            if node.parent.is_none() {
                open.roots.push(record.key);
            }
            open.widgets.push(record.key);
        }
    }

    groups
        .into_values()
        .filter_map(|open| match serde_json::to_value(&open) {
            Ok(value) => Some((EntityKey(open.group as u64), value)),
            Err(e) => {
                warn!(group = open.group, error = %e, "Failed to encode open interface");
                None
            }
        })
        .collect()
}
