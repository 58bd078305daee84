//! Typed payloads for the tracked client domains.
//!
//! The cache itself stores `serde_json::Value` payloads and never looks inside
//! them. These types are what callers decode snapshot records into through
//! [`crate::store::Snapshot::decode`].

use crate::class::EntityKey;
use serde::{Deserialize, Serialize};

/// One occupied container slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSlot {
    pub id: i32,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Screen rectangle: x, y, width, height
pub type Bounds = [i32; 4];

/// One node of the widget tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WidgetNode {
    /// Interface group this widget belongs to
    pub group: u16,
    /// Parent widget, `None` for a group root
    #[serde(default)]
    pub parent: Option<EntityKey>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// An open interface group
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveInterface {
    #[serde(default)]
    pub modal: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldEntityKind {
    #[default]
    Npc,
    Object,
}

/// NPC or scene object in the loaded region
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldEntity {
    pub id: i32,
    #[serde(default)]
    pub kind: WorldEntityKind,
    #[serde(default)]
    pub name: Option<String>,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub plane: u8,
}

/// Item stack lying on a tile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundItem {
    pub id: i32,
    pub quantity: u32,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub plane: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub name: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub plane: u8,
    /// -1 when idle
    #[serde(default = "idle_animation")]
    pub animation: i32,
    #[serde(default)]
    pub run_energy: u32,
}

fn idle_animation() -> i32 {
    -1
}

/// Right-click menu entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub option: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub identifier: i64,
}
