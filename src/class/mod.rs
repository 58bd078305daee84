use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Category of tracked client state.
///
/// Every class owns its own sequence space, version counter and warmup state.
/// The string form (`"container:inventory"`, `"widget"`, `"view:open_interfaces"`)
/// is what producers put on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityClass {
    /// Item container (inventory, bank, equipment), keyed by slot index
    Container(String),
    /// Widget tree node, keyed by packed widget id
    Widget,
    /// Currently open interface groups, keyed by group id
    Interface,
    /// NPCs and scene objects, keyed by entity index
    WorldEntity,
    /// Items lying on visible tiles
    GroundItem,
    /// Local player state
    Player,
    /// Right-click menu entries, keyed by entry index
    Menu,
    /// Derived composite view. Never ingested, only read.
    View(String),
}

impl EntityClass {
    pub fn container(name: impl Into<String>) -> Self {
        EntityClass::Container(name.into())
    }

    pub fn view(name: impl Into<String>) -> Self {
        EntityClass::View(name.into())
    }

    /// The player's backpack container
    pub fn inventory() -> Self {
        EntityClass::Container("inventory".to_string())
    }

    pub fn is_view(&self) -> bool {
        matches!(self, EntityClass::View(_))
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityClass::Container(name) => write!(f, "container:{}", name),
            EntityClass::Widget => write!(f, "widget"),
            EntityClass::Interface => write!(f, "interface"),
            EntityClass::WorldEntity => write!(f, "world_entity"),
            EntityClass::GroundItem => write!(f, "ground_item"),
            EntityClass::Player => write!(f, "player"),
            EntityClass::Menu => write!(f, "menu"),
            EntityClass::View(name) => write!(f, "view:{}", name),
        }
    }
}

/// Class string parse errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseClassError {
    #[error("entity class is empty")]
    Empty,
    #[error("unknown entity class '{0}'")]
    Unknown(String),
    #[error("entity class '{0}' is missing its name after ':'")]
    MissingName(String),
}

impl FromStr for EntityClass {
    type Err = ParseClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseClassError::Empty);
        }

        if let Some((prefix, name)) = s.split_once(':') {
            if name.is_empty() {
                return Err(ParseClassError::MissingName(s.to_string()));
            }
            return match prefix {
                "container" => Ok(EntityClass::Container(name.to_string())),
                "view" => Ok(EntityClass::View(name.to_string())),
                _ => Err(ParseClassError::Unknown(s.to_string())),
            };
        }

        match s {
            "widget" => Ok(EntityClass::Widget),
            "interface" => Ok(EntityClass::Interface),
            "world_entity" => Ok(EntityClass::WorldEntity),
            "ground_item" => Ok(EntityClass::GroundItem),
            "player" => Ok(EntityClass::Player),
            "menu" => Ok(EntityClass::Menu),
            _ => Err(ParseClassError::Unknown(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntityClass {
    type Error = ParseClassError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityClass> for String {
    fn from(class: EntityClass) -> Self {
        class.to_string()
    }
}

/// Stable identifier of a record within its class: slot index, widget id,
/// entity index or interface group id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(pub u64);

impl EntityKey {
    /// Packs a widget id the way the client does: group in the high half,
    /// child index in the low half.
    pub fn widget(group: u16, child: u16) -> Self {
        EntityKey(((group as u64) << 16) | child as u64)
    }

    /// Interface group of a packed widget key
    pub fn widget_group(self) -> u16 {
        ((self.0 >> 16) & 0xFFFF) as u16
    }

    pub fn widget_child(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl From<u64> for EntityKey {
    fn from(value: u64) -> Self {
        EntityKey(value)
    }
}

impl From<u32> for EntityKey {
    fn from(value: u32) -> Self {
        EntityKey(value as u64)
    }
}

impl From<usize> for EntityKey {
    fn from(value: usize) -> Self {
        EntityKey(value as u64)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
