//! Persisted per-player snapshot.

use serde::{Deserialize, Serialize};

use crate::item::Inventory;
use crate::location::LocationState;

/// Number of inventory slots every player carries.
pub const PLAYER_INVENTORY_SIZE: usize = 32;

/// Default maximum health for a new player.
pub const PLAYER_MAX_HEALTH: f32 = 100.0;

/// Appearance data shown to other peers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerCosmetics {
    /// Body colour (RGB).
    pub body_colour: [u8; 3],
    /// Hair colour (RGB).
    pub hair_colour: [u8; 3],
    /// Hair style index.
    pub hair_style: u8,
}

impl Default for PlayerCosmetics {
    fn default() -> Self {
        Self {
            body_colour: [230, 190, 150],
            hair_colour: [80, 50, 20],
            hair_style: 0,
        }
    }
}

/// Infrequently changing player state: inventory, cosmetics and where the
/// player was last seen.
///
/// The host keeps one of these per peer identity so that a reconnecting
/// player resumes where they left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    /// Display name.
    pub name: String,
    /// Last known location.
    pub location: LocationState,
    /// Last known world position in pixels.
    pub position: (f32, f32),
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
    /// Carried items.
    pub inventory: Inventory,
    /// Appearance.
    pub cosmetics: PlayerCosmetics,
    /// Respawn point, set by interacting with a spawn-point object.
    pub spawn_point: Option<(LocationState, (f32, f32))>,
    /// False until the host has chosen a spawn position for this player.
    pub spawned: bool,
}

impl PlayerData {
    /// Fresh data for a player that has never joined before.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: LocationState::default(),
            position: (0.0, 0.0),
            health: PLAYER_MAX_HEALTH,
            max_health: PLAYER_MAX_HEALTH,
            inventory: Inventory::new(PLAYER_INVENTORY_SIZE),
            cosmetics: PlayerCosmetics::default(),
            spawn_point: None,
            spawned: false,
        }
    }
}
