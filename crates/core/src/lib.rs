#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod item;
pub mod location;
pub mod player;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use item::{Inventory, InventoryError, ItemStack, ItemType};
pub use location::{LocationState, PlanetType, RoomType, StructureId};
pub use player::{PlayerCosmetics, PlayerData};

/// Stable 64-bit identity of a peer in a session.
///
/// The transport addresses peers by this value; it survives reconnects, so it
/// also keys the host's saved player data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer:{:016x}", self.0)
    }
}

/// Helper to derive a reproducible RNG seeded by world + chunk + tick domains.
pub fn scoped_rng(world_seed: u64, chunk_hash: u64, tick: u64) -> StdRng {
    let seed = world_seed ^ chunk_hash.rotate_left(17) ^ tick.rotate_left(41);
    StdRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn scoped_rng_is_reproducible() {
        let mut a = scoped_rng(42, 7, 3);
        let mut b = scoped_rng(42, 7, 3);
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn scoped_rng_differs_per_chunk() {
        let mut a = scoped_rng(42, 7, 3);
        let mut b = scoped_rng(42, 8, 3);
        assert_ne!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn peer_id_display_is_hex() {
        assert_eq!(PeerId(255).to_string(), "peer:00000000000000ff");
    }
}
