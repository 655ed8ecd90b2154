//! Item pickups lying on the ground.
//!
//! Pickups belong to the chunk they were dropped in. On the wire their
//! positions are chunk-relative so that peers resolve them against their own
//! copy of the chunk origin.

use starhaven_core::ItemStack;

use crate::pod::ItemPickupPod;
use crate::position::{wrap_world_position, ChunkPosition, CHUNK_SIZE_PIXELS};

/// Pickup radius in pixels.
pub const PICKUP_RADIUS: f32 = 12.0;

/// Seconds after spawning during which a pickup cannot be collected.
pub const PICKUP_SPAWN_PROTECTION: f32 = 0.5;

/// A dropped item stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPickup {
    pub item: ItemStack,
    /// Absolute world position in pixels.
    pub position: (f32, f32),
    pub spawn_protection: f32,
}

impl ItemPickup {
    pub fn new(item: ItemStack, position: (f32, f32)) -> Self {
        Self {
            item,
            position,
            spawn_protection: PICKUP_SPAWN_PROTECTION,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.spawn_protection = (self.spawn_protection - dt).max(0.0);
    }

    /// Whether a collector at `point` is close enough, measured the short way
    /// around the wrapped world.
    pub fn can_collect(&self, point: (f32, f32), world_size: u16) -> bool {
        if self.spawn_protection > 0.0 {
            return false;
        }
        let extent = world_size.max(1) as f32 * CHUNK_SIZE_PIXELS;
        let axis = |a: f32, b: f32| {
            let d = (a - b).rem_euclid(extent);
            d.min(extent - d)
        };
        let dx = axis(self.position.0, point.0);
        let dy = axis(self.position.1, point.1);
        dx * dx + dy * dy <= PICKUP_RADIUS * PICKUP_RADIUS
    }

    /// Normalise to a chunk-relative snapshot.
    pub fn to_pod(&self, id: u64, chunk: ChunkPosition, world_size: u16) -> ItemPickupPod {
        let extent = world_size.max(1) as f32 * CHUNK_SIZE_PIXELS;
        let origin = chunk.world_origin();
        ItemPickupPod {
            id,
            item: self.item,
            relative_position: (
                (self.position.0 - origin.0).rem_euclid(extent),
                (self.position.1 - origin.1).rem_euclid(extent),
            ),
        }
    }

    /// Denormalise a snapshot against the owning chunk's origin. Restored
    /// pickups are immediately collectable.
    pub fn from_pod(pod: &ItemPickupPod, chunk: ChunkPosition, world_size: u16) -> Self {
        let origin = chunk.world_origin();
        let position = wrap_world_position(
            (
                origin.0 + pod.relative_position.0,
                origin.1 + pod.relative_position.1,
            ),
            world_size,
        );
        Self {
            item: pod.item,
            position,
            spawn_protection: 0.0,
        }
    }
}
