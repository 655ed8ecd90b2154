//! Wandering creatures owned by chunks.
//!
//! The host simulates entities; clients mirror them wholesale from the
//! periodic entity snapshot.

use rand::Rng;
use serde::{Deserialize, Serialize};
use starhaven_core::{ItemStack, ItemType, PlanetType};

use crate::position::CHUNK_SIZE_PIXELS;

/// Seconds between spawn attempts for one chunk, in real time.
pub const ENTITY_SPAWN_COOLDOWN: f64 = 60.0;

/// Upper bound on live entities in one chunk.
pub const MAX_ENTITIES_PER_CHUNK: usize = 3;

/// Kinds of creatures that can spawn on planets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    /// Small grazing animal found on temperate planets.
    Critter,
    /// Slow blob that lives on arid planets.
    Slime,
    /// Flightless bird found on frozen planets.
    Penguin,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityType::Critter => "critter",
            EntityType::Slime => "slime",
            EntityType::Penguin => "penguin",
        }
    }

    pub fn max_health(self) -> f32 {
        match self {
            EntityType::Critter => 10.0,
            EntityType::Slime => 16.0,
            EntityType::Penguin => 12.0,
        }
    }

    /// Movement speed in pixels per second.
    pub fn speed(self) -> f32 {
        match self {
            EntityType::Critter => 24.0,
            EntityType::Slime => 10.0,
            EntityType::Penguin => 18.0,
        }
    }

    pub fn drops(self) -> ItemStack {
        match self {
            EntityType::Critter => ItemStack::new(ItemType::BERRIES, 1),
            EntityType::Slime => ItemStack::new(ItemType::SAND, 2),
            EntityType::Penguin => ItemStack::new(ItemType::SEEDS, 1),
        }
    }

    /// Native creature of a planet, if it has one.
    pub fn native_to(planet: PlanetType) -> Option<Self> {
        match planet {
            PlanetType::VERDANT => Some(EntityType::Critter),
            PlanetType::DUNE => Some(EntityType::Slime),
            PlanetType::GLACIER => Some(EntityType::Penguin),
            _ => None,
        }
    }
}

/// A live creature. Positions are absolute world pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub entity_type: EntityType,
    pub position: (f32, f32),
    pub velocity: (f32, f32),
    pub health: f32,
    pub animation_timer: f32,
    wander_timer: f32,
    pub alive: bool,
}

impl Entity {
    pub fn new(id: u32, entity_type: EntityType, position: (f32, f32)) -> Self {
        Self {
            id,
            entity_type,
            position,
            velocity: (0.0, 0.0),
            health: entity_type.max_health(),
            animation_timer: 0.0,
            wander_timer: 0.0,
            alive: true,
        }
    }

    /// Advance movement and occasionally pick a new wander direction.
    pub fn update(&mut self, dt: f32, rng: &mut impl Rng) {
        if !self.alive {
            return;
        }
        self.animation_timer += dt;
        self.wander_timer -= dt;
        if self.wander_timer <= 0.0 {
            self.wander_timer = rng.gen_range(1.5..4.0);
            if rng.gen_bool(0.3) {
                self.velocity = (0.0, 0.0);
            } else {
                let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
                let speed = self.entity_type.speed();
                self.velocity = (angle.cos() * speed, angle.sin() * speed);
            }
        }
        self.position.0 += self.velocity.0 * dt;
        self.position.1 += self.velocity.1 * dt;
    }

    /// Apply damage; returns true if this killed the entity.
    pub fn damage(&mut self, amount: f32) -> bool {
        if !self.alive {
            return false;
        }
        self.health -= amount;
        if self.health <= 0.0 {
            self.alive = false;
            return true;
        }
        false
    }

    pub fn overlaps(&self, point: (f32, f32), radius: f32) -> bool {
        let dx = self.position.0 - point.0;
        let dy = self.position.1 - point.1;
        dx * dx + dy * dy <= radius * radius
    }

    /// Extrapolate a mirrored entity forward by a latency estimate.
    pub fn compensate(&mut self, latency: f32) {
        self.position.0 += self.velocity.0 * latency;
        self.position.1 += self.velocity.1 * latency;
        self.animation_timer += latency;
    }

    pub fn to_pod(&self, chunk_origin: (f32, f32)) -> EntityPod {
        EntityPod {
            id: self.id,
            entity_type: self.entity_type,
            relative_position: (
                (self.position.0 - chunk_origin.0).clamp(0.0, CHUNK_SIZE_PIXELS),
                (self.position.1 - chunk_origin.1).clamp(0.0, CHUNK_SIZE_PIXELS),
            ),
            velocity: self.velocity,
            health: self.health,
            animation_timer: self.animation_timer,
        }
    }

    pub fn from_pod(pod: &EntityPod, chunk_origin: (f32, f32)) -> Self {
        Self {
            id: pod.id,
            entity_type: pod.entity_type,
            position: (
                chunk_origin.0 + pod.relative_position.0,
                chunk_origin.1 + pod.relative_position.1,
            ),
            velocity: pod.velocity,
            health: pod.health,
            animation_timer: pod.animation_timer,
            wander_timer: 0.0,
            alive: true,
        }
    }
}

/// Flattened entity with a chunk-relative position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPod {
    pub id: u32,
    pub entity_type: EntityType,
    pub relative_position: (f32, f32),
    pub velocity: (f32, f32),
    pub health: f32,
    pub animation_timer: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn damage_kills_once() {
        let mut entity = Entity::new(1, EntityType::Critter, (0.0, 0.0));
        assert!(!entity.damage(4.0));
        assert!(entity.damage(10.0));
        assert!(!entity.damage(10.0));
        assert!(!entity.alive);
    }

    #[test]
    fn wandering_is_deterministic() {
        let mut a = Entity::new(1, EntityType::Slime, (64.0, 64.0));
        let mut b = a.clone();
        let mut rng_a = StdRng::seed_from_u64(5);
        let mut rng_b = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            a.update(0.1, &mut rng_a);
            b.update(0.1, &mut rng_b);
        }
        assert_eq!(a.position, b.position);
    }

    #[test]
    fn compensation_extrapolates_along_velocity() {
        let mut entity = Entity::new(1, EntityType::Critter, (10.0, 10.0));
        entity.velocity = (20.0, -10.0);
        entity.compensate(0.5);
        assert_eq!(entity.position, (20.0, 5.0));
        assert_eq!(entity.animation_timer, 0.5);
    }

    #[test]
    fn pod_positions_are_chunk_relative() {
        let entity = Entity::new(3, EntityType::Penguin, (300.0, 140.0));
        let pod = entity.to_pod((256.0, 128.0));
        assert_eq!(pod.relative_position, (44.0, 12.0));
        let back = Entity::from_pod(&pod, (256.0, 128.0));
        assert_eq!(back.position, entity.position);
    }
}
