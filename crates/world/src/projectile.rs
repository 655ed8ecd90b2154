//! Projectiles fired by players and bosses.
//!
//! The host simulates projectiles and applies their hits; clients hold a
//! mirror that every projectile snapshot overwrites.

use serde::{Deserialize, Serialize};
use starhaven_core::{ItemStack, PeerId};

use crate::chunk_manager::ChunkManager;
use crate::position::{wrap_world_position, ChunkPosition};

/// Types of projectiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileType {
    /// Player blaster bolt.
    Bolt,
    /// Heavy shot from a handheld launcher.
    Slug,
    /// Boss spit; harms players only.
    Spore,
}

impl ProjectileType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProjectileType::Bolt => "bolt",
            ProjectileType::Slug => "slug",
            ProjectileType::Spore => "spore",
        }
    }

    /// Base damage dealt on hit.
    pub fn base_damage(self) -> f32 {
        match self {
            ProjectileType::Bolt => 4.0,
            ProjectileType::Slug => 9.0,
            ProjectileType::Spore => 6.0,
        }
    }

    /// Speed in pixels per second.
    pub fn speed(self) -> f32 {
        match self {
            ProjectileType::Bolt => 320.0,
            ProjectileType::Slug => 220.0,
            ProjectileType::Spore => 140.0,
        }
    }

    /// Seconds before the projectile fizzles.
    pub fn lifetime(self) -> f32 {
        match self {
            ProjectileType::Bolt => 1.5,
            ProjectileType::Slug => 2.0,
            ProjectileType::Spore => 4.0,
        }
    }

    /// Hit radius in pixels.
    pub fn hitbox_radius(self) -> f32 {
        match self {
            ProjectileType::Bolt => 4.0,
            ProjectileType::Slug => 6.0,
            ProjectileType::Spore => 8.0,
        }
    }

    /// Whether this projectile damages creatures and bosses.
    pub fn hits_creatures(self) -> bool {
        !matches!(self, ProjectileType::Spore)
    }
}

/// A projectile instance. Positions are absolute world pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub projectile_type: ProjectileType,
    pub position: (f32, f32),
    pub velocity: (f32, f32),
    /// Seconds remaining.
    pub lifetime: f32,
    pub damage: f32,
    /// Firing player, or `None` for boss projectiles.
    pub sender: Option<PeerId>,
    pub dead: bool,
}

impl Projectile {
    /// Fire from `position` towards `direction` (need not be normalised).
    pub fn fire(
        projectile_type: ProjectileType,
        position: (f32, f32),
        direction: (f32, f32),
        sender: Option<PeerId>,
    ) -> Self {
        let length = (direction.0 * direction.0 + direction.1 * direction.1).sqrt();
        let (dx, dy) = if length > f32::EPSILON {
            (direction.0 / length, direction.1 / length)
        } else {
            (1.0, 0.0)
        };
        let speed = projectile_type.speed();
        Self {
            projectile_type,
            position,
            velocity: (dx * speed, dy * speed),
            lifetime: projectile_type.lifetime(),
            damage: projectile_type.base_damage(),
            sender,
            dead: false,
        }
    }

    /// Advance physics. Returns true if the projectile should be removed.
    pub fn update(&mut self, dt: f32, world_size: u16) -> bool {
        if self.dead {
            return true;
        }
        self.lifetime -= dt;
        if self.lifetime <= 0.0 {
            self.dead = true;
            return true;
        }
        self.position = wrap_world_position(
            (
                self.position.0 + self.velocity.0 * dt,
                self.position.1 + self.velocity.1 * dt,
            ),
            world_size,
        );
        false
    }

    pub fn hits_point(&self, point: (f32, f32), radius: f32) -> bool {
        if self.dead {
            return false;
        }
        let dx = self.position.0 - point.0;
        let dy = self.position.1 - point.1;
        let reach = self.projectile_type.hitbox_radius() + radius;
        dx * dx + dy * dy < reach * reach
    }

    /// Extrapolate a mirrored projectile forward by a latency estimate.
    pub fn compensate(&mut self, latency: f32, world_size: u16) {
        self.update(latency, world_size);
    }

    pub fn to_pod(&self) -> ProjectilePod {
        ProjectilePod {
            projectile_type: self.projectile_type,
            position: self.position,
            velocity: self.velocity,
            lifetime: self.lifetime,
            damage: self.damage,
            sender: self.sender,
        }
    }

    pub fn from_pod(pod: &ProjectilePod) -> Self {
        Self {
            projectile_type: pod.projectile_type,
            position: pod.position,
            velocity: pod.velocity,
            lifetime: pod.lifetime,
            damage: pod.damage,
            sender: pod.sender,
            dead: false,
        }
    }
}

/// Wire shape of a projectile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectilePod {
    pub projectile_type: ProjectileType,
    pub position: (f32, f32),
    pub velocity: (f32, f32),
    pub lifetime: f32,
    pub damage: f32,
    pub sender: Option<PeerId>,
}

/// A creature killed by a projectile, for drop handling.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityKill {
    pub chunk: ChunkPosition,
    pub position: (f32, f32),
    pub drops: ItemStack,
}

/// Manages projectiles on one planet.
#[derive(Debug, Clone, Default)]
pub struct ProjectileManager {
    projectiles: Vec<Projectile>,
}

impl ProjectileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, projectile: Projectile) {
        self.projectiles.push(projectile);
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn projectiles_mut(&mut self) -> &mut [Projectile] {
        &mut self.projectiles
    }

    /// Number of active projectiles.
    pub fn count(&self) -> usize {
        self.projectiles.len()
    }

    /// Update all projectiles and remove dead ones.
    pub fn update(&mut self, dt: f32, world_size: u16) {
        self.projectiles.retain_mut(|projectile| !projectile.update(dt, world_size));
    }

    /// Apply projectile hits to creatures in loaded chunks. Each projectile
    /// hits at most one creature.
    pub fn damage_entities(&mut self, chunks: &mut ChunkManager) -> Vec<EntityKill> {
        let mut kills = Vec::new();
        for chunk in chunks.loaded_chunks_mut() {
            let pos = chunk.position();
            for entity in chunk.entities_mut().iter_mut().filter(|e| e.alive) {
                for projectile in self
                    .projectiles
                    .iter_mut()
                    .filter(|p| !p.dead && p.projectile_type.hits_creatures())
                {
                    if projectile.hits_point(entity.position, ENTITY_RADIUS) {
                        projectile.dead = true;
                        if entity.damage(projectile.damage) {
                            kills.push(EntityKill {
                                chunk: pos,
                                position: entity.position,
                                drops: entity.entity_type.drops(),
                            });
                        }
                        if !entity.alive {
                            break;
                        }
                    }
                }
            }
        }
        self.projectiles.retain(|p| !p.dead);
        kills
    }

    /// Check for a hit on a point (a player or boss) and consume the
    /// projectile. Returns the damage if hit.
    pub fn check_hit(
        &mut self,
        point: (f32, f32),
        radius: f32,
        accept: impl Fn(&Projectile) -> bool,
    ) -> Option<f32> {
        let projectile = self
            .projectiles
            .iter_mut()
            .find(|p| accept(p) && p.hits_point(point, radius))?;
        projectile.dead = true;
        Some(projectile.damage)
    }

    pub fn snapshot(&self) -> Vec<ProjectilePod> {
        self.projectiles.iter().map(Projectile::to_pod).collect()
    }

    /// Overwrite the mirror with an authoritative snapshot.
    pub fn replace_from_snapshot(&mut self, pods: &[ProjectilePod], latency: f32, world_size: u16) {
        self.projectiles = pods
            .iter()
            .map(|pod| {
                let mut projectile = Projectile::from_pod(pod);
                projectile.compensate(latency, world_size);
                projectile
            })
            .filter(|p| !p.dead)
            .collect();
    }
}

/// Collision radius of a creature.
const ENTITY_RADIUS: f32 = 6.0;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::position::ChunkViewRange;
    use starhaven_core::PlanetType;

    #[test]
    fn bolt_moves_and_expires() {
        let mut bolt = Projectile::fire(ProjectileType::Bolt, (10.0, 10.0), (2.0, 0.0), Some(PeerId(1)));
        assert!(!bolt.update(0.1, 16));
        assert!((bolt.position.0 - 42.0).abs() < 1e-3);
        assert!(bolt.update(2.0, 16));
        assert!(bolt.dead);
    }

    #[test]
    fn projectiles_wrap_at_world_edge() {
        let mut bolt = Projectile::fire(ProjectileType::Bolt, (1.0, 5.0), (-1.0, 0.0), None);
        bolt.update(0.1, 4);
        assert!(bolt.position.0 > 400.0);
    }

    #[test]
    fn zero_direction_fires_right() {
        let slug = Projectile::fire(ProjectileType::Slug, (0.0, 0.0), (0.0, 0.0), None);
        assert!(slug.velocity.0 > 0.0);
        assert_eq!(slug.velocity.1, 0.0);
    }

    #[test]
    fn manager_removes_dead() {
        let mut manager = ProjectileManager::new();
        manager.spawn(Projectile::fire(ProjectileType::Bolt, (0.0, 0.0), (1.0, 0.0), None));
        manager.spawn(Projectile::fire(ProjectileType::Spore, (0.0, 0.0), (1.0, 0.0), None));
        manager.update(2.0, 16);
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.projectiles()[0].projectile_type, ProjectileType::Spore);
    }

    #[test]
    fn check_hit_consumes_projectile() {
        let mut manager = ProjectileManager::new();
        manager.spawn(Projectile::fire(ProjectileType::Spore, (50.0, 50.0), (1.0, 0.0), None));
        assert_eq!(manager.check_hit((200.0, 200.0), 8.0, |_| true), None);
        assert_eq!(manager.check_hit((52.0, 50.0), 8.0, |p| p.sender.is_none()), Some(6.0));
        assert_eq!(manager.check_hit((52.0, 50.0), 8.0, |_| true), None);
    }

    #[test]
    fn bolts_damage_entities_in_loaded_chunks() {
        let mut chunks = ChunkManager::new(5, PlanetType::VERDANT, 8);
        let mut requests = Vec::new();
        let view = ChunkViewRange {
            top_left: ChunkPosition::new(0, 0),
            width: 1,
            height: 1,
        };
        chunks.update_chunks(&[view], false, &mut requests);
        let id = chunks
            .loaded_chunks_mut()
            .next()
            .map(|chunk| {
                chunk.replace_entities(Vec::new());
                chunk.spawn_entity(EntityType::Critter, (60.0, 60.0))
            })
            .unwrap();

        let mut manager = ProjectileManager::new();
        for _ in 0..3 {
            manager.spawn(Projectile::fire(ProjectileType::Bolt, (60.0, 60.0), (1.0, 0.0), Some(PeerId(2))));
        }
        let kills = manager.damage_entities(&mut chunks);
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].drops, EntityType::Critter.drops());
        assert_eq!(manager.count(), 0);
        let chunk = chunks.loaded_chunk(ChunkPosition::new(0, 0)).unwrap();
        assert!(chunk.entities().iter().filter(|e| e.id == id).all(|e| !e.alive));
    }

    #[test]
    fn snapshot_replaces_mirror() {
        let mut host = ProjectileManager::new();
        host.spawn(Projectile::fire(ProjectileType::Bolt, (0.0, 0.0), (0.0, 1.0), None));
        let mut mirror = ProjectileManager::new();
        mirror.spawn(Projectile::fire(ProjectileType::Slug, (9.0, 9.0), (1.0, 0.0), None));
        mirror.replace_from_snapshot(&host.snapshot(), 0.1, 16);
        assert_eq!(mirror.count(), 1);
        assert!((mirror.projectiles()[0].position.1 - 32.0).abs() < 1e-3);
    }
}
