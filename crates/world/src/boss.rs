//! Planet bosses.
//!
//! At most one boss of each type is alive on a planet. Bosses are spawned by a
//! queued host request, simulated on the host, and mirrored wholesale to
//! clients.

use serde::{Deserialize, Serialize};

use crate::position::{wrap_world_position, CHUNK_SIZE_PIXELS};
use crate::projectile::{Projectile, ProjectileType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BossType {
    /// Burrowing worm of the desert planet.
    Sandworm,
    /// Giant slime that splits the ground around it.
    Colossus,
}

impl BossType {
    pub const ALL: [BossType; 2] = [BossType::Sandworm, BossType::Colossus];

    pub const fn as_str(self) -> &'static str {
        match self {
            BossType::Sandworm => "sandworm",
            BossType::Colossus => "colossus",
        }
    }

    pub fn max_health(self) -> f32 {
        match self {
            BossType::Sandworm => 400.0,
            BossType::Colossus => 650.0,
        }
    }

    pub fn speed(self) -> f32 {
        match self {
            BossType::Sandworm => 60.0,
            BossType::Colossus => 25.0,
        }
    }

    /// Seconds between attacks.
    pub fn attack_interval(self) -> f32 {
        match self {
            BossType::Sandworm => 1.2,
            BossType::Colossus => 2.5,
        }
    }

    /// Radius used for hits against the boss.
    pub fn radius(self) -> f32 {
        match self {
            BossType::Sandworm => 20.0,
            BossType::Colossus => 28.0,
        }
    }
}

/// Distance at which a boss notices a player.
const AGGRO_RANGE: f32 = CHUNK_SIZE_PIXELS * 2.0;
/// Distance at which a chasing boss starts firing.
const ATTACK_RANGE: f32 = CHUNK_SIZE_PIXELS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BossBehaviour {
    Idle,
    Chasing,
    Attacking,
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Boss {
    pub boss_type: BossType,
    pub position: (f32, f32),
    pub health: f32,
    pub behaviour: BossBehaviour,
    pub attack_timer: f32,
}

impl Boss {
    pub fn new(boss_type: BossType, position: (f32, f32)) -> Self {
        Self {
            boss_type,
            position,
            health: boss_type.max_health(),
            behaviour: BossBehaviour::Idle,
            attack_timer: boss_type.attack_interval(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.behaviour != BossBehaviour::Dead
    }

    /// Apply damage; returns true if this killed the boss.
    pub fn damage(&mut self, amount: f32) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.health -= amount;
        if self.health <= 0.0 {
            self.health = 0.0;
            self.behaviour = BossBehaviour::Dead;
            return true;
        }
        false
    }

    /// Step behaviour towards the nearest target. Returns a projectile when
    /// the boss attacks this step.
    pub fn update(&mut self, dt: f32, targets: &[(f32, f32)], world_size: u16) -> Option<Projectile> {
        if !self.is_alive() {
            return None;
        }
        self.attack_timer = (self.attack_timer - dt).max(0.0);
        let extent = world_size.max(1) as f32 * CHUNK_SIZE_PIXELS;
        let wrapped_delta = |from: f32, to: f32| {
            let d = (to - from).rem_euclid(extent);
            if d > extent / 2.0 {
                d - extent
            } else {
                d
            }
        };
        let nearest = targets
            .iter()
            .map(|t| (wrapped_delta(self.position.0, t.0), wrapped_delta(self.position.1, t.1)))
            .min_by(|a, b| (a.0.hypot(a.1)).total_cmp(&b.0.hypot(b.1)));
        let Some((dx, dy)) = nearest else {
            self.behaviour = BossBehaviour::Idle;
            return None;
        };
        let distance = dx.hypot(dy);
        if distance > AGGRO_RANGE {
            self.behaviour = BossBehaviour::Idle;
            return None;
        }
        if distance > ATTACK_RANGE {
            self.behaviour = BossBehaviour::Chasing;
            let step = self.boss_type.speed() * dt / distance;
            self.position = wrap_world_position(
                (self.position.0 + dx * step, self.position.1 + dy * step),
                world_size,
            );
            return None;
        }
        self.behaviour = BossBehaviour::Attacking;
        if self.attack_timer > 0.0 {
            return None;
        }
        self.attack_timer = self.boss_type.attack_interval();
        Some(Projectile::fire(ProjectileType::Spore, self.position, (dx, dy), None))
    }

    /// Advance a mirrored boss's timers by a latency estimate.
    pub fn compensate(&mut self, latency: f32) {
        self.attack_timer = (self.attack_timer - latency).max(0.0);
    }

    pub fn to_pod(&self) -> BossPod {
        BossPod {
            boss_type: self.boss_type,
            position: self.position,
            health: self.health,
            behaviour: self.behaviour,
            attack_timer: self.attack_timer,
        }
    }

    pub fn from_pod(pod: &BossPod) -> Self {
        Self {
            boss_type: pod.boss_type,
            position: pod.position,
            health: pod.health,
            behaviour: pod.behaviour,
            attack_timer: pod.attack_timer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossPod {
    pub boss_type: BossType,
    pub position: (f32, f32),
    pub health: f32,
    pub behaviour: BossBehaviour,
    pub attack_timer: f32,
}

/// Bosses on one planet.
#[derive(Debug, Clone, Default)]
pub struct BossManager {
    bosses: Vec<Boss>,
}

impl BossManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bosses(&self) -> &[Boss] {
        &self.bosses
    }

    pub fn is_alive(&self, boss_type: BossType) -> bool {
        self.bosses.iter().any(|b| b.boss_type == boss_type && b.is_alive())
    }

    /// Spawn a boss unless one of its type is already alive.
    pub fn spawn(&mut self, boss_type: BossType, position: (f32, f32)) -> bool {
        if self.is_alive(boss_type) {
            return false;
        }
        self.bosses.push(Boss::new(boss_type, position));
        true
    }

    /// Step every boss. Returns projectiles fired this step; dead bosses
    /// are removed.
    pub fn update(&mut self, dt: f32, targets: &[(f32, f32)], world_size: u16) -> Vec<Projectile> {
        let fired = self
            .bosses
            .iter_mut()
            .filter_map(|boss| boss.update(dt, targets, world_size))
            .collect();
        self.bosses.retain(Boss::is_alive);
        fired
    }

    /// Apply hits from player projectiles. Returns the bosses killed.
    pub fn take_projectile_hits(&mut self, projectiles: &mut crate::ProjectileManager) -> Vec<BossType> {
        let mut killed = Vec::new();
        for boss in self.bosses.iter_mut().filter(|b| b.is_alive()) {
            while let Some(damage) = projectiles.check_hit(boss.position, boss.boss_type.radius(), |p| {
                p.projectile_type.hits_creatures()
            }) {
                if boss.damage(damage) {
                    killed.push(boss.boss_type);
                    break;
                }
            }
        }
        killed
    }

    pub fn snapshot(&self) -> Vec<BossPod> {
        self.bosses.iter().map(Boss::to_pod).collect()
    }

    /// Overwrite the mirror with an authoritative snapshot.
    pub fn replace_from_snapshot(&mut self, pods: &[BossPod], latency: f32) {
        self.bosses = pods
            .iter()
            .map(|pod| {
                let mut boss = Boss::from_pod(pod);
                boss.compensate(latency);
                boss
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProjectileManager;

    #[test]
    fn one_boss_per_type() {
        let mut manager = BossManager::new();
        assert!(manager.spawn(BossType::Sandworm, (0.0, 0.0)));
        assert!(!manager.spawn(BossType::Sandworm, (50.0, 0.0)));
        assert!(manager.spawn(BossType::Colossus, (0.0, 0.0)));
        assert_eq!(manager.bosses().len(), 2);
    }

    #[test]
    fn boss_chases_then_attacks() {
        let mut boss = Boss::new(BossType::Sandworm, (0.0, 0.0));
        let target = [(200.0, 0.0)];
        assert!(boss.update(0.5, &target, 32).is_none());
        assert_eq!(boss.behaviour, BossBehaviour::Chasing);
        assert!(boss.position.0 > 0.0);

        boss.position = (150.0, 0.0);
        boss.attack_timer = 0.0;
        let shot = boss.update(0.1, &target, 32).expect("boss should fire");
        assert_eq!(boss.behaviour, BossBehaviour::Attacking);
        assert_eq!(shot.projectile_type, ProjectileType::Spore);
        assert!(shot.velocity.0 > 0.0);
        assert!(boss.update(0.1, &target, 32).is_none());
    }

    #[test]
    fn boss_chases_across_world_edge() {
        let mut boss = Boss::new(BossType::Colossus, (10.0, 10.0));
        boss.update(1.0, &[(4.0 * CHUNK_SIZE_PIXELS - 200.0, 10.0)], 4);
        assert!(boss.position.0 > 100.0, "boss should step left across the seam");
    }

    #[test]
    fn killed_boss_is_removed_and_can_respawn() {
        let mut manager = BossManager::new();
        manager.spawn(BossType::Sandworm, (100.0, 100.0));
        let mut projectiles = ProjectileManager::new();
        for _ in 0..120 {
            projectiles.spawn(Projectile::fire(ProjectileType::Slug, (100.0, 100.0), (1.0, 0.0), None));
        }
        assert_eq!(manager.take_projectile_hits(&mut projectiles), vec![BossType::Sandworm]);
        manager.update(0.1, &[], 16);
        assert!(manager.bosses().is_empty());
        assert!(manager.spawn(BossType::Sandworm, (0.0, 0.0)));
    }

    #[test]
    fn snapshot_replaces_mirror() {
        let mut host = BossManager::new();
        host.spawn(BossType::Colossus, (5.0, 5.0));
        let mut mirror = BossManager::new();
        mirror.spawn(BossType::Sandworm, (1.0, 1.0));
        mirror.replace_from_snapshot(&host.snapshot(), 0.2);
        assert_eq!(mirror.bosses().len(), 1);
        assert_eq!(mirror.bosses()[0].boss_type, BossType::Colossus);
        assert!((mirror.bosses()[0].attack_timer - 2.3).abs() < 1e-4);
    }
}
