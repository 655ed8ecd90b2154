//! Built objects: the static object registry and the live `BuildableObject`.
//!
//! Every object kind shares one struct; kind-specific state lives in the
//! `ObjectKind` sum type so that dispatch is checked exhaustively.

use serde::{Deserialize, Serialize};
use starhaven_core::{ItemStack, ItemType, PeerId};

use crate::pod::BuildableObjectPod;

/// Object type identifier referencing the static registry.
pub type ObjectTypeId = u16;

pub const OBJECT_TREE: ObjectTypeId = 0;
pub const OBJECT_ROCK: ObjectTypeId = 1;
pub const OBJECT_BERRY_BUSH: ObjectTypeId = 2;
pub const OBJECT_CHEST: ObjectTypeId = 3;
pub const OBJECT_ROCKET: ObjectTypeId = 4;
pub const OBJECT_LANDMARK: ObjectTypeId = 5;
pub const OBJECT_MERCHANT: ObjectTypeId = 6;
pub const OBJECT_SPAWN_BEACON: ObjectTypeId = 7;
pub const OBJECT_WHEAT: ObjectTypeId = 8;
pub const OBJECT_WORKBENCH: ObjectTypeId = 9;

/// Seconds a freshly built or hit object flashes.
pub const OBJECT_FLASH_TIME: f32 = 0.3;

/// Kind discriminant stored in the registry; `ObjectKind` carries the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKindTag {
    Plain,
    Chest,
    Plant,
    Rocket,
    Npc,
    Landmark,
    SpawnPoint,
}

/// Growth parameters for plant objects.
#[derive(Debug, Clone, Copy)]
pub struct PlantGrowth {
    pub stages: u8,
    /// Seconds spent in each stage before advancing.
    pub stage_time: f32,
}

/// Static properties of an object type.
#[derive(Debug, Clone, Copy)]
pub struct ObjectData {
    pub name: &'static str,
    /// Footprint in tiles, extending right and down from the origin.
    pub size: (u8, u8),
    /// Zero means the object cannot be damaged.
    pub max_health: u16,
    pub kind: ObjectKindTag,
    pub drops: &'static [ItemStack],
    pub blocks_path: bool,
    pub growth: Option<PlantGrowth>,
    pub dialogue_id: u16,
}

const fn plain(name: &'static str, size: (u8, u8), max_health: u16, drops: &'static [ItemStack]) -> ObjectData {
    ObjectData {
        name,
        size,
        max_health,
        kind: ObjectKindTag::Plain,
        drops,
        blocks_path: true,
        growth: None,
        dialogue_id: 0,
    }
}

const OBJECT_DATA: &[ObjectData] = &[
    plain("tree", (1, 1), 5, &[ItemStack::new(ItemType::WOOD, 3)]),
    plain("rock", (1, 1), 8, &[ItemStack::new(ItemType::STONE, 2)]),
    ObjectData {
        name: "berry bush",
        size: (1, 1),
        max_health: 2,
        kind: ObjectKindTag::Plant,
        drops: &[ItemStack::new(ItemType::BERRIES, 2)],
        blocks_path: false,
        growth: Some(PlantGrowth { stages: 3, stage_time: 30.0 }),
        dialogue_id: 0,
    },
    ObjectData {
        name: "chest",
        size: (1, 1),
        max_health: 4,
        kind: ObjectKindTag::Chest,
        drops: &[ItemStack::new(ItemType::CHEST, 1)],
        blocks_path: true,
        growth: None,
        dialogue_id: 0,
    },
    ObjectData {
        name: "rocket",
        size: (2, 2),
        max_health: 20,
        kind: ObjectKindTag::Rocket,
        drops: &[ItemStack::new(ItemType::ROCKET_PARTS, 1)],
        blocks_path: true,
        growth: None,
        dialogue_id: 0,
    },
    ObjectData {
        name: "landmark",
        size: (1, 1),
        max_health: 6,
        kind: ObjectKindTag::Landmark,
        drops: &[ItemStack::new(ItemType::LANDMARK, 1)],
        blocks_path: true,
        growth: None,
        dialogue_id: 0,
    },
    ObjectData {
        name: "merchant",
        size: (1, 1),
        max_health: 0,
        kind: ObjectKindTag::Npc,
        drops: &[],
        blocks_path: true,
        growth: None,
        dialogue_id: 1,
    },
    ObjectData {
        name: "spawn beacon",
        size: (1, 1),
        max_health: 10,
        kind: ObjectKindTag::SpawnPoint,
        drops: &[ItemStack::new(ItemType::IRON_BAR, 2)],
        blocks_path: true,
        growth: None,
        dialogue_id: 0,
    },
    ObjectData {
        name: "wheat",
        size: (1, 1),
        max_health: 1,
        kind: ObjectKindTag::Plant,
        drops: &[ItemStack::new(ItemType::SEEDS, 2)],
        blocks_path: false,
        growth: Some(PlantGrowth { stages: 4, stage_time: 20.0 }),
        dialogue_id: 0,
    },
    plain("workbench", (2, 1), 6, &[ItemStack::new(ItemType::WOOD, 4)]),
];

/// Look up an object type's static data.
pub fn object_data(object_type: ObjectTypeId) -> Option<&'static ObjectData> {
    OBJECT_DATA.get(object_type as usize)
}

/// Number of registered object types, used by the data hash.
pub fn object_count() -> usize {
    OBJECT_DATA.len()
}

/// Registry names and footprints in id order, used by the data hash.
pub fn object_signatures() -> impl Iterator<Item = (&'static str, (u8, u8))> {
    OBJECT_DATA.iter().map(|data| (data.name, data.size))
}

/// Object type placed by using an item, if any.
pub fn object_for_item(item: ItemType) -> Option<ObjectTypeId> {
    match item {
        ItemType::CHEST => Some(OBJECT_CHEST),
        ItemType::LANDMARK => Some(OBJECT_LANDMARK),
        ItemType::ROCKET_PARTS => Some(OBJECT_ROCKET),
        ItemType::SEEDS => Some(OBJECT_WHEAT),
        ItemType::BERRIES => Some(OBJECT_BERRY_BUSH),
        _ => None,
    }
}

/// Kind-specific object state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectKind {
    Plain,
    /// Chest contents live in the `ChestDataPool`; the id is allocated by the
    /// host the first time anyone opens it.
    Chest { chest_id: Option<u16> },
    Plant { stage: u8, growth_timer: f32 },
    /// Runtime-only: which peer currently sits in the rocket.
    Rocket {
        #[serde(skip)]
        occupant: Option<PeerId>,
    },
    Npc { dialogue_id: u16 },
    Landmark { colour_a: [u8; 3], colour_b: [u8; 3] },
    SpawnPoint,
}

impl ObjectKind {
    fn for_data(data: &ObjectData) -> Self {
        match data.kind {
            ObjectKindTag::Plain => Self::Plain,
            ObjectKindTag::Chest => Self::Chest { chest_id: None },
            ObjectKindTag::Plant => Self::Plant {
                stage: 0,
                growth_timer: 0.0,
            },
            ObjectKindTag::Rocket => Self::Rocket { occupant: None },
            ObjectKindTag::Npc => Self::Npc {
                dialogue_id: data.dialogue_id,
            },
            ObjectKindTag::Landmark => Self::Landmark {
                colour_a: [255, 255, 255],
                colour_b: [255, 255, 255],
            },
            ObjectKindTag::SpawnPoint => Self::SpawnPoint,
        }
    }
}

/// What interacting with an object asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectInteraction {
    None,
    OpenChest { chest_id: Option<u16> },
    Talk { dialogue_id: u16 },
    EnterRocket,
    SetSpawnPoint,
    EditLandmark,
    Harvest,
}

/// A live built object occupying its origin tile.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildableObject {
    object_type: ObjectTypeId,
    health: u16,
    flash_time: f32,
    kind: ObjectKind,
}

impl BuildableObject {
    /// Construct a freshly built object of the given type.
    pub fn new(object_type: ObjectTypeId) -> Option<Self> {
        let data = object_data(object_type)?;
        Some(Self {
            object_type,
            health: data.max_health,
            flash_time: OBJECT_FLASH_TIME,
            kind: ObjectKind::for_data(data),
        })
    }

    /// Same object without the build flash, for pre-existing world state.
    pub fn settled(mut self) -> Self {
        self.flash_time = 0.0;
        self
    }

    /// Rebuild from a persisted or networked snapshot. Such objects already
    /// existed, so they do not flash.
    pub fn from_pod(pod: &BuildableObjectPod) -> Option<Self> {
        let data = object_data(pod.object_type)?;
        let kind = match ObjectKind::for_data(data) {
            ObjectKind::Chest { .. } => ObjectKind::Chest {
                chest_id: pod.chest_id,
            },
            ObjectKind::Plant { .. } => ObjectKind::Plant {
                stage: pod.plant_stage,
                growth_timer: pod.growth_timer,
            },
            ObjectKind::Landmark { colour_a, colour_b } => {
                let (colour_a, colour_b) = pod.landmark_colours.unwrap_or((colour_a, colour_b));
                ObjectKind::Landmark { colour_a, colour_b }
            }
            other => other,
        };
        Some(Self {
            object_type: pod.object_type,
            health: pod.health.min(data.max_health),
            flash_time: 0.0,
            kind,
        })
    }

    pub fn to_pod(&self) -> BuildableObjectPod {
        let mut pod = BuildableObjectPod {
            object_type: self.object_type,
            health: self.health,
            ..BuildableObjectPod::default()
        };
        match &self.kind {
            ObjectKind::Chest { chest_id } => pod.chest_id = *chest_id,
            ObjectKind::Plant { stage, growth_timer } => {
                pod.plant_stage = *stage;
                pod.growth_timer = *growth_timer;
            }
            ObjectKind::Landmark { colour_a, colour_b } => {
                pod.landmark_colours = Some((*colour_a, *colour_b));
            }
            _ => {}
        }
        pod
    }

    #[inline]
    pub fn object_type(&self) -> ObjectTypeId {
        self.object_type
    }

    /// Registry data; every live object has a registered type.
    pub fn data(&self) -> &'static ObjectData {
        &OBJECT_DATA[self.object_type as usize]
    }

    pub fn size(&self) -> (u8, u8) {
        self.data().size
    }

    pub fn health(&self) -> u16 {
        self.health
    }

    pub fn flash_time(&self) -> f32 {
        self.flash_time
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn is_invulnerable(&self) -> bool {
        self.data().max_health == 0
    }

    /// Apply damage. Returns true when the object's health reaches zero.
    pub fn damage(&mut self, amount: u16) -> bool {
        if self.is_invulnerable() || amount == 0 {
            return false;
        }
        self.flash_time = OBJECT_FLASH_TIME;
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }

    pub fn interact(&self) -> ObjectInteraction {
        match &self.kind {
            ObjectKind::Plain => ObjectInteraction::None,
            ObjectKind::Chest { chest_id } => ObjectInteraction::OpenChest {
                chest_id: *chest_id,
            },
            ObjectKind::Plant { .. } if self.is_fully_grown() => ObjectInteraction::Harvest,
            ObjectKind::Plant { .. } => ObjectInteraction::None,
            ObjectKind::Rocket { .. } => ObjectInteraction::EnterRocket,
            ObjectKind::Npc { dialogue_id } => ObjectInteraction::Talk {
                dialogue_id: *dialogue_id,
            },
            ObjectKind::Landmark { .. } => ObjectInteraction::EditLandmark,
            ObjectKind::SpawnPoint => ObjectInteraction::SetSpawnPoint,
        }
    }

    /// Advance timers. Plants only grow when `simulate_growth` is set (host or
    /// solo); returns true when the plant advanced a stage.
    pub fn update(&mut self, dt: f32, simulate_growth: bool) -> bool {
        self.flash_time = (self.flash_time - dt).max(0.0);
        let growth = self.data().growth;
        let ObjectKind::Plant {
            stage,
            growth_timer,
        } = &mut self.kind
        else {
            return false;
        };
        let Some(growth) = growth else {
            return false;
        };
        if !simulate_growth || *stage + 1 >= growth.stages {
            return false;
        }
        *growth_timer += dt;
        if *growth_timer >= growth.stage_time {
            *growth_timer -= growth.stage_time;
            *stage += 1;
            return true;
        }
        false
    }

    pub fn is_fully_grown(&self) -> bool {
        match (&self.kind, self.data().growth) {
            (ObjectKind::Plant { stage, .. }, Some(growth)) => *stage + 1 >= growth.stages,
            _ => true,
        }
    }

    /// Items dropped when destroyed. Immature plants drop nothing.
    pub fn drops(&self) -> &'static [ItemStack] {
        if self.is_fully_grown() {
            self.data().drops
        } else {
            &[]
        }
    }

    /// Advance timers by a latency estimate when mirroring remote state.
    pub fn compensate(&mut self, latency: f32) {
        if let ObjectKind::Plant { growth_timer, .. } = &mut self.kind {
            *growth_timer += latency;
        }
    }

    pub fn as_chest(&self) -> Option<Option<u16>> {
        match &self.kind {
            ObjectKind::Chest { chest_id } => Some(*chest_id),
            _ => None,
        }
    }

    pub fn as_chest_mut(&mut self) -> Option<&mut Option<u16>> {
        match &mut self.kind {
            ObjectKind::Chest { chest_id } => Some(chest_id),
            _ => None,
        }
    }

    pub fn as_plant(&self) -> Option<(u8, f32)> {
        match &self.kind {
            ObjectKind::Plant {
                stage,
                growth_timer,
            } => Some((*stage, *growth_timer)),
            _ => None,
        }
    }

    pub fn as_landmark(&self) -> Option<([u8; 3], [u8; 3])> {
        match &self.kind {
            ObjectKind::Landmark { colour_a, colour_b } => Some((*colour_a, *colour_b)),
            _ => None,
        }
    }

    pub fn as_landmark_mut(&mut self) -> Option<(&mut [u8; 3], &mut [u8; 3])> {
        match &mut self.kind {
            ObjectKind::Landmark { colour_a, colour_b } => Some((colour_a, colour_b)),
            _ => None,
        }
    }

    pub fn as_rocket_mut(&mut self) -> Option<&mut Option<PeerId>> {
        match &mut self.kind {
            ObjectKind::Rocket { occupant } => Some(occupant),
            _ => None,
        }
    }

    pub fn rocket_occupant(&self) -> Option<Option<PeerId>> {
        match &self.kind {
            ObjectKind::Rocket { occupant } => Some(*occupant),
            _ => None,
        }
    }
}
