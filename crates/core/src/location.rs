//! Location identifiers.
//!
//! Every chunk, entity and travel packet names the world it concerns. A peer
//! that has not initialised that world drops the packet instead of applying it
//! to whatever it currently has loaded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a planet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanetType(pub u16);

impl PlanetType {
    /// Temperate starting planet.
    pub const VERDANT: Self = Self(0);
    /// Arid sand planet.
    pub const DUNE: Self = Self(1);
    /// Frozen planet.
    pub const GLACIER: Self = Self(2);

    /// Every planet kind a session can travel to.
    pub const ALL: [Self; 3] = [Self::VERDANT, Self::DUNE, Self::GLACIER];

    /// Whether this identifier names a known planet.
    pub fn is_known(self) -> bool {
        Self::ALL.contains(&self)
    }

    /// Canonical string key used in configs/logs.
    pub const fn as_str(self) -> &'static str {
        match self.0 {
            0 => "verdant",
            1 => "dune",
            2 => "glacier",
            _ => "unknown",
        }
    }

    /// Seed salt mixed into the world seed for this planet's generators.
    pub fn seed_salt(self) -> u64 {
        (self.0 as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

/// Stable identifier for a non-planet room destination (space stations and
/// other hand-built interiors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomType(pub u16);

impl RoomType {
    /// Orbital trading station.
    pub const STATION: Self = Self(0);
    /// Deep-space outpost.
    pub const OUTPOST: Self = Self(1);

    /// Every room destination.
    pub const ALL: [Self; 2] = [Self::STATION, Self::OUTPOST];

    /// Whether this identifier names a known room destination.
    pub fn is_known(self) -> bool {
        Self::ALL.contains(&self)
    }
}

/// Identifier of a structure interior, allocated by the host the first time
/// anyone enters the structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureId(pub u32);

/// Where a player (or the data in a packet) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocationState {
    /// On a planet surface, or inside one of its structures.
    Planet {
        /// Planet kind.
        planet: PlanetType,
        /// Structure interior, if inside one.
        structure: Option<StructureId>,
    },
    /// In a room destination.
    Room(RoomType),
}

impl LocationState {
    /// On the surface of `planet`.
    pub const fn surface(planet: PlanetType) -> Self {
        Self::Planet {
            planet,
            structure: None,
        }
    }

    /// Inside `structure` on `planet`.
    pub const fn structure(planet: PlanetType, structure: StructureId) -> Self {
        Self::Planet {
            planet,
            structure: Some(structure),
        }
    }

    /// The planet this location is on or under, if any.
    pub fn planet(&self) -> Option<PlanetType> {
        match self {
            Self::Planet { planet, .. } => Some(*planet),
            Self::Room(_) => None,
        }
    }

    /// The room destination, if this is one.
    pub fn room(&self) -> Option<RoomType> {
        match self {
            Self::Room(room) => Some(*room),
            Self::Planet { .. } => None,
        }
    }

    /// True only on an open planet surface, where chunk data applies.
    pub fn is_on_planet_surface(&self) -> bool {
        matches!(
            self,
            Self::Planet {
                structure: None,
                ..
            }
        )
    }

    /// Whether this location is inside a structure interior.
    pub fn is_in_structure(&self) -> bool {
        matches!(
            self,
            Self::Planet {
                structure: Some(_),
                ..
            }
        )
    }

    /// The same planet's surface, leaving any structure.
    pub fn surface_of(&self) -> Option<Self> {
        self.planet().map(Self::surface)
    }
}

impl Default for LocationState {
    fn default() -> Self {
        Self::surface(PlanetType::VERDANT)
    }
}

impl fmt::Display for LocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planet {
                planet,
                structure: None,
            } => write!(f, "planet:{}", planet.as_str()),
            Self::Planet {
                planet,
                structure: Some(id),
            } => write!(f, "planet:{}/structure:{}", planet.as_str(), id.0),
            Self::Room(room) => write!(f, "room:{}", room.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_same_structure() {
        let surface = LocationState::surface(PlanetType::DUNE);
        let inside = LocationState::structure(PlanetType::DUNE, StructureId(3));
        assert_ne!(surface, inside);
        assert_eq!(inside.planet(), Some(PlanetType::DUNE));
        assert_eq!(inside.surface_of(), Some(surface));
    }

    #[test]
    fn rooms_never_equal_planets() {
        let room = LocationState::Room(RoomType(0));
        let planet = LocationState::surface(PlanetType(0));
        assert_ne!(room, planet);
        assert!(room.planet().is_none());
        assert!(!room.is_on_planet_surface());
    }

    #[test]
    fn display_names_location() {
        assert_eq!(
            LocationState::structure(PlanetType::VERDANT, StructureId(9)).to_string(),
            "planet:verdant/structure:9"
        );
        assert_eq!(LocationState::Room(RoomType::OUTPOST).to_string(), "room:1");
    }

    #[test]
    fn location_serialization() {
        let loc = LocationState::structure(PlanetType::GLACIER, StructureId(12));
        let json = serde_json::to_string(&loc).unwrap();
        let back: LocationState = serde_json::from_str(&json).unwrap();
        assert_eq!(loc, back);
    }
}
