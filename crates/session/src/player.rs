//! Remote players as seen by the local peer.

use starhaven_core::{LocationState, PeerId, PlayerData};
use starhaven_net::protocol::PlayerCharacterInfoPacket;
use starhaven_net::{CharacterFlags, CompactTimer, CompactVec2};
use starhaven_world::wrap_world_position;

/// Fast-changing character state mirrored every server tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterState {
    pub location: LocationState,
    pub position: (f32, f32),
    /// Pixels per second.
    pub velocity: (f32, f32),
    pub animation_time: f32,
    pub flags: CharacterFlags,
}

impl CharacterState {
    /// A character standing still.
    pub fn idle(location: LocationState, position: (f32, f32)) -> Self {
        Self {
            location,
            position,
            velocity: (0.0, 0.0),
            animation_time: 0.0,
            flags: CharacterFlags::empty(),
        }
    }

    pub fn to_packet(&self, peer: PeerId, ping_location: String) -> PlayerCharacterInfoPacket {
        PlayerCharacterInfoPacket {
            peer,
            location: self.location,
            position: CompactVec2::new(self.position),
            velocity: CompactVec2::new(self.velocity),
            animation_time: CompactTimer::new(self.animation_time),
            flags: self.flags,
            ping_location,
        }
    }

    /// Read a packet and advance it by `latency` seconds so the mirror shows
    /// where the sender is now rather than when it sent.
    pub fn from_packet(packet: &PlayerCharacterInfoPacket, latency: f32, world_size: u16) -> Self {
        let mut state = Self {
            location: packet.location,
            position: packet.position.get(),
            velocity: packet.velocity.get(),
            animation_time: packet.animation_time.get(),
            flags: packet.flags,
        };
        state.compensate(latency, world_size);
        state
    }

    fn compensate(&mut self, latency: f32, world_size: u16) {
        if latency <= 0.0 {
            return;
        }
        if self.flags.contains(CharacterFlags::MOVING) {
            let moved = (
                self.position.0 + self.velocity.0 * latency,
                self.position.1 + self.velocity.1 * latency,
            );
            self.position = if self.location.is_on_planet_surface() {
                wrap_world_position(moved, world_size)
            } else {
                moved
            };
        }
        self.animation_time += latency;
    }
}

/// A connected peer other than the local one.
#[derive(Debug, Clone)]
pub struct NetworkPlayer {
    pub peer: PeerId,
    /// Last persistent state received or resolved at join.
    pub data: PlayerData,
    pub character: CharacterState,
}

impl NetworkPlayer {
    pub fn new(peer: PeerId, data: PlayerData) -> Self {
        let character = CharacterState::idle(data.location, data.position);
        Self { peer, data, character }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn location(&self) -> LocationState {
        self.character.location
    }

    /// Take a new character mirror. The persistent copy follows so that a
    /// disconnect saves where the player actually was.
    pub fn apply_character(&mut self, character: CharacterState) {
        self.character = character;
        self.data.location = character.location;
        self.data.position = character.position;
    }

    /// Replace persistent data, keeping the live character mirror.
    pub fn apply_data(&mut self, data: PlayerData) {
        if data.location != self.character.location {
            self.character = CharacterState::idle(data.location, data.position);
        }
        self.data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhaven_core::PlanetType;

    fn moving(position: (f32, f32), velocity: (f32, f32)) -> CharacterState {
        CharacterState {
            location: LocationState::surface(PlanetType::VERDANT),
            position,
            velocity,
            animation_time: 1.0,
            flags: CharacterFlags::MOVING,
        }
    }

    #[test]
    fn latency_advances_moving_characters() {
        let packet = moving((100.0, 100.0), (50.0, 0.0)).to_packet(PeerId(2), String::new());
        let state = CharacterState::from_packet(&packet, 0.2, 16);
        assert!((state.position.0 - 110.0).abs() < 0.1);
        assert!((state.position.1 - 100.0).abs() < 0.1);
        assert!((state.animation_time - 1.2).abs() < 0.01);
    }

    #[test]
    fn compensation_wraps_on_planets() {
        let world_px = 16.0 * starhaven_world::CHUNK_SIZE_PIXELS;
        let packet = moving((world_px - 1.0, 10.0), (100.0, 0.0)).to_packet(PeerId(2), String::new());
        let state = CharacterState::from_packet(&packet, 0.1, 16);
        assert!(state.position.0 < 10.0, "wrapped to {:?}", state.position);
    }

    #[test]
    fn idle_characters_only_advance_animation() {
        let mut idle = moving((40.0, 40.0), (80.0, 80.0));
        idle.flags = CharacterFlags::empty();
        let state = CharacterState::from_packet(&idle.to_packet(PeerId(3), String::new()), 0.5, 16);
        assert_eq!(state.position, (40.0, 40.0));
        assert!((state.animation_time - 1.5).abs() < 0.01);
    }

    #[test]
    fn character_updates_follow_into_player_data() {
        let mut player = NetworkPlayer::new(PeerId(4), PlayerData::new("ana"));
        player.apply_character(moving((12.0, 34.0), (0.0, 0.0)));
        assert_eq!(player.data.position, (12.0, 34.0));
        assert_eq!(player.name(), "ana");
    }
}
