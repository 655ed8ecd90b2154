//! The slice of the game the session drives.

use starhaven_core::{LocationState, PlayerData};
use starhaven_world::{World, WorldMapSnapshot};

use crate::player::CharacterState;

/// Access the network handler needs to the local game.
///
/// The handler never owns the world. It is handed the game on every call,
/// mutates the world through it and asks it to move or notify the local
/// player.
pub trait GameFacade {
    fn world(&self) -> &World;

    fn world_mut(&mut self) -> &mut World;

    /// The local player's persistent state.
    fn player_data(&self) -> &PlayerData;

    fn player_data_mut(&mut self) -> &mut PlayerData;

    /// The local character as it should be mirrored on other peers.
    fn character_state(&self) -> CharacterState;

    /// Place the local player at `position` in `location`. The location is
    /// already initialised when this is called.
    fn travel_to(&mut self, location: LocationState, position: (f32, f32));

    /// Show a transient message, e.g. a failed join.
    fn show_notice(&mut self, message: &str);

    fn chat_received(&mut self, _name: &str, _text: &str) {}

    /// The local player's chest open was granted.
    fn chest_opened(&mut self, _chest_id: u16) {}

    /// Explored-chunk map of the planet the local player arrived on.
    fn world_map_received(&mut self, _map: WorldMapSnapshot) {}
}
