//! Headless game: a world, a local player and a log of what the session told it.

use starhaven_core::{LocationState, PlanetType, PlayerData};
use starhaven_session::{CharacterState, GameFacade};
use starhaven_world::{World, WorldMapSnapshot};
use tracing::debug;

/// [`GameFacade`] without rendering or input.
///
/// Notifications are recorded in public fields so tests can inspect them.
pub struct HeadlessGame {
    /// The local world mirror (or the authoritative world on a host).
    pub world: World,
    /// The local player's persistent data.
    pub player: PlayerData,
    /// Chat lines as `(name, text)`.
    pub chat: Vec<(String, String)>,
    /// Notices shown to the player.
    pub notices: Vec<String>,
    /// Chest ids whose open was granted.
    pub opened_chests: Vec<u16>,
    /// World maps received on arrival.
    pub world_maps: Vec<WorldMapSnapshot>,
    /// Every move made through [`GameFacade::travel_to`].
    pub travels: Vec<(LocationState, (f32, f32))>,
}

impl HeadlessGame {
    /// A player called `name` with an empty world of the given shape.
    pub fn new(name: &str, seed: u64, world_size: u16) -> Self {
        Self {
            world: World::new(seed, world_size),
            player: PlayerData::new(name),
            chat: Vec::new(),
            notices: Vec::new(),
            opened_chests: Vec::new(),
            world_maps: Vec::new(),
            travels: Vec::new(),
        }
    }

    /// A host already standing on `planet`, spawned the way joining players
    /// are.
    pub fn host(name: &str, seed: u64, world_size: u16, planet: PlanetType, search_radius: u16) -> Self {
        let mut game = Self::new(name, seed, world_size);
        let location = LocationState::surface(planet);
        if game.world.init_location(&location) {
            if let Some(planet) = game.world.planet_mut(planet) {
                game.player.position = planet.chunks.find_valid_spawn_chunk(search_radius).1;
            }
            game.player.location = location;
            game.player.spawned = true;
        }
        game
    }
}

impl GameFacade for HeadlessGame {
    fn world(&self) -> &World {
        &self.world
    }

    fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn player_data(&self) -> &PlayerData {
        &self.player
    }

    fn player_data_mut(&mut self) -> &mut PlayerData {
        &mut self.player
    }

    fn character_state(&self) -> CharacterState {
        CharacterState::idle(self.player.location, self.player.position)
    }

    fn travel_to(&mut self, location: LocationState, position: (f32, f32)) {
        debug!(player = %self.player.name, %location, "travel");
        self.player.location = location;
        self.player.position = position;
        self.travels.push((location, position));
    }

    fn show_notice(&mut self, message: &str) {
        debug!(player = %self.player.name, message, "notice");
        self.notices.push(message.to_string());
    }

    fn chat_received(&mut self, name: &str, text: &str) {
        self.chat.push((name.to_string(), text.to_string()));
    }

    fn chest_opened(&mut self, chest_id: u16) {
        self.opened_chests.push(chest_id);
    }

    fn world_map_received(&mut self, map: WorldMapSnapshot) {
        self.world_maps.push(map);
    }
}
