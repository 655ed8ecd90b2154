//! Host side of the protocol: joins, chunk streaming, authoritative pickup
//! creation and the per-tick request queue.

use std::collections::BTreeMap;

use starhaven_core::{LocationState, PeerId, PlanetType, PlayerData, RoomType};
use starhaven_net::protocol::{
    ChestClosedPacket, ChunkData, ChunkDatasPacket, ChunkModifiedAlertsPacket, ChunkRequestsPacket, CreatedPickup,
    InventoryAddItemPacket, ItemPickupCollectedPacket, ItemPickupRequest, ItemPickupsCreatedPacket, JoinFailedPacket,
    JoinInfoPacket, JoinQueryPacket, JoinReplyPacket, PlanetTravelReplyPacket, PlayerDataPacket,
    PlayerDisconnectedPacket, RocketInteractionPacket, RoomTravelReplyPacket, StructureEnterReplyPacket,
    StructureEntry, MAX_CHUNK_ALERTS_PER_PACKET, MAX_LANDMARKS_PER_PACKET, MAX_NAME_LEN, MAX_PEERS_PER_PACKET,
    MAX_PICKUPS_PER_PACKET, MAX_WORLD_MAP_CHUNKS, PROTOCOL_VERSION,
};
use starhaven_net::{Packet, Transport};
use starhaven_world::{
    wrap_world_position, ChunkPosition, ItemPickup, LandmarkPod, ObjectReference, PlanetUpdate, Room, RoomPod, RoomTile,
    WorldMapSnapshot, CHUNK_SIZE_PIXELS, TILE_SIZE_PIXELS,
};
use tracing::{debug, info, instrument, warn};

use crate::error::SessionResult;
use crate::game::GameFacade;
use crate::handler::NetworkHandler;
use crate::host_queue::HostRequest;
use crate::mutation;
use crate::player::{CharacterState, NetworkPlayer};

/// Largest chunk-relative offset a pickup may be created at.
const MAX_RELATIVE_OFFSET: f32 = CHUNK_SIZE_PIXELS - 0.01;

/// World-pixel position of the centre of a room cell.
pub(crate) fn room_position(tile: RoomTile) -> (f32, f32) {
    (
        (tile.0 as f32 + 0.5) * TILE_SIZE_PIXELS,
        (tile.1 as f32 + 0.5) * TILE_SIZE_PIXELS,
    )
}

fn truncate_name(name: &str) -> String {
    let mut end = name.len().min(MAX_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let trimmed = name[..end].trim();
    if trimmed.is_empty() {
        "Pilot".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Landmarks and explored map of a planet, bounded to what a packet carries.
pub(crate) fn planet_snapshots<G: GameFacade>(game: &G, planet: PlanetType) -> (Vec<LandmarkPod>, WorldMapSnapshot) {
    match game.world().planet(planet) {
        Some(p) => {
            let mut landmarks = p.landmarks.snapshot(&p.chunks);
            landmarks.truncate(MAX_LANDMARKS_PER_PACKET);
            let mut map = p.world_map_snapshot();
            map.chunks.truncate(MAX_WORLD_MAP_CHUNKS);
            (landmarks, map)
        }
        None => (
            Vec::new(),
            WorldMapSnapshot {
                planet,
                chunks: Vec::new(),
            },
        ),
    }
}

impl<T: Transport> NetworkHandler<T> {
    /// Handle a packet only a host acts on. Returns packets that belong to
    /// the shared handler.
    #[instrument(skip_all, fields(%peer, packet = packet.packet_type().as_str()))]
    pub(crate) fn process_message_as_host<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        packet: Packet,
    ) -> Option<Packet> {
        let result = match packet {
            Packet::JoinReply(reply) => self.on_join_reply(game, peer, reply),
            Packet::PlayerData(update) => {
                let data = update.data;
                if let Some(player) = self.players.get_mut(&peer) {
                    player.apply_data(data.clone());
                }
                self.broadcast(&Packet::from(PlayerDataPacket { peer, data }), Some(peer))
            }
            Packet::PlayerCharacterInfo(info) => {
                let latency = self.latency_to(&info.ping_location);
                let world_size = game.world().world_size();
                if let Some(player) = self.players.get_mut(&peer) {
                    player.apply_character(CharacterState::from_packet(&info, latency, world_size));
                }
                Ok(())
            }
            Packet::ItemPickupsCreateRequest(request) => {
                self.create_item_pickups_as_host(game, request.location, &request.requests)
            }
            Packet::ItemPickupCollected(collected) => self.on_item_pickup_collected(game, peer, collected),
            Packet::ChunkRequests(request) => self.on_chunk_requests(game, peer, request),
            Packet::ProjectileCreateRequest(request) => {
                let mut pod = request.projectile;
                pod.sender = Some(peer);
                if let Some(planet) = request.location.planet().and_then(|p| game.world_mut().planet_mut(p)) {
                    planet.projectiles.spawn(starhaven_world::Projectile::from_pod(&pod));
                }
                Ok(())
            }
            Packet::BossSpawnRequest(request) => {
                self.host_requests.push(HostRequest::BossSpawn {
                    location: request.location,
                    boss_type: request.boss_type,
                    position: request.position,
                });
                Ok(())
            }
            Packet::PlanetTravelRequest(request) => {
                self.host_requests.push(HostRequest::PlanetTravel {
                    peer,
                    planet: request.planet,
                });
                Ok(())
            }
            Packet::RoomTravelRequest(request) => {
                self.host_requests.push(HostRequest::RoomTravel {
                    peer,
                    room: request.room,
                });
                Ok(())
            }
            Packet::StructureEnterRequest(request) => {
                self.host_requests.push(HostRequest::StructureEnter {
                    peer,
                    planet: request.planet,
                    chunk: request.chunk,
                });
                Ok(())
            }
            Packet::RocketEnterRequest(request) => {
                self.host_requests.push(HostRequest::RocketEnter {
                    peer,
                    location: request.location,
                    reference: request.reference,
                });
                Ok(())
            }
            other => return Some(other),
        };
        if let Err(err) = result {
            warn!("failed to answer packet: {err}");
        }
        None
    }

    pub(crate) fn greet_peer<G: GameFacade>(&mut self, _game: &mut G, peer: PeerId) {
        info!(%peer, "peer connected, sending join query");
        let query = Packet::from(JoinQueryPacket {
            protocol_version: PROTOCOL_VERSION,
            data_hash: self.data_hash,
        });
        if let Err(err) = self.send_packet(peer, &query) {
            warn!(%peer, "failed to send join query: {err}");
        }
    }

    #[instrument(skip_all, fields(%peer, name = %reply.name))]
    fn on_join_reply<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, reply: JoinReplyPacket) -> SessionResult<()> {
        if self.players.contains_key(&peer) {
            debug!("duplicate join reply");
            return Ok(());
        }
        if reply.protocol_version != PROTOCOL_VERSION || reply.data_hash != self.data_hash {
            warn!(
                version = reply.protocol_version,
                data_hash = reply.data_hash,
                "refusing join with mismatched game data"
            );
            let failed = Packet::from(JoinFailedPacket {
                reason: "Game data does not match the host".to_string(),
            });
            let sent = self.send_packet(peer, &failed);
            self.transport.disconnect(peer);
            return sent;
        }

        let name = truncate_name(&reply.name);
        let mut data = self
            .saved_player_data
            .remove(&peer)
            .or(reply.player_data)
            .unwrap_or_else(|| PlayerData::new(name.clone()));
        data.name = name;
        let (location, position) = self.resolve_join_location(game, &data);
        data.location = location;
        data.position = position;
        data.spawned = true;

        let local = self.local_peer();
        let mut peers: Vec<(PeerId, PlayerData)> = Vec::with_capacity(self.players.len() + 1);
        peers.push((local, game.player_data().clone()));
        peers.extend(
            self.players
                .values()
                .map(|player| (player.peer, player.data.clone())),
        );
        peers.truncate(MAX_PEERS_PER_PACKET);

        let (landmarks, world_map) = match location.planet() {
            Some(planet) => {
                let (landmarks, map) = planet_snapshots(game, planet);
                (Some(landmarks), Some(map))
            }
            None => (None, None),
        };
        let world = game.world();
        let info = Packet::from(JoinInfoPacket {
            seed: world.seed(),
            world_size: world.world_size(),
            game_time: world.game_time(),
            ping_location: self.ping_location_string(),
            player_data: data.clone(),
            peers,
            landmarks,
            world_map,
            room: world.room(&location).map(Room::to_pod),
        });
        self.send_packet(peer, &info)?;

        self.players.insert(peer, NetworkPlayer::new(peer, data.clone()));
        info!(%location, players = self.players.len(), "player joined");
        self.broadcast(&Packet::from(PlayerDataPacket { peer, data }), Some(peer))
    }

    /// Where a joining player enters: their saved location if it can be
    /// loaded, otherwise a fresh spawn on the starting planet.
    fn resolve_join_location<G: GameFacade>(&self, game: &mut G, data: &PlayerData) -> (LocationState, (f32, f32)) {
        if data.spawned {
            if game.world_mut().init_location(&data.location) {
                return (data.location, data.position);
            }
            warn!(location = %data.location, "saved location unavailable, respawning");
        }
        self.planet_arrival(game, self.config.starting_planet)
            .or_else(|| {
                warn!(planet = self.config.starting_planet.0, "unknown starting planet");
                self.planet_arrival(game, LocationState::default().planet()?)
            })
            .unwrap_or((LocationState::default(), (CHUNK_SIZE_PIXELS / 2.0, CHUNK_SIZE_PIXELS / 2.0)))
    }

    /// Answer a chunk request, generating chunks this host has never seen.
    #[instrument(skip_all, fields(%peer, count = request.chunks.len()))]
    fn on_chunk_requests<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        request: ChunkRequestsPacket,
    ) -> SessionResult<()> {
        let Some(planet_type) = request.location.planet() else {
            debug!("chunk request outside a planet");
            return Ok(());
        };
        let world_size = game.world().world_size();
        let Some(planet) = game.world_mut().planet_mut(planet_type) else {
            return Ok(());
        };
        let mut datas = Vec::with_capacity(request.chunks.len());
        for pos in request.chunks {
            if !pos.is_within(world_size) {
                warn!(chunk = %pos, "chunk request outside the world");
                continue;
            }
            datas.push(ChunkData::new(pos, planet.chunks.get_chunk_data_and_generate(pos)));
        }
        self.send_chunk_datas(peer, planet_type, datas)
    }

    pub(crate) fn send_chunk_datas(
        &mut self,
        peer: PeerId,
        planet: PlanetType,
        datas: Vec<ChunkData>,
    ) -> SessionResult<()> {
        let location = LocationState::surface(planet);
        let per_packet = self.config.chunks_per_packet();
        let mut datas = datas.into_iter();
        loop {
            let batch: Vec<ChunkData> = datas.by_ref().take(per_packet).collect();
            if batch.is_empty() {
                return Ok(());
            }
            debug!(%peer, chunks = batch.len(), "sending chunk data");
            self.send_packet(peer, &Packet::from(ChunkDatasPacket { location, chunks: batch }))?;
        }
    }

    /// Host: send the authoritative copy of one chunk to a peer whose
    /// mutation did not apply here.
    pub(crate) fn resend_chunk<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, planet: PlanetType, chunk: ChunkPosition) {
        if !chunk.is_within(game.world().world_size()) {
            warn!(%peer, %chunk, "correction requested for a chunk outside the world");
            return;
        }
        let Some(p) = game.world_mut().planet_mut(planet) else {
            return;
        };
        let data = ChunkData::new(chunk, p.chunks.get_chunk_data_and_generate(chunk));
        if let Err(err) = self.send_chunk_datas(peer, planet, vec![data]) {
            warn!(%peer, %chunk, "failed to send chunk correction: {err}");
        }
    }

    /// Create pickups authoritatively and announce them to every client.
    pub(crate) fn create_item_pickups_as_host<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        requests: &[ItemPickupRequest],
    ) -> SessionResult<()> {
        let Some(planet_type) = location.planet().filter(|_| location.is_on_planet_surface()) else {
            debug!(%location, "pickups can only be created on a planet surface");
            return Ok(());
        };
        let world_size = game.world().world_size();
        let Some(planet) = game.world_mut().planet_mut(planet_type) else {
            return Ok(());
        };
        let mut created = Vec::with_capacity(requests.len());
        for request in requests {
            let chunk = request.chunk;
            if !chunk.is_within(world_size) {
                warn!(%chunk, "pickup request outside the world");
                continue;
            }
            if !planet.chunks.is_chunk_generated(chunk) {
                planet.chunks.get_chunk_data_and_generate(chunk);
            }
            let origin = chunk.world_origin();
            let relative = (
                request.relative_position.0.clamp(0.0, MAX_RELATIVE_OFFSET),
                request.relative_position.1.clamp(0.0, MAX_RELATIVE_OFFSET),
            );
            let position = wrap_world_position((origin.0 + relative.0, origin.1 + relative.1), world_size);
            let pickup = ItemPickup::new(request.item, position);
            if let Some(id) = planet.chunks.add_item_pickup(chunk, pickup.clone()) {
                created.push(CreatedPickup {
                    chunk,
                    pickup: pickup.to_pod(id, chunk, world_size),
                });
            }
        }
        debug!(count = created.len(), "created item pickups");
        self.announce_pickups(location, created)
    }

    pub(crate) fn announce_pickups(&mut self, location: LocationState, created: Vec<CreatedPickup>) -> SessionResult<()> {
        for batch in created.chunks(MAX_PICKUPS_PER_PACKET) {
            let packet = Packet::from(ItemPickupsCreatedPacket {
                location,
                pickups: batch.to_vec(),
            });
            self.broadcast(&packet, None)?;
        }
        Ok(())
    }

    /// Pickups created by the simulation (drops, kills), as announcements.
    pub(crate) fn created_pickups<G: GameFacade>(game: &G, planet: PlanetType, ids: &[(ChunkPosition, u64)]) -> Vec<CreatedPickup> {
        let Some(p) = game.world().planet(planet) else {
            return Vec::new();
        };
        let world_size = game.world().world_size();
        ids.iter()
            .filter_map(|&(chunk, id)| {
                let pickup = p.chunks.chunk(chunk)?.item_pickup(id)?;
                Some(CreatedPickup {
                    chunk,
                    pickup: pickup.to_pod(id, chunk, world_size),
                })
            })
            .collect()
    }

    /// The collector gets the item; everyone else only learns the pickup is
    /// gone. The collector already removed its own copy.
    fn on_item_pickup_collected<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        collected: ItemPickupCollectedPacket,
    ) -> SessionResult<()> {
        let removed = collected
            .location
            .planet()
            .and_then(|planet| game.world_mut().planet_mut(planet))
            .and_then(|planet| planet.chunks.remove_item_pickup(collected.chunk, collected.id));
        let Some(pickup) = removed else {
            debug!(chunk = %collected.chunk, id = collected.id, "pickup already collected");
            return Ok(());
        };
        self.send_packet(peer, &Packet::from(InventoryAddItemPacket { item: pickup.item }))?;
        self.broadcast(&Packet::from(collected), Some(peer))
    }

    /// Announce chunks whose host copy changed in ways clients cannot
    /// replay. Only clients on that planet are told.
    pub fn send_chunk_modified_alerts<G: GameFacade>(
        &mut self,
        _game: &mut G,
        planet: PlanetType,
        chunks: &[ChunkPosition],
    ) -> SessionResult<()> {
        self.require_host("send_chunk_modified_alerts")?;
        let location = LocationState::surface(planet);
        for batch in chunks.chunks(MAX_CHUNK_ALERTS_PER_PACKET) {
            let packet = Packet::from(ChunkModifiedAlertsPacket {
                location,
                chunks: batch.to_vec(),
            });
            self.broadcast_on_planet(planet, &packet)?;
        }
        Ok(())
    }

    pub(crate) fn flush_chunk_alerts<G: GameFacade>(&mut self, game: &mut G) {
        let pending = std::mem::take(&mut self.pending_alerts);
        for (planet, chunks) in pending {
            let chunks: Vec<ChunkPosition> = chunks.into_iter().collect();
            if let Err(err) = self.send_chunk_modified_alerts(game, planet, &chunks) {
                warn!(planet = planet.as_str(), "failed to send chunk alerts: {err}");
            }
        }
    }

    /// Feed the result of a world update back into the session: grown
    /// chunks are announced as modified and simulation drops are created as
    /// pickups on every client.
    pub fn handle_world_update<G: GameFacade>(&mut self, game: &mut G, updates: &BTreeMap<PlanetType, PlanetUpdate>) {
        if !self.is_host() {
            return;
        }
        for (&planet, update) in updates {
            if !update.grown_chunks.is_empty() {
                self.pending_alerts
                    .entry(planet)
                    .or_default()
                    .extend(update.grown_chunks.iter().copied());
            }
            if !update.dropped_pickups.is_empty() {
                let created = Self::created_pickups(game, planet, &update.dropped_pickups);
                if let Err(err) = self.announce_pickups(LocationState::surface(planet), created) {
                    warn!(planet = planet.as_str(), "failed to announce drops: {err}");
                }
            }
            for boss in &update.killed_bosses {
                info!(planet = planet.as_str(), boss = boss.as_str(), "boss defeated");
            }
        }
    }

    /// Validate and apply queued requests against the current world.
    #[instrument(skip_all, fields(pending = self.host_requests.len()))]
    pub(crate) fn process_host_requests<G: GameFacade>(&mut self, game: &mut G) {
        for request in self.host_requests.drain() {
            let result = match request {
                HostRequest::PlanetTravel { peer, planet } => self.host_planet_travel(game, peer, planet),
                HostRequest::RoomTravel { peer, room } => self.host_room_travel(game, peer, room),
                HostRequest::StructureEnter { peer, planet, chunk } => {
                    self.host_structure_enter(game, peer, planet, chunk)
                }
                HostRequest::RocketEnter {
                    peer,
                    location,
                    reference,
                } => self.host_rocket_enter(game, peer, location, reference),
                HostRequest::BossSpawn {
                    location,
                    boss_type,
                    position,
                } => {
                    let spawned = location
                        .planet()
                        .and_then(|planet| game.world_mut().planet_mut(planet))
                        .is_some_and(|planet| planet.bosses.spawn(boss_type, position));
                    if spawned {
                        info!(boss = boss_type.as_str(), %location, "boss spawned");
                    } else {
                        debug!(boss = boss_type.as_str(), %location, "boss spawn refused");
                    }
                    Ok(())
                }
            };
            if let Err(err) = result {
                warn!("failed to answer queued request: {err}");
            }
        }
    }

    pub(crate) fn move_player(&mut self, peer: PeerId, location: LocationState, position: (f32, f32)) -> bool {
        match self.players.get_mut(&peer) {
            Some(player) => {
                player.apply_character(CharacterState::idle(location, position));
                true
            }
            None => false,
        }
    }

    /// Initialise a planet and pick a spawn position on it.
    pub(crate) fn planet_arrival<G: GameFacade>(&self, game: &mut G, planet: PlanetType) -> Option<(LocationState, (f32, f32))> {
        let location = LocationState::surface(planet);
        if !game.world_mut().init_location(&location) {
            return None;
        }
        let radius = self.config.spawn_water_search_radius;
        let position = game
            .world_mut()
            .planet_mut(planet)?
            .chunks
            .find_valid_spawn_chunk(radius)
            .1;
        Some((location, position))
    }

    /// Initialise a room destination. Arrivals stand on its entrance.
    pub(crate) fn room_arrival<G: GameFacade>(
        game: &mut G,
        room: RoomType,
    ) -> Option<(LocationState, (f32, f32), RoomPod)> {
        let location = LocationState::Room(room);
        if !game.world_mut().init_location(&location) {
            return None;
        }
        let room = game.world().room(&location)?;
        Some((location, room_position(room.entrance()), room.to_pod()))
    }

    fn host_planet_travel<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, planet: PlanetType) -> SessionResult<()> {
        let Some((location, position)) = self.planet_arrival(game, planet) else {
            warn!(%peer, planet = planet.0, "travel to unknown planet refused");
            return Ok(());
        };
        if !self.move_player(peer, location, position) {
            return Ok(());
        }
        let (landmarks, world_map) = planet_snapshots(game, planet);
        info!(%peer, planet = planet.as_str(), "player travelled");
        self.send_packet(
            peer,
            &Packet::from(PlanetTravelReplyPacket {
                location,
                position,
                landmarks,
                world_map,
            }),
        )
    }

    fn host_room_travel<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, room: RoomType) -> SessionResult<()> {
        let Some((location, position, pod)) = Self::room_arrival(game, room) else {
            warn!(%peer, room = room.0, "travel to unknown room refused");
            return Ok(());
        };
        if !self.move_player(peer, location, position) {
            return Ok(());
        }
        self.send_packet(
            peer,
            &Packet::from(RoomTravelReplyPacket {
                location,
                position,
                room: pod,
            }),
        )
    }

    fn host_structure_enter<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        planet: PlanetType,
        chunk: ChunkPosition,
    ) -> SessionResult<()> {
        let entered = game.world_mut().enter_structure(planet, chunk).and_then(|id| {
            let location = LocationState::structure(planet, id);
            let room = game.world().room(&location)?;
            Some((id, location, room_position(room.entrance()), room.to_pod()))
        });
        let entry = match entered {
            Some((id, location, position, room)) => {
                self.pending_alerts.entry(planet).or_default().insert(chunk);
                self.move_player(peer, location, position);
                Some(StructureEntry { structure: id, room })
            }
            None => {
                debug!(%peer, %chunk, "no structure to enter");
                None
            }
        };
        self.send_packet(
            peer,
            &Packet::from(StructureEnterReplyPacket {
                planet,
                chunk,
                entered: entry,
            }),
        )
    }

    fn host_rocket_enter<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        location: LocationState,
        reference: ObjectReference,
    ) -> SessionResult<()> {
        let Some(origin) = mutation::resolve(game.world(), &location, reference) else {
            if let Some(planet) = location.planet().filter(|_| location.is_on_planet_surface()) {
                self.resend_chunk(game, peer, planet, reference.chunk);
            }
            return Ok(());
        };
        let occupant = match mutation::object_mut(game.world_mut(), &location, origin)
            .ok()
            .and_then(|object| object.as_rocket_mut())
        {
            Some(occupant) => {
                if occupant.is_none() {
                    *occupant = Some(peer);
                }
                *occupant
            }
            None => {
                debug!(%peer, %origin, "rocket request for another object");
                return Ok(());
            }
        };
        let packet = Packet::from(RocketInteractionPacket {
            location,
            reference: origin,
            occupant,
        });
        if occupant == Some(peer) {
            info!(%peer, %origin, "player boarded rocket");
            self.broadcast(&packet, None)
        } else {
            self.send_packet(peer, &packet)
        }
    }

    /// Forget a departed peer: save its data, release what it held and tell
    /// the others.
    pub(crate) fn remove_peer<G: GameFacade>(&mut self, game: &mut G, peer: PeerId) {
        self.host_requests.forget_peer(peer);
        let Some(player) = self.players.remove(&peer) else {
            debug!(%peer, "disconnect before join completed");
            return;
        };
        info!(%peer, name = player.name(), "player left");
        self.saved_player_data.insert(peer, player.data);

        for chest_id in game.world_mut().chests.close_all_for(peer) {
            let packet = Packet::from(ChestClosedPacket { chest_id, peer });
            if let Err(err) = self.broadcast(&packet, None) {
                warn!("failed to announce chest close: {err}");
            }
        }
        for (location, reference) in Self::release_rockets(game, peer) {
            let packet = Packet::from(RocketInteractionPacket {
                location,
                reference,
                occupant: None,
            });
            if let Err(err) = self.broadcast(&packet, None) {
                warn!("failed to announce rocket release: {err}");
            }
        }
        if let Err(err) = self.broadcast(&Packet::from(PlayerDisconnectedPacket { peer }), None) {
            warn!("failed to announce disconnect: {err}");
        }
    }

    fn release_rockets<G: GameFacade>(game: &mut G, peer: PeerId) -> Vec<(LocationState, ObjectReference)> {
        let world = game.world_mut();
        let planets: Vec<PlanetType> = world.planets().map(|planet| planet.planet_type()).collect();
        let mut released = Vec::new();
        for planet_type in planets {
            let Some(planet) = world.planet_mut(planet_type) else {
                continue;
            };
            let occupied: Vec<ObjectReference> = planet
                .chunks
                .store()
                .all_positions()
                .filter_map(|pos| planet.chunks.chunk(pos))
                .flat_map(|chunk| {
                    chunk
                        .objects()
                        .filter(|(_, object)| object.rocket_occupant() == Some(Some(peer)))
                        .map(move |(tile, _)| ObjectReference::new(chunk.position(), tile))
                })
                .collect();
            for reference in occupied {
                if let Some(occupant) = planet.chunks.object_mut(reference).and_then(|o| o.as_rocket_mut()) {
                    *occupant = None;
                    released.push((LocationState::surface(planet_type), reference));
                }
            }
        }
        released
    }
}
