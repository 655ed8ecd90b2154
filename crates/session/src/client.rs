//! Client side of the protocol: the join handshake, mirroring host
//! snapshots and applying the host's replies to queued requests.

use starhaven_core::{LocationState, PeerId, PlanetType};
use starhaven_net::protocol::{
    ChunkDatasPacket, JoinInfoPacket, JoinQueryPacket, JoinReplyPacket, PlanetTravelReplyPacket,
    RoomTravelReplyPacket, StructureEnterReplyPacket, MAX_NAME_LEN, PROTOCOL_VERSION,
};
use starhaven_net::{Packet, Transport};
use starhaven_world::{
    ChunkPosition, ItemPickup, LandmarkPod, ObjectReference, RoomPod, OBJECT_LANDMARK,
};
use tracing::{debug, info, instrument, warn};

use crate::game::GameFacade;
use crate::handler::{NetworkHandler, Role};
use crate::player::{CharacterState, NetworkPlayer};

impl<T: Transport> NetworkHandler<T> {
    /// Handle a packet only a client acts on. Returns packets that belong to
    /// the shared handler.
    #[instrument(skip_all, fields(%peer, packet = packet.packet_type().as_str()))]
    pub(crate) fn process_message_as_client<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        packet: Packet,
    ) -> Option<Packet> {
        let local = self.local_peer();
        match packet {
            Packet::JoinQuery(query) => self.on_join_query(game, query),
            Packet::JoinInfo(info) => self.on_join_info(game, info),
            Packet::JoinFailed(failed) => {
                warn!(reason = %failed.reason, "join refused by host");
                let notice = format!("Could not join: {}", failed.reason);
                self.leave_session(game, &notice);
            }
            Packet::PlayerData(update) => {
                if update.peer == local {
                    return None;
                }
                match self.players.get_mut(&update.peer) {
                    Some(player) => player.apply_data(update.data),
                    None => {
                        info!(peer = %update.peer, name = %update.data.name, "player joined");
                        self.players
                            .insert(update.peer, NetworkPlayer::new(update.peer, update.data));
                    }
                }
            }
            Packet::PlayerDisconnected(gone) => {
                if let Some(player) = self.players.remove(&gone.peer) {
                    info!(peer = %gone.peer, name = player.name(), "player left");
                }
                game.world_mut().chests.close_all_for(gone.peer);
            }
            Packet::PlayerCharacterInfo(info) => {
                if info.peer == local {
                    return None;
                }
                let latency = self.latency_to(&info.ping_location);
                let world_size = game.world().world_size();
                if let Some(player) = self.players.get_mut(&info.peer) {
                    player.apply_character(CharacterState::from_packet(&info, latency, world_size));
                }
            }
            Packet::ServerInfo(server) => {
                let latency = self.latency_to(&server.ping_location);
                game.world_mut().set_game_time(server.game_time + latency as f64);
            }
            Packet::ItemPickupsCreated(created) => {
                let Some(planet) = created.location.planet() else {
                    return None;
                };
                let world_size = game.world().world_size();
                let Some(p) = game.world_mut().planet_mut(planet) else {
                    return None;
                };
                for entry in created.pickups {
                    let pickup = ItemPickup::from_pod(&entry.pickup, entry.chunk, world_size);
                    if !p.chunks.insert_item_pickup(entry.chunk, entry.pickup.id, pickup) {
                        debug!(chunk = %entry.chunk, id = entry.pickup.id, "pickup for a chunk not held locally");
                    }
                }
            }
            Packet::ItemPickupCollected(collected) => {
                if let Some(p) = collected
                    .location
                    .planet()
                    .and_then(|planet| game.world_mut().planet_mut(planet))
                {
                    p.chunks.remove_item_pickup(collected.chunk, collected.id);
                }
            }
            Packet::InventoryAddItem(add) => {
                let leftover = game
                    .player_data_mut()
                    .inventory
                    .add_item(add.item.item, add.item.count);
                if leftover > 0 {
                    debug!(item = add.item.item.name(), leftover, "inventory full");
                }
                self.queue_send_player_data();
            }
            Packet::ChunkDatas(datas) => self.on_chunk_datas(game, datas),
            Packet::ChunkModifiedAlerts(alerts) => {
                let Some(planet) = alerts.location.planet() else {
                    return None;
                };
                let stale: Vec<ChunkPosition> = match game.world().planet(planet) {
                    Some(p) => alerts
                        .chunks
                        .into_iter()
                        .filter(|pos| p.chunks.is_chunk_generated(*pos))
                        .collect(),
                    None => Vec::new(),
                };
                if !stale.is_empty() && game.player_data().location.planet() == Some(planet) {
                    debug!(count = stale.len(), "re-requesting modified chunks");
                    self.rerequest(game, &stale);
                }
            }
            Packet::Entities(entities) => {
                let latency = self.latency_to(&entities.ping_location);
                if let Some(p) = entities
                    .location
                    .planet()
                    .and_then(|planet| game.world_mut().planet_mut(planet))
                {
                    p.chunks.apply_entity_snapshot(&entities.chunks, latency);
                }
            }
            Packet::Projectiles(projectiles) => {
                let latency = self.latency_to(&projectiles.ping_location);
                let world_size = game.world().world_size();
                if let Some(p) = projectiles
                    .location
                    .planet()
                    .and_then(|planet| game.world_mut().planet_mut(planet))
                {
                    p.projectiles
                        .replace_from_snapshot(&projectiles.projectiles, latency, world_size);
                }
            }
            Packet::Bosses(bosses) => {
                let latency = self.latency_to(&bosses.ping_location);
                if let Some(p) = bosses
                    .location
                    .planet()
                    .and_then(|planet| game.world_mut().planet_mut(planet))
                {
                    p.bosses.replace_from_snapshot(&bosses.bosses, latency);
                }
            }
            Packet::PlanetTravelReply(reply) => self.on_planet_travel_reply(game, reply),
            Packet::RoomTravelReply(reply) => self.on_room_travel_reply(game, reply),
            Packet::StructureEnterReply(reply) => self.on_structure_enter_reply(game, reply),
            other => return Some(other),
        }
        None
    }

    /// Force a fresh copy of chunks whose local state is known to be wrong.
    pub(crate) fn rerequest<G: GameFacade>(&mut self, game: &mut G, chunks: &[ChunkPosition]) {
        if let Err(err) = self.request_chunks_from_host(game, chunks, true) {
            debug!("chunk re-request not sent: {err}");
        }
    }

    fn on_join_query<G: GameFacade>(&mut self, game: &mut G, query: JoinQueryPacket) {
        if query.protocol_version != PROTOCOL_VERSION || query.data_hash != self.data_hash {
            warn!(
                host_version = query.protocol_version,
                host_hash = query.data_hash,
                local_hash = self.data_hash,
                "host runs different game data"
            );
            self.leave_session(game, "Game data does not match the host");
            return;
        }
        let data = game.player_data();
        let mut name = data.name.clone();
        if name.len() > MAX_NAME_LEN {
            let mut end = MAX_NAME_LEN;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        let reply = Packet::from(JoinReplyPacket {
            protocol_version: PROTOCOL_VERSION,
            data_hash: self.data_hash,
            name,
            player_data: data.spawned.then(|| data.clone()),
        });
        if let Err(err) = self.send_to_host(&reply) {
            warn!("failed to answer join query: {err}");
        }
    }

    #[instrument(skip_all, fields(seed = info.seed, world_size = info.world_size))]
    fn on_join_info<G: GameFacade>(&mut self, game: &mut G, info: JoinInfoPacket) {
        let latency = self.latency_to(&info.ping_location);
        game.world_mut()
            .reset(info.seed, info.world_size, info.game_time + latency as f64);

        let location = info.player_data.location;
        if !install_location(game, &location, info.room.as_ref()) {
            warn!(%location, "join location could not be installed");
            self.leave_session(game, "Could not load the join location");
            return;
        }
        if let (Some(planet), Some(landmarks)) = (location.planet(), info.landmarks.as_deref()) {
            apply_landmarks(game, planet, landmarks);
        }
        if let Some(map) = info.world_map {
            game.world_map_received(map);
        }

        let position = info.player_data.position;
        *game.player_data_mut() = info.player_data;
        game.travel_to(location, position);

        let local = self.local_peer();
        for (peer, data) in info.peers {
            if peer != local {
                self.players.insert(peer, NetworkPlayer::new(peer, data));
            }
        }
        if let Role::Client { host, .. } = self.role {
            self.role = Role::Client { host, joined: true };
        }
        info!(%location, players = self.players.len(), "joined session");
    }

    /// Apply chunk snapshots from the host and reindex their landmarks.
    fn on_chunk_datas<G: GameFacade>(&mut self, game: &mut G, datas: ChunkDatasPacket) {
        let Some(planet_type) = datas.location.planet() else {
            return;
        };
        for data in datas.chunks {
            self.chunk_requests.complete(data.position);
            let world = game.world_mut();
            let Some(planet) = world.planet_mut(planet_type) else {
                return;
            };
            planet.chunks.set_chunk_data(data.position, &data.pod);

            let stale: Vec<ObjectReference> = planet
                .landmarks
                .iter()
                .filter(|reference| reference.chunk == data.position)
                .collect();
            for reference in stale {
                planet.landmarks.remove(reference);
            }
            let landmarks: Vec<ObjectReference> = planet
                .chunks
                .chunk(data.position)
                .map(|chunk| {
                    chunk
                        .objects()
                        .filter(|(_, object)| object.object_type() == OBJECT_LANDMARK)
                        .map(|(tile, _)| ObjectReference::new(data.position, tile))
                        .collect()
                })
                .unwrap_or_default();
            for reference in landmarks {
                planet.landmarks.add(reference);
            }

            if let Some(id) = data.pod.structure.as_ref().and_then(|s| s.structure_id) {
                world.observe_structure_id(starhaven_core::StructureId(id));
            }
        }
    }

    fn arrive<G: GameFacade>(&mut self, game: &mut G, location: LocationState, position: (f32, f32)) {
        self.chunk_requests.clear();
        game.travel_to(location, position);
        self.queue_send_player_data();
        info!(%location, "arrived");
    }

    fn on_planet_travel_reply<G: GameFacade>(&mut self, game: &mut G, reply: PlanetTravelReplyPacket) {
        let location = reply.location;
        let Some(planet) = location.planet() else {
            return;
        };
        if !install_location(game, &location, None) {
            warn!(%location, "travel destination could not be installed");
            return;
        }
        apply_landmarks(game, planet, &reply.landmarks);
        game.world_map_received(reply.world_map);
        self.structure_return = None;
        self.arrive(game, location, reply.position);
    }

    fn on_room_travel_reply<G: GameFacade>(&mut self, game: &mut G, reply: RoomTravelReplyPacket) {
        let location = reply.location;
        if !install_location(game, &location, Some(&reply.room)) {
            warn!(%location, "room could not be installed");
            return;
        }
        self.structure_return = None;
        self.arrive(game, location, reply.position);
    }

    fn on_structure_enter_reply<G: GameFacade>(&mut self, game: &mut G, reply: StructureEnterReplyPacket) {
        self.pending_structure_enter = None;
        let Some(entry) = reply.entered else {
            debug!(chunk = %reply.chunk, "host has no structure here");
            self.rerequest(game, &[reply.chunk]);
            return;
        };
        let location = LocationState::structure(reply.planet, entry.structure);
        let world = game.world_mut();
        world.observe_structure_id(entry.structure);
        if !world.insert_room(&location, &entry.room) {
            warn!(%location, "structure interior for an unloaded planet");
            return;
        }
        if let Some(structure) = world
            .planet_mut(reply.planet)
            .and_then(|p| p.chunks.chunk_mut(reply.chunk))
            .and_then(|chunk| chunk.structure_mut())
        {
            structure.structure_id = Some(entry.structure);
        }
        let entrance = entry.room.entrance;
        let data = game.player_data();
        self.structure_return = Some((data.location, data.position));
        self.arrive(game, location, crate::host::room_position(entrance));
    }
}

/// Make `location` usable locally, installing a room sent by the host.
pub(crate) fn install_location<G: GameFacade>(game: &mut G, location: &LocationState, room: Option<&RoomPod>) -> bool {
    let world = game.world_mut();
    if let Some(surface) = location.surface_of() {
        if !world.init_location(&surface) {
            return false;
        }
    }
    if let Some(pod) = room {
        world.insert_room(location, pod);
    }
    world.init_location(location)
}

fn apply_landmarks<G: GameFacade>(game: &mut G, planet: PlanetType, landmarks: &[LandmarkPod]) {
    if let Some(p) = game.world_mut().planet_mut(planet) {
        let missing = p.landmarks.replace_from_snapshot(landmarks, &mut p.chunks);
        if !missing.is_empty() {
            debug!(count = missing.len(), "landmarks in chunks not yet received");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestSession;
    use starhaven_net::protocol::{ChunkData, ServerInfoPacket};
    use starhaven_world::TileCoord;

    #[test]
    fn join_info_adopts_the_host_world() {
        let session = TestSession::joined(1);
        let (client, game) = &session.clients[0];
        assert!(client.is_joined());
        assert_eq!(game.world().seed(), session.host_game.world().seed());
        assert_eq!(game.world().world_size(), session.host_game.world().world_size());
        assert_eq!(game.travels.last().map(|t| t.0), Some(game.player.location));
    }

    #[test]
    fn server_info_moves_the_clock_forward() {
        let mut session = TestSession::joined(1);
        let host_peer = session.host.local_peer();
        let (client, game) = session.client_mut(0);
        client.dispatch(
            game,
            host_peer,
            Packet::from(ServerInfoPacket {
                game_time: 500.0,
                ping_location: String::new(),
            }),
        );
        assert!(game.world().game_time() >= 500.0);
    }

    #[test]
    fn own_player_data_is_not_mirrored() {
        let session = TestSession::joined(2);
        let local = session.clients[0].0.local_peer();
        let other = session.clients[1].0.local_peer();
        let client = &session.clients[0].0;
        assert!(client.player(local).is_none());
        assert!(client.player(other).is_some());
    }

    #[test]
    fn chunk_data_reindexes_landmarks() {
        let mut session = TestSession::joined(1);
        let host_peer = session.host.local_peer();
        let pos = ChunkPosition::new(3, 3);
        let mut pod = {
            let (_, host_game) = session.host_mut();
            let chunks = &mut host_game.world_mut().planet_mut(PlanetType::VERDANT).unwrap().chunks;
            chunks.get_chunk_data_and_generate(pos)
        };
        pod.objects.clear();
        let mut landmark = starhaven_world::BuildableObject::new(OBJECT_LANDMARK).unwrap().to_pod();
        landmark.landmark_colours = Some(([1, 2, 3], [4, 5, 6]));
        pod.objects.push((TileCoord::new(2, 2), landmark));

        let (client, game) = session.client_mut(0);
        client.dispatch(
            game,
            host_peer,
            Packet::from(ChunkDatasPacket {
                location: LocationState::surface(PlanetType::VERDANT),
                chunks: vec![ChunkData::new(pos, pod)],
            }),
        );
        let planet = game.world().planet(PlanetType::VERDANT).unwrap();
        assert!(planet
            .landmarks
            .contains(ObjectReference::new(pos, TileCoord::new(2, 2))));
    }

    #[test]
    fn structure_entry_moves_the_player_inside() {
        let mut session = TestSession::joined(1);
        let Some(chunk) = session.find_structure_chunk(PlanetType::VERDANT) else {
            return;
        };
        let (client, game) = session.client_mut(0);
        client.request_chunks_from_host(game, &[chunk], true).unwrap();
        session.pump();
        let (client, game) = session.client_mut(0);
        assert!(client.request_structure_enter(game, chunk).unwrap());
        session.pump();

        let (client, game) = &session.clients[0];
        assert!(game.player.location.is_in_structure());
        assert!(client.pending_structure_enter.is_none());
        assert!(game.world().room(&game.player.location).is_some());
    }
}
