//! Packets both roles apply, the local operations the game calls, and the
//! per-tick outbound traffic.
//!
//! A mutation received by the host is validated by applying it; on success
//! it is rebroadcast to every client except the sender, on failure the
//! sender gets the authoritative chunk back. A client applies what the host
//! relays and re-requests any chunk the mutation does not fit.

use starhaven_core::{LocationState, PeerId, PlanetType, RoomType};
use starhaven_net::protocol::{
    BossSpawnRequestPacket, BossesPacket, ChatMessagePacket, ChestClosedPacket, ChestDataModifiedPacket,
    ChestOpenedPacket, EntitiesPacket, InventoryAddItemPacket, ItemPickupCollectedPacket, ItemPickupRequest,
    ItemPickupsCreateRequestPacket, LandPlacedPacket, LandmarkModifiedPacket, ObjectBuiltPacket,
    ObjectDestroyedPacket, ObjectHitPacket, PlanetTravelRequestPacket, PlayerDataPacket,
    ProjectileCreateRequestPacket, ProjectilesPacket, RocketEnterRequestPacket, RocketInteractionPacket,
    RoomTravelRequestPacket, ServerInfoPacket, StructureEnterRequestPacket, MAX_BOSSES_PER_PACKET, MAX_CHAT_LEN,
    MAX_ENTITIES_PER_CHUNK, MAX_ENTITY_CHUNKS_PER_PACKET, MAX_PICKUPS_PER_PACKET, MAX_PROJECTILES_PER_PACKET,
};
use starhaven_net::{Packet, Transport};
use starhaven_world::{
    BossType, ChestPod, ChunkPosition, ChunkViewRange, LandmarkPod, ObjectHit, ObjectReference, ObjectTypeId,
    Projectile, ProjectilePod, TileCoord, TileId,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::cadence::ServerTick;
use crate::error::{SessionError, SessionResult};
use crate::game::GameFacade;
use crate::handler::{NetworkHandler, Role};
use crate::host::room_position;
use crate::host_queue::HostRequest;
use crate::mutation::{self, Rejection};

fn truncate_chat(text: &str) -> String {
    let mut end = text.len().min(MAX_CHAT_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

impl<T: Transport> NetworkHandler<T> {
    /// Handle a packet meaningful to both roles.
    pub(crate) fn process_shared_message<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, packet: Packet) {
        let packet_type = packet.packet_type();
        let result = match packet {
            Packet::ChatMessage(chat) => self.on_chat(game, peer, chat),
            Packet::ObjectBuilt(built) => self.on_object_built(game, peer, built),
            Packet::ObjectHit(hit) => self.on_object_hit(game, peer, hit),
            Packet::ObjectDestroyed(destroyed) => self.on_object_destroyed(game, peer, destroyed),
            Packet::LandPlaced(placed) => self.on_land_placed(game, peer, placed),
            Packet::ChestOpened(opened) => self.on_chest_opened(game, peer, opened),
            Packet::ChestClosed(closed) => {
                let closer = if self.is_host() { peer } else { closed.peer };
                game.world_mut().chests.close(closed.chest_id, closer);
                self.relay(
                    &Packet::from(ChestClosedPacket {
                        chest_id: closed.chest_id,
                        peer: closer,
                    }),
                    peer,
                )
            }
            Packet::ChestDataModified(modified) => {
                game.world_mut().chests.apply_pod(&modified.chest);
                self.relay(&Packet::from(modified), peer)
            }
            Packet::LandmarkModified(modified) => self.on_landmark_modified(game, peer, modified),
            Packet::RocketInteraction(interaction) => self.on_rocket_interaction(game, peer, interaction),
            other => {
                debug!(%peer, packet = other.packet_type().as_str(), role = %self.role, "packet not valid for this role");
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(%peer, packet = packet_type.as_str(), "failed to handle packet: {err}");
        }
    }

    /// Host: pass an applied client mutation on to the other clients.
    fn relay(&mut self, packet: &Packet, sender: PeerId) -> SessionResult<()> {
        if self.is_host() {
            self.broadcast(packet, Some(sender))
        } else {
            Ok(())
        }
    }

    /// React to a mutation that did not fit the local world. The host sends
    /// its copy of the chunk to the sender; a client asks for a fresh one.
    fn reject<G: GameFacade>(&mut self, game: &mut G, peer: Option<PeerId>, location: LocationState, rejection: Rejection) {
        let Rejection::Stale(chunk) = rejection else {
            debug!(%location, "mutation can never apply here");
            return;
        };
        let Some(planet) = location.planet().filter(|_| location.is_on_planet_surface()) else {
            return;
        };
        if !chunk.is_within(game.world().world_size()) {
            warn!(%location, %chunk, "mutation names a chunk outside the world");
            return;
        }
        trace!(%chunk, "stale chunk");
        match (self.role, peer) {
            (Role::Host, Some(peer)) => self.resend_chunk(game, peer, planet, chunk),
            (Role::Client { .. }, _) => self.rerequest(game, &[chunk]),
            _ => {}
        }
    }

    /// Operations that change the shared world are refused to a client
    /// whose join has not completed.
    fn check_can_mutate(&self, operation: &'static str) -> SessionResult<()> {
        match self.role {
            Role::Client { joined: false, .. } => {
                debug!(operation, "not joined yet");
                Err(SessionError::NotConnected)
            }
            _ => Ok(()),
        }
    }

    fn on_chat<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, mut chat: ChatMessagePacket) -> SessionResult<()> {
        if self.is_host() {
            chat.sender = peer;
            if let Some(player) = self.players.get(&peer) {
                chat.name = player.name().to_string();
            }
        }
        game.chat_received(&chat.name, &chat.text);
        self.relay(&Packet::from(chat), peer)
    }

    fn on_object_built<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, built: ObjectBuiltPacket) -> SessionResult<()> {
        match mutation::build_object(game.world_mut(), &built.location, built.reference, built.object_type) {
            Ok(_) => self.relay(&Packet::from(built), peer),
            Err(rejection) => {
                debug!(%peer, reference = %built.reference, "build did not apply");
                self.reject(game, Some(peer), built.location, rejection);
                Ok(())
            }
        }
    }

    fn on_object_hit<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, hit: ObjectHitPacket) -> SessionResult<()> {
        match mutation::hit_object(game.world_mut(), &hit.location, hit.reference, hit.damage) {
            Ok(result) if self.is_host() => {
                if result.destroyed {
                    self.destroy_as_host(game, Some(peer), hit.location, result.origin)
                } else {
                    self.broadcast(&Packet::from(hit), Some(peer))
                }
            }
            Ok(_) => Ok(()),
            Err(rejection) => {
                self.reject(game, Some(peer), hit.location, rejection);
                Ok(())
            }
        }
    }

    fn on_object_destroyed<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        destroyed: ObjectDestroyedPacket,
    ) -> SessionResult<()> {
        if self.is_host() {
            return self.destroy_as_host(game, Some(peer), destroyed.location, destroyed.reference);
        }
        match mutation::destroy_object(game.world_mut(), &destroyed.location, destroyed.reference) {
            Ok((_, object)) => {
                if let Some(Some(chest_id)) = object.as_chest() {
                    game.world_mut().chests.remove(chest_id);
                }
            }
            Err(rejection) => self.reject(game, Some(peer), destroyed.location, rejection),
        }
        Ok(())
    }

    /// Destroy an object authoritatively: drop its items (and a chest's
    /// contents) and tell every client, the requester included.
    fn destroy_as_host<G: GameFacade>(
        &mut self,
        game: &mut G,
        requester: Option<PeerId>,
        location: LocationState,
        reference: ObjectReference,
    ) -> SessionResult<()> {
        let (origin, object) = match mutation::destroy_object(game.world_mut(), &location, reference) {
            Ok(destroyed) => destroyed,
            Err(rejection) => {
                self.reject(game, requester, location, rejection);
                return Ok(());
            }
        };
        let mut items = object.drops().to_vec();
        if let Some(Some(chest_id)) = object.as_chest() {
            items.extend(game.world_mut().chests.remove(chest_id));
        }
        debug!(%location, %origin, drops = items.len(), "object destroyed");
        self.broadcast(&Packet::from(ObjectDestroyedPacket { location, reference: origin }), None)?;
        if items.is_empty() {
            return Ok(());
        }

        match location.planet().filter(|_| location.is_on_planet_surface()) {
            Some(planet) => {
                let dropped = game
                    .world_mut()
                    .planet_mut(planet)
                    .map(|p| p.chunks.drop_items(origin, &items))
                    .unwrap_or_default();
                let created = Self::created_pickups(game, planet, &dropped);
                self.announce_pickups(location, created)
            }
            // Interiors have no pickups; the destroyer gets the items directly.
            None => match requester {
                Some(peer) => {
                    for item in items {
                        self.send_packet(peer, &Packet::from(InventoryAddItemPacket { item }))?;
                    }
                    Ok(())
                }
                None => {
                    let inventory = &mut game.player_data_mut().inventory;
                    for item in items {
                        inventory.add_item(item.item, item.count);
                    }
                    self.queue_send_player_data();
                    Ok(())
                }
            },
        }
    }

    fn on_land_placed<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, placed: LandPlacedPacket) -> SessionResult<()> {
        match mutation::place_land(game.world_mut(), &placed.location, placed.chunk, placed.tile, placed.land) {
            Ok(()) => self.relay(&Packet::from(placed), peer),
            Err(rejection) => {
                self.reject(game, Some(peer), placed.location, rejection);
                Ok(())
            }
        }
    }

    fn on_chest_opened<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, opened: ChestOpenedPacket) -> SessionResult<()> {
        let location = opened.location;
        if self.is_host() {
            return self.open_chest_as_host(game, Some(peer), location, opened.reference);
        }
        let Some(chest_id) = opened.chest_id else {
            return Ok(());
        };
        match mutation::object_mut(game.world_mut(), &location, opened.reference) {
            Ok(object) => {
                if let Some(slot) = object.as_chest_mut() {
                    *slot = Some(chest_id);
                }
            }
            Err(rejection) => self.reject(game, None, location, rejection),
        }
        game.world_mut().chests.open(chest_id, opened.peer);
        if opened.peer == self.local_peer() {
            game.chest_opened(chest_id);
        }
        Ok(())
    }

    /// Allocate the chest's id on first open, record the opener and send the
    /// opener the contents. `opener` is `None` for the local player.
    fn open_chest_as_host<G: GameFacade>(
        &mut self,
        game: &mut G,
        opener: Option<PeerId>,
        location: LocationState,
        reference: ObjectReference,
    ) -> SessionResult<()> {
        let origin = mutation::resolve(game.world(), &location, reference);
        let existing = match mutation::object_mut(game.world_mut(), &location, reference) {
            Ok(object) => object.as_chest(),
            Err(rejection) => {
                self.reject(game, opener, location, rejection);
                return Ok(());
            }
        };
        let world = game.world_mut();
        let chest_id = match existing {
            None => {
                debug!(%reference, "open request for a non-chest object");
                return Ok(());
            }
            Some(Some(id)) => id,
            Some(None) => {
                let Some(id) = world.chests.allocate() else {
                    warn!("chest id space exhausted");
                    return Ok(());
                };
                if let Ok(Some(slot)) = mutation::object_mut(world, &location, reference).map(|o| o.as_chest_mut()) {
                    *slot = Some(id);
                }
                id
            }
        };
        let peer = opener.unwrap_or_else(|| self.local_peer());
        world.chests.open(chest_id, peer);
        let contents = world.chests.to_pod(chest_id);

        self.broadcast(
            &Packet::from(ChestOpenedPacket {
                location,
                reference: origin.unwrap_or(reference),
                chest_id: Some(chest_id),
                peer,
            }),
            None,
        )?;
        match opener {
            Some(peer) => {
                if let Some(chest) = contents {
                    self.send_packet(peer, &Packet::from(ChestDataModifiedPacket { chest }))?;
                }
            }
            None => game.chest_opened(chest_id),
        }
        Ok(())
    }

    fn on_landmark_modified<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        modified: LandmarkModifiedPacket,
    ) -> SessionResult<()> {
        let applied = modified
            .location
            .planet()
            .and_then(|planet| game.world_mut().planet_mut(planet))
            .map(|p| p.landmarks.apply_edit(&modified.landmark, &mut p.chunks));
        match applied {
            Some(Ok(())) => self.relay(&Packet::from(modified), peer),
            Some(Err(chunk)) => {
                self.reject(game, Some(peer), modified.location, Rejection::Stale(chunk));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn on_rocket_interaction<G: GameFacade>(
        &mut self,
        game: &mut G,
        peer: PeerId,
        interaction: RocketInteractionPacket,
    ) -> SessionResult<()> {
        let location = interaction.location;
        let is_host = self.is_host();
        let current = match mutation::object_mut(game.world_mut(), &location, interaction.reference) {
            Ok(object) => match object.as_rocket_mut() {
                Some(occupant) => {
                    // A client may only board a free rocket or leave its own.
                    let free_or_own = occupant.is_none() || *occupant == Some(peer);
                    let allowed = !is_host
                        || free_or_own && interaction.occupant.map_or(true, |requested| requested == peer);
                    if allowed {
                        *occupant = interaction.occupant;
                    }
                    *occupant
                }
                None => return Ok(()),
            },
            Err(rejection) => {
                self.reject(game, Some(peer), location, rejection);
                return Ok(());
            }
        };
        if !is_host {
            return Ok(());
        }
        let packet = Packet::from(RocketInteractionPacket {
            location,
            reference: interaction.reference,
            occupant: current,
        });
        if current == interaction.occupant {
            self.broadcast(&packet, Some(peer))
        } else {
            debug!(%peer, reference = %interaction.reference, "rocket change refused");
            self.send_packet(peer, &packet)
        }
    }

    /// Build an object at `reference`. Clients apply it at once and the host
    /// corrects them if it disagrees. Returns whether it applied locally.
    #[instrument(skip_all, fields(%location, %reference, object_type))]
    pub fn build_object<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        reference: ObjectReference,
        object_type: ObjectTypeId,
    ) -> SessionResult<bool> {
        self.check_can_mutate("build_object")?;
        if let Err(rejection) = mutation::build_object(game.world_mut(), &location, reference, object_type) {
            debug!(?rejection, "build refused locally");
            return Ok(false);
        }
        self.route(&Packet::from(ObjectBuiltPacket {
            location,
            reference,
            object_type,
        }))?;
        Ok(true)
    }

    /// Damage an object. On an authoritative peer a destroying hit removes
    /// it; a client waits for the host's `ObjectDestroyed`.
    pub fn hit_object<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        reference: ObjectReference,
        damage: u16,
    ) -> SessionResult<Option<ObjectHit>> {
        self.check_can_mutate("hit_object")?;
        let hit = match mutation::hit_object(game.world_mut(), &location, reference, damage) {
            Ok(hit) => hit,
            Err(rejection) => {
                self.reject(game, None, location, rejection);
                return Ok(None);
            }
        };
        if self.is_authoritative() && hit.destroyed {
            self.destroy_as_host(game, None, location, hit.origin)?;
        } else {
            self.route(&Packet::from(ObjectHitPacket {
                location,
                reference: hit.origin,
                damage,
            }))?;
        }
        Ok(Some(hit))
    }

    /// Destroy an object. A client only asks; the host's broadcast removes
    /// it everywhere.
    pub fn destroy_object<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        reference: ObjectReference,
    ) -> SessionResult<()> {
        self.check_can_mutate("destroy_object")?;
        if self.is_client() {
            return self.send_to_host(&Packet::from(ObjectDestroyedPacket { location, reference }));
        }
        self.destroy_as_host(game, None, location, reference)
    }

    pub fn place_land<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        chunk: ChunkPosition,
        tile: TileCoord,
        land: TileId,
    ) -> SessionResult<bool> {
        self.check_can_mutate("place_land")?;
        if let Err(rejection) = mutation::place_land(game.world_mut(), &location, chunk, tile, land) {
            self.reject(game, None, location, rejection);
            return Ok(false);
        }
        self.route(&Packet::from(LandPlacedPacket {
            location,
            chunk,
            tile,
            land,
        }))?;
        Ok(true)
    }

    pub fn send_chat<G: GameFacade>(&mut self, game: &mut G, text: &str) -> SessionResult<()> {
        self.check_can_mutate("send_chat")?;
        let text = truncate_chat(text);
        let name = game.player_data().name.clone();
        game.chat_received(&name, &text);
        self.route(&Packet::from(ChatMessagePacket {
            sender: self.local_peer(),
            name,
            text,
        }))
    }

    /// Open a chest. A client is told the chest id and contents by the host;
    /// the game hears about it through [`GameFacade::chest_opened`].
    pub fn open_chest<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        reference: ObjectReference,
    ) -> SessionResult<()> {
        self.check_can_mutate("open_chest")?;
        if !self.is_client() {
            return self.open_chest_as_host(game, None, location, reference);
        }
        let chest_id = match mutation::object(game.world(), &location, reference) {
            Some(object) => match object.as_chest() {
                Some(chest_id) => chest_id,
                None => return Ok(()),
            },
            None => {
                self.reject(game, None, location, Rejection::Stale(reference.chunk));
                return Ok(());
            }
        };
        self.send_to_host(&Packet::from(ChestOpenedPacket {
            location,
            reference,
            chest_id,
            peer: self.local_peer(),
        }))
    }

    pub fn close_chest<G: GameFacade>(&mut self, game: &mut G, chest_id: u16) -> SessionResult<()> {
        self.check_can_mutate("close_chest")?;
        let peer = self.local_peer();
        game.world_mut().chests.close(chest_id, peer);
        self.route(&Packet::from(ChestClosedPacket { chest_id, peer }))
    }

    /// Replace a chest's contents after a local edit.
    pub fn update_chest<G: GameFacade>(&mut self, game: &mut G, chest: ChestPod) -> SessionResult<()> {
        self.check_can_mutate("update_chest")?;
        game.world_mut().chests.apply_pod(&chest);
        self.route(&Packet::from(ChestDataModifiedPacket { chest }))
    }

    pub fn edit_landmark<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        landmark: LandmarkPod,
    ) -> SessionResult<bool> {
        self.check_can_mutate("edit_landmark")?;
        let applied = location
            .planet()
            .and_then(|planet| game.world_mut().planet_mut(planet))
            .map(|p| p.landmarks.apply_edit(&landmark, &mut p.chunks));
        match applied {
            Some(Ok(())) => {
                self.route(&Packet::from(LandmarkModifiedPacket { location, landmark }))?;
                Ok(true)
            }
            Some(Err(chunk)) => {
                self.reject(game, None, location, Rejection::Stale(chunk));
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Create item pickups. Only the host creates them; a client sends the
    /// request and mirrors the result.
    pub fn create_item_pickups<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        requests: Vec<ItemPickupRequest>,
    ) -> SessionResult<()> {
        self.check_can_mutate("create_item_pickups")?;
        let requests: Vec<ItemPickupRequest> = requests.into_iter().filter(|r| r.item.count > 0).collect();
        if !self.is_client() {
            return self.create_item_pickups_as_host(game, location, &requests);
        }
        for batch in requests.chunks(MAX_PICKUPS_PER_PACKET) {
            self.send_to_host(&Packet::from(ItemPickupsCreateRequestPacket {
                location,
                requests: batch.to_vec(),
            }))?;
        }
        Ok(())
    }

    /// Collect a pickup the local player touched. A client removes it at
    /// once and is credited by the host's `InventoryAddItem`. Returns
    /// whether the pickup existed locally.
    pub fn collect_item_pickup<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        chunk: ChunkPosition,
        id: u64,
    ) -> SessionResult<bool> {
        self.check_can_mutate("collect_item_pickup")?;
        let removed = location
            .planet()
            .and_then(|planet| game.world_mut().planet_mut(planet))
            .and_then(|p| p.chunks.remove_item_pickup(chunk, id));
        let Some(pickup) = removed else {
            return Ok(false);
        };
        if !self.is_client() {
            let leftover = game
                .player_data_mut()
                .inventory
                .add_item(pickup.item.item, pickup.item.count);
            if leftover > 0 {
                debug!(leftover, "inventory full");
            }
            self.queue_send_player_data();
        }
        self.route(&Packet::from(ItemPickupCollectedPacket { location, chunk, id }))?;
        Ok(true)
    }

    pub fn spawn_projectile<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        mut projectile: ProjectilePod,
    ) -> SessionResult<()> {
        self.check_can_mutate("spawn_projectile")?;
        projectile.sender = Some(self.local_peer());
        if self.is_client() {
            return self.send_to_host(&Packet::from(ProjectileCreateRequestPacket { location, projectile }));
        }
        if let Some(p) = location.planet().and_then(|planet| game.world_mut().planet_mut(planet)) {
            p.projectiles.spawn(Projectile::from_pod(&projectile));
        }
        Ok(())
    }

    pub fn request_boss_spawn<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        boss_type: BossType,
        position: (f32, f32),
    ) -> SessionResult<()> {
        self.check_can_mutate("request_boss_spawn")?;
        match self.role {
            Role::Client { .. } => self.send_to_host(&Packet::from(BossSpawnRequestPacket {
                location,
                boss_type,
                position,
            })),
            Role::Host => {
                self.host_requests.push(HostRequest::BossSpawn {
                    location,
                    boss_type,
                    position,
                });
                Ok(())
            }
            Role::Solo => {
                if let Some(p) = location.planet().and_then(|planet| game.world_mut().planet_mut(planet)) {
                    p.bosses.spawn(boss_type, position);
                }
                Ok(())
            }
        }
    }

    /// Travel to a planet. Authoritative peers move at once.
    pub fn request_planet_travel<G: GameFacade>(&mut self, game: &mut G, planet: PlanetType) -> SessionResult<()> {
        self.check_can_mutate("request_planet_travel")?;
        if self.is_client() {
            return self.send_to_host(&Packet::from(PlanetTravelRequestPacket { planet }));
        }
        let Some((location, position)) = self.planet_arrival(game, planet) else {
            debug!(planet = planet.0, "unknown planet");
            return Ok(());
        };
        self.structure_return = None;
        game.travel_to(location, position);
        self.queue_send_player_data();
        info!(%location, "travelled");
        Ok(())
    }

    pub fn request_room_travel<G: GameFacade>(&mut self, game: &mut G, room: RoomType) -> SessionResult<()> {
        self.check_can_mutate("request_room_travel")?;
        if self.is_client() {
            return self.send_to_host(&Packet::from(RoomTravelRequestPacket { room }));
        }
        let Some((location, position, _)) = Self::room_arrival(game, room) else {
            debug!(room = room.0, "unknown room");
            return Ok(());
        };
        self.structure_return = None;
        game.travel_to(location, position);
        self.queue_send_player_data();
        Ok(())
    }

    /// Enter the structure in `chunk` of the local player's planet. A client
    /// waits for the host; repeated requests are refused until the reply
    /// arrives or the cooldown lapses. Returns whether anything was started.
    pub fn request_structure_enter<G: GameFacade>(&mut self, game: &mut G, chunk: ChunkPosition) -> SessionResult<bool> {
        self.check_can_mutate("request_structure_enter")?;
        let current = game.player_data().location;
        let Some(planet) = current.planet().filter(|_| current.is_on_planet_surface()) else {
            return Ok(false);
        };
        let has_structure = game
            .world()
            .planet(planet)
            .and_then(|p| p.chunks.chunk(chunk))
            .is_some_and(|c| c.structure().is_some());

        if self.is_client() {
            if self.pending_structure_enter.is_some() {
                trace!(%chunk, "structure entry already pending");
                return Ok(false);
            }
            if !has_structure {
                self.rerequest(game, &[chunk]);
                return Ok(false);
            }
            self.send_to_host(&Packet::from(StructureEnterRequestPacket { planet, chunk }))?;
            self.pending_structure_enter = Some((chunk, self.config.structure_enter_cooldown));
            return Ok(true);
        }

        if !has_structure {
            return Ok(false);
        }
        let Some(id) = game.world_mut().enter_structure(planet, chunk) else {
            return Ok(false);
        };
        if self.is_host() {
            self.pending_alerts.entry(planet).or_default().insert(chunk);
        }
        let location = LocationState::structure(planet, id);
        let Some(entrance) = game.world().room(&location).map(|room| room.entrance()) else {
            return Ok(false);
        };
        let data = game.player_data();
        self.structure_return = Some((data.location, data.position));
        game.travel_to(location, room_position(entrance));
        self.queue_send_player_data();
        Ok(true)
    }

    /// Step out of a structure interior back to where it was entered.
    pub fn leave_structure<G: GameFacade>(&mut self, game: &mut G) -> SessionResult<bool> {
        self.check_can_mutate("leave_structure")?;
        if !game.player_data().location.is_in_structure() {
            return Ok(false);
        }
        let Some((location, position)) = self.structure_return.take() else {
            return Ok(false);
        };
        game.travel_to(location, position);
        self.queue_send_player_data();
        Ok(true)
    }

    /// Board a rocket. A client asks the host, which grants it only while
    /// the rocket is free.
    pub fn request_rocket_enter<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        reference: ObjectReference,
    ) -> SessionResult<bool> {
        self.check_can_mutate("request_rocket_enter")?;
        if self.is_client() {
            self.send_to_host(&Packet::from(RocketEnterRequestPacket { location, reference }))?;
            return Ok(true);
        }
        let local = self.local_peer();
        let origin = mutation::resolve(game.world(), &location, reference).unwrap_or(reference);
        let boarded = match mutation::object_mut(game.world_mut(), &location, reference) {
            Ok(object) => match object.as_rocket_mut() {
                Some(occupant) if occupant.is_none() => {
                    *occupant = Some(local);
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };
        if boarded {
            self.broadcast(
                &Packet::from(RocketInteractionPacket {
                    location,
                    reference: origin,
                    occupant: Some(local),
                }),
                None,
            )?;
        }
        Ok(boarded)
    }

    /// Leave a rocket the local player occupies.
    pub fn exit_rocket<G: GameFacade>(
        &mut self,
        game: &mut G,
        location: LocationState,
        reference: ObjectReference,
    ) -> SessionResult<bool> {
        self.check_can_mutate("exit_rocket")?;
        let local = self.local_peer();
        let origin = mutation::resolve(game.world(), &location, reference).unwrap_or(reference);
        let left = match mutation::object_mut(game.world_mut(), &location, reference) {
            Ok(object) => match object.as_rocket_mut() {
                Some(occupant) if *occupant == Some(local) => {
                    *occupant = None;
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };
        if left {
            self.route(&Packet::from(RocketInteractionPacket {
                location,
                reference: origin,
                occupant: None,
            }))?;
        }
        Ok(left)
    }

    /// Send the local player's persistent data now.
    pub(crate) fn send_player_data<G: GameFacade>(&mut self, game: &mut G) -> SessionResult<()> {
        let packet = Packet::from(PlayerDataPacket {
            peer: self.local_peer(),
            data: game.player_data().clone(),
        });
        match self.role {
            Role::Host => self.broadcast(&packet, None),
            Role::Client { .. } => {
                self.require_joined_client("send_player_data")?;
                self.send_to_host(&packet)
            }
            Role::Solo => Ok(()),
        }
    }

    /// Outbound traffic of one server tick.
    #[instrument(skip_all, fields(non_player = tick.non_player))]
    pub(crate) fn send_tick_updates<G: GameFacade>(&mut self, game: &mut G, tick: ServerTick) {
        let result = match self.role {
            Role::Host => self.send_host_tick(game, tick),
            Role::Client { joined: true, .. } => {
                let info = game
                    .character_state()
                    .to_packet(self.local_peer(), self.ping_location_string());
                self.send_to_host(&Packet::from(info))
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            warn!("tick update failed: {err}");
        }
    }

    fn send_host_tick<G: GameFacade>(&mut self, game: &mut G, tick: ServerTick) -> SessionResult<()> {
        if self.players.is_empty() {
            return Ok(());
        }
        let ping = self.ping_location_string();
        let local = self.local_peer();
        let own = Packet::from(game.character_state().to_packet(local, ping.clone()));
        self.broadcast(&own, None)?;
        let mirrored: Vec<(PeerId, Packet)> = self
            .players
            .values()
            .map(|player| (player.peer, Packet::from(player.character.to_packet(player.peer, ping.clone()))))
            .collect();
        for (peer, packet) in mirrored {
            self.broadcast(&packet, Some(peer))?;
        }

        if !tick.non_player {
            return Ok(());
        }
        let world = game.world();
        self.broadcast(
            &Packet::from(ServerInfoPacket {
                game_time: world.game_time(),
                ping_location: ping.clone(),
            }),
            None,
        )?;

        let world_size = world.world_size();
        let radius = self.config.view_radius;
        let viewers: Vec<(PeerId, PlanetType, ChunkViewRange)> = self
            .players
            .values()
            .filter(|player| player.location().is_on_planet_surface())
            .filter_map(|player| {
                let planet = player.location().planet()?;
                Some((player.peer, planet, ChunkViewRange::around(player.character.position, radius, world_size)))
            })
            .collect();
        for (peer, planet_type, view) in viewers {
            let Some(planet) = game.world().planet(planet_type) else {
                continue;
            };
            let location = LocationState::surface(planet_type);
            let mut chunks: Vec<_> = planet
                .chunks
                .entity_snapshot()
                .into_iter()
                .filter(|(pos, _)| view.contains(*pos, world_size))
                .take(MAX_ENTITY_CHUNKS_PER_PACKET)
                .collect();
            for (_, entities) in &mut chunks {
                entities.truncate(MAX_ENTITIES_PER_CHUNK);
            }
            let mut projectiles = planet.projectiles.snapshot();
            projectiles.truncate(MAX_PROJECTILES_PER_PACKET);
            let mut bosses = planet.bosses.snapshot();
            bosses.truncate(MAX_BOSSES_PER_PACKET);

            let packets = [
                Packet::from(EntitiesPacket {
                    location,
                    chunks,
                    ping_location: ping.clone(),
                }),
                Packet::from(ProjectilesPacket {
                    location,
                    projectiles,
                    ping_location: ping.clone(),
                }),
                Packet::from(BossesPacket {
                    location,
                    bosses,
                    ping_location: ping.clone(),
                }),
            ];
            for packet in &packets {
                if let Err(err) = self.send_packet(peer, packet) {
                    warn!(%peer, "snapshot not sent: {err}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestSession;
    use starhaven_core::PlayerData;
    use starhaven_world::{OBJECT_CHEST, OBJECT_ROCK, OBJECT_ROCKET};

    fn surface() -> LocationState {
        LocationState::surface(PlanetType::VERDANT)
    }

    #[test]
    fn built_objects_reach_every_peer() {
        let mut session = TestSession::joined(2);
        let (chunk, tile) = session.shared_free_cell(OBJECT_ROCK);
        let reference = ObjectReference::new(chunk, tile);
        let (client, game) = session.client_mut(0);
        assert!(client.build_object(game, surface(), reference, OBJECT_ROCK).unwrap());
        session.pump();

        for game in session.all_games() {
            let object = mutation::object(game.world(), &surface(), reference);
            assert_eq!(object.map(|o| o.object_type()), Some(OBJECT_ROCK));
        }
    }

    #[test]
    fn host_corrects_a_build_it_rejects() {
        let mut session = TestSession::joined(1);
        let (chunk, tile) = session.shared_free_cell(OBJECT_CHEST);
        let reference = ObjectReference::new(chunk, tile);
        {
            let (_, host_game) = session.host_mut();
            mutation::build_object(host_game.world_mut(), &surface(), reference, OBJECT_CHEST).unwrap();
        }
        let (client, game) = session.client_mut(0);
        assert!(client.build_object(game, surface(), reference, OBJECT_ROCK).unwrap());
        session.pump();

        let (_, game) = &session.clients[0];
        let object = mutation::object(game.world(), &surface(), reference);
        assert_eq!(object.map(|o| o.object_type()), Some(OBJECT_CHEST));
    }

    #[test]
    fn mutations_past_the_world_edge_generate_nothing() {
        let mut session = TestSession::joined(1);
        let peer = session.clients[0].0.local_peer();
        let outside = ChunkPosition::new(5000, 5000);
        let reference = ObjectReference::new(outside, TileCoord::new(0, 0));
        let (host, game) = session.host_mut();
        host.dispatch(
            game,
            peer,
            Packet::from(ObjectBuiltPacket {
                location: surface(),
                reference,
                object_type: OBJECT_ROCK,
            }),
        );
        host.dispatch(
            game,
            peer,
            Packet::from(LandPlacedPacket {
                location: surface(),
                chunk: outside,
                tile: TileCoord::new(1, 1),
                land: starhaven_world::TILE_SAND,
            }),
        );
        session.pump();

        for game in session.all_games() {
            let chunks = &game.world().planet(PlanetType::VERDANT).unwrap().chunks;
            assert!(!chunks.is_chunk_generated(outside));
        }
    }

    #[test]
    fn host_destruction_is_broadcast_to_everyone() {
        let mut session = TestSession::joined(2);
        let (chunk, tile) = session.shared_free_cell(OBJECT_ROCK);
        let reference = ObjectReference::new(chunk, tile);
        let (host, game) = session.host_mut();
        host.build_object(game, surface(), reference, OBJECT_ROCK).unwrap();
        session.pump();
        let (host, game) = session.host_mut();
        host.destroy_object(game, surface(), reference).unwrap();
        session.pump();

        for game in session.all_games() {
            assert!(mutation::object(game.world(), &surface(), reference).is_none());
        }
    }

    #[test]
    fn client_destroy_waits_for_the_host() {
        let mut session = TestSession::joined(1);
        let (chunk, tile) = session.shared_free_cell(OBJECT_ROCK);
        let reference = ObjectReference::new(chunk, tile);
        let (host, game) = session.host_mut();
        host.build_object(game, surface(), reference, OBJECT_ROCK).unwrap();
        session.pump();

        let (client, game) = session.client_mut(0);
        client.destroy_object(game, surface(), reference).unwrap();
        assert!(mutation::object(game.world(), &surface(), reference).is_some());
        session.pump();
        let (_, game) = &session.clients[0];
        assert!(mutation::object(game.world(), &surface(), reference).is_none());
    }

    #[test]
    fn chat_is_relayed_with_the_sender_name() {
        let mut session = TestSession::joined(2);
        let (client, game) = session.client_mut(0);
        client.send_chat(game, "hello").unwrap();
        session.pump();
        let name = session.clients[0].1.player.name.clone();
        assert!(session.host_game.chat.contains(&(name.clone(), "hello".to_string())));
        assert!(session.clients[1].1.chat.contains(&(name, "hello".to_string())));
        assert_eq!(session.clients[0].1.chat.len(), 1);
    }

    #[test]
    fn chests_get_an_id_from_the_host() {
        let mut session = TestSession::joined(1);
        let (chunk, tile) = session.shared_free_cell(OBJECT_CHEST);
        let reference = ObjectReference::new(chunk, tile);
        let (host, game) = session.host_mut();
        host.build_object(game, surface(), reference, OBJECT_CHEST).unwrap();
        session.pump();

        let (client, game) = session.client_mut(0);
        client.open_chest(game, surface(), reference).unwrap();
        session.pump();

        let (_, game) = &session.clients[0];
        let chest_id = game.opened_chests.last().copied().expect("chest opened");
        let object = mutation::object(game.world(), &surface(), reference).unwrap();
        assert_eq!(object.as_chest(), Some(Some(chest_id)));
        assert!(game.world().chests.get(chest_id).is_some());
    }

    #[test]
    fn disconnect_releases_chests_and_rockets() {
        let mut session = TestSession::joined(2);
        let (chunk, tile) = session.shared_free_cell(OBJECT_ROCKET);
        let reference = ObjectReference::new(chunk, tile);
        let (host, game) = session.host_mut();
        host.build_object(game, surface(), reference, OBJECT_ROCKET).unwrap();
        session.pump();

        let (client, game) = session.client_mut(0);
        client.request_rocket_enter(game, surface(), reference).unwrap();
        session.pump();
        let peer = session.clients[0].0.local_peer();
        let rocket = |session: &TestSession, i: Option<usize>| {
            let game = match i {
                Some(i) => &session.clients[i].1,
                None => &session.host_game,
            };
            mutation::object(game.world(), &surface(), reference).and_then(|o| o.rocket_occupant())
        };
        assert_eq!(rocket(&session, None), Some(Some(peer)));
        assert_eq!(rocket(&session, Some(1)), Some(Some(peer)));

        session.hub.disconnect(peer);
        session.pump();
        assert_eq!(rocket(&session, None), Some(None));
        assert_eq!(rocket(&session, Some(1)), Some(None));
    }

    #[test]
    fn operations_before_join_are_refused() {
        let mut session = TestSession::new(0);
        session.add_client();
        let (client, game) = session.client_mut(0);
        let err = client.send_chat(game, "early").unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert!(game.chat.is_empty());
    }

    #[test]
    fn player_data_is_debounced() {
        let mut session = TestSession::joined(2);
        let peer = session.clients[0].0.local_peer();
        {
            let (client, game) = session.client_mut(0);
            game.player.name = "renamed".into();
            client.queue_send_player_data();
            client.queue_send_player_data();
        }
        session.pump();
        let data: Option<&PlayerData> = session.clients[1].0.player(peer).map(|p| &p.data);
        assert_eq!(data.map(|d| d.name.as_str()), Some("renamed"));
    }

    #[test]
    fn character_info_is_mirrored_without_echo() {
        let mut session = TestSession::joined(2);
        {
            let (_, game) = session.client_mut(0);
            game.player.position = (300.0, 200.0);
        }
        session.pump();
        let peer = session.clients[0].0.local_peer();
        let seen = session.clients[1].0.player(peer).unwrap().character.position;
        assert!((seen.0 - 300.0).abs() < 1.0 && (seen.1 - 200.0).abs() < 1.0);
        assert!(session.clients[0].0.player(peer).is_none());
    }

    #[test]
    fn chat_is_cut_at_the_wire_limit() {
        assert_eq!(truncate_chat(&"a".repeat(MAX_CHAT_LEN + 10)).len(), MAX_CHAT_LEN);
    }
}
