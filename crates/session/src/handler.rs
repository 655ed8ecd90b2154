//! Session state machine: roles, peer roster and packet dispatch.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use starhaven_core::{LocationState, PeerId, PlanetType, PlayerData};
use starhaven_net::protocol::MAX_CHUNK_REQUESTS_PER_PACKET;
use starhaven_net::{
    compute_data_hash, decode_packet, encode_packet, Packet, PacketType, Transport, TransportEvent,
};
use starhaven_world::{ChunkPosition, ChunkViewRange};
use tracing::{debug, info, instrument, trace, warn};

use crate::cadence::{Debounce, UpdateCadence};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::game::GameFacade;
use crate::host_queue::HostRequestQueue;
use crate::player::NetworkPlayer;
use crate::requests::OutstandingChunkRequests;

/// The local peer's part in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not in a session. The local world is authoritative and nothing is sent.
    Solo,
    /// Authoritative peer. Every client connects to the host.
    Host,
    /// Mirror of the host's world.
    Client {
        /// Known once the transport reports the connection.
        host: Option<PeerId>,
        /// Set when join info has been applied.
        joined: bool,
    },
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Solo => "solo",
            Role::Host => "host",
            Role::Client { .. } => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one peer's side of a session.
///
/// The handler owns the transport and all protocol bookkeeping, and is
/// handed the game on every call. Everything runs on the caller's thread:
/// [`NetworkHandler::update`] drains the transport, applies every packet,
/// advances timers and sends whatever the tick calls for.
pub struct NetworkHandler<T: Transport> {
    /// Message transport; the handler is its only user.
    pub(crate) transport: T,

    pub(crate) config: SessionConfig,

    pub(crate) role: Role,

    /// Hash of the protocol and content registries, compared at join.
    pub(crate) data_hash: u64,

    /// Remote peers. Never contains the local peer.
    pub(crate) players: BTreeMap<PeerId, NetworkPlayer>,

    /// Host: last-known data of peers that left, restored when they rejoin.
    pub(crate) saved_player_data: BTreeMap<PeerId, PlayerData>,

    /// Client: chunk requests waiting on a reply.
    pub(crate) chunk_requests: OutstandingChunkRequests,

    pub(crate) cadence: UpdateCadence,

    pub(crate) player_data_send: Debounce,

    /// Host: validated once per tick.
    pub(crate) host_requests: HostRequestQueue,

    /// Client: structure entry awaiting a reply, with its remaining cooldown.
    pub(crate) pending_structure_enter: Option<(ChunkPosition, f32)>,

    /// Host: chunks to announce as modified, per planet.
    pub(crate) pending_alerts: BTreeMap<PlanetType, BTreeSet<ChunkPosition>>,

    /// Where the local player left the surface when entering a structure.
    pub(crate) structure_return: Option<(LocationState, (f32, f32))>,

    /// Seconds of session time, advanced by `update`.
    pub(crate) clock: f64,
}

impl<T: Transport> NetworkHandler<T> {
    fn with_role(transport: T, config: SessionConfig, role: Role) -> Self {
        Self {
            transport,
            chunk_requests: OutstandingChunkRequests::new(config.chunk_request_timeout),
            cadence: UpdateCadence::new(
                config.server_update_tick,
                config.max_update_tick_count,
                config.non_player_update_tick,
            ),
            player_data_send: Debounce::new(config.player_data_send_delay),
            config,
            role,
            data_hash: compute_data_hash(),
            players: BTreeMap::new(),
            saved_player_data: BTreeMap::new(),
            host_requests: HostRequestQueue::default(),
            pending_structure_enter: None,
            pending_alerts: BTreeMap::new(),
            structure_return: None,
            clock: 0.0,
        }
    }

    /// Host a session. Clients are accepted as the transport reports them.
    pub fn host(transport: T, config: SessionConfig) -> Self {
        info!(peer = %transport.local_peer(), "hosting session");
        Self::with_role(transport, config, Role::Host)
    }

    /// Join the session behind `transport`. The join completes when the
    /// host's join info has been applied.
    pub fn client(transport: T, config: SessionConfig) -> Self {
        info!(peer = %transport.local_peer(), "joining session");
        Self::with_role(transport, config, Role::Client { host: None, joined: false })
    }

    /// Override the data hash sent and checked at join.
    pub fn with_data_hash(mut self, data_hash: u64) -> Self {
        self.data_hash = data_hash;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn is_client(&self) -> bool {
        matches!(self.role, Role::Client { .. })
    }

    /// A client that has applied its join info.
    pub fn is_joined(&self) -> bool {
        matches!(self.role, Role::Client { joined: true, .. })
    }

    /// Whether the local world is authoritative.
    pub fn is_authoritative(&self) -> bool {
        !self.is_client()
    }

    pub fn local_peer(&self) -> PeerId {
        self.transport.local_peer()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn players(&self) -> impl Iterator<Item = &NetworkPlayer> {
        self.players.values()
    }

    pub fn player(&self, peer: PeerId) -> Option<&NetworkPlayer> {
        self.players.get(&peer)
    }

    /// Host: data kept for a peer that disconnected.
    pub fn saved_player_data(&self, peer: PeerId) -> Option<&PlayerData> {
        self.saved_player_data.get(&peer)
    }

    pub fn outstanding_chunk_requests(&self) -> &OutstandingChunkRequests {
        &self.chunk_requests
    }

    pub fn pending_host_requests(&self) -> usize {
        self.host_requests.len()
    }

    pub(crate) fn host_peer(&self) -> Option<PeerId> {
        match self.role {
            Role::Client { host, .. } => host,
            _ => None,
        }
    }

    pub(crate) fn require_host(&self, operation: &'static str) -> SessionResult<()> {
        if self.is_host() {
            Ok(())
        } else {
            debug!(operation, role = %self.role, "access denied");
            Err(SessionError::AccessDenied { operation })
        }
    }

    pub(crate) fn require_joined_client(&self, operation: &'static str) -> SessionResult<PeerId> {
        match self.role {
            Role::Client {
                host: Some(host),
                joined: true,
            } => Ok(host),
            Role::Client { .. } => Err(SessionError::NotConnected),
            _ => {
                debug!(operation, role = %self.role, "access denied");
                Err(SessionError::AccessDenied { operation })
            }
        }
    }

    /// Seconds of one-way latency to the peer that sent `ping_location`.
    pub(crate) fn latency_to(&self, ping_location: &str) -> f32 {
        self.transport.ping_location().latency_to(ping_location)
    }

    pub(crate) fn ping_location_string(&self) -> String {
        self.transport.ping_location().to_string()
    }

    pub(crate) fn send_packet(&mut self, peer: PeerId, packet: &Packet) -> SessionResult<()> {
        let bytes = encode_packet(packet)?;
        self.transport
            .send(peer, &bytes, packet.packet_type().delivery())?;
        trace!(%peer, packet = packet.packet_type().as_str(), len = bytes.len(), "sent packet");
        Ok(())
    }

    /// Send to every remote peer in `peers`. A failure towards one peer is
    /// logged and does not stop the others.
    pub(crate) fn send_to_many(&mut self, peers: &[PeerId], packet: &Packet) -> SessionResult<()> {
        if peers.is_empty() {
            return Ok(());
        }
        let bytes = encode_packet(packet)?;
        let delivery = packet.packet_type().delivery();
        for &peer in peers {
            if let Err(err) = self.transport.send(peer, &bytes, delivery) {
                warn!(%peer, packet = packet.packet_type().as_str(), "send failed: {err}");
            }
        }
        Ok(())
    }

    /// Host: send to every client except `except`.
    pub(crate) fn broadcast(&mut self, packet: &Packet, except: Option<PeerId>) -> SessionResult<()> {
        let peers: Vec<PeerId> = self
            .players
            .keys()
            .copied()
            .filter(|peer| Some(*peer) != except)
            .collect();
        self.send_to_many(&peers, packet)
    }

    /// Host: send to the clients whose player is on `planet`, surface or
    /// structure.
    pub(crate) fn broadcast_on_planet(&mut self, planet: PlanetType, packet: &Packet) -> SessionResult<()> {
        let peers: Vec<PeerId> = self
            .players
            .values()
            .filter(|player| player.location().planet() == Some(planet))
            .map(|player| player.peer)
            .collect();
        self.send_to_many(&peers, packet)
    }

    pub(crate) fn send_to_host(&mut self, packet: &Packet) -> SessionResult<()> {
        let host = self.host_peer().ok_or(SessionError::NotConnected)?;
        self.send_packet(host, packet)
    }

    /// Deliver a locally originated mutation: the host tells every client,
    /// a client tells the host. Solo peers send nothing.
    pub(crate) fn route(&mut self, packet: &Packet) -> SessionResult<()> {
        match self.role {
            Role::Host => self.broadcast(packet, None),
            Role::Client { .. } => self.send_to_host(packet),
            Role::Solo => Ok(()),
        }
    }

    /// Schedule a debounced send of the local player's data.
    pub fn queue_send_player_data(&mut self) {
        if self.role != Role::Solo {
            self.player_data_send.queue();
        }
    }

    /// Run one frame: drain the transport, advance timers, drain host
    /// requests and send what this tick calls for.
    #[instrument(skip_all, fields(role = self.role.as_str()))]
    pub fn update<G: GameFacade>(&mut self, game: &mut G, dt: f32) {
        self.clock += dt as f64;
        self.receive(game);
        if self.role == Role::Solo {
            return;
        }
        self.advance_timers(game, dt);
        if self.is_host() {
            self.process_host_requests(game);
            self.flush_chunk_alerts(game);
        }
        if let Some(tick) = self.cadence.advance(dt) {
            self.send_tick_updates(game, tick);
        }
    }

    fn receive<G: GameFacade>(&mut self, game: &mut G) {
        let batch = self.config.receive_batch_size.max(1);
        loop {
            let events = self.transport.poll(batch);
            if events.is_empty() {
                break;
            }
            for event in events {
                match event {
                    TransportEvent::Connected(peer) => self.on_peer_connected(game, peer),
                    TransportEvent::Message { peer, bytes, .. } => self.on_message(game, peer, &bytes),
                    TransportEvent::Disconnected(peer) => self.on_peer_disconnected(game, peer),
                }
            }
        }
    }

    fn advance_timers<G: GameFacade>(&mut self, game: &mut G, dt: f32) {
        if let Some((chunk, remaining)) = self.pending_structure_enter.as_mut() {
            *remaining -= dt;
            if *remaining <= 0.0 {
                debug!(chunk = %chunk, "structure entry timed out");
                self.pending_structure_enter = None;
            }
        }
        if self.player_data_send.advance(dt) {
            if let Err(err) = self.send_player_data(game) {
                debug!("player data not sent: {err}");
            }
        }
    }

    fn on_peer_connected<G: GameFacade>(&mut self, game: &mut G, peer: PeerId) {
        match self.role {
            Role::Host => self.greet_peer(game, peer),
            Role::Client { host: None, joined } => {
                info!(host = %peer, "connected to host");
                self.role = Role::Client {
                    host: Some(peer),
                    joined,
                };
            }
            Role::Client { host: Some(host), .. } => {
                warn!(%peer, %host, "unexpected second connection, closing it");
                self.transport.disconnect(peer);
            }
            Role::Solo => self.transport.disconnect(peer),
        }
    }

    fn on_peer_disconnected<G: GameFacade>(&mut self, game: &mut G, peer: PeerId) {
        match self.role {
            Role::Host => self.remove_peer(game, peer),
            Role::Client { host, .. } if host == Some(peer) => {
                warn!(%peer, "lost connection to host");
                self.leave_session(game, "Lost connection to the host");
            }
            _ => debug!(%peer, "disconnect from a peer outside the session"),
        }
    }

    #[instrument(skip_all, fields(%peer, len = bytes.len()))]
    fn on_message<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, bytes: &[u8]) {
        match decode_packet(bytes) {
            Ok(packet) => self.dispatch(game, peer, packet),
            Err(err) => warn!("discarding undecodable packet: {err:#}"),
        }
    }

    /// Apply one decoded packet from `peer`.
    pub fn dispatch<G: GameFacade>(&mut self, game: &mut G, peer: PeerId, packet: Packet) {
        let packet_type = packet.packet_type();
        if !self.accepts_from(peer, packet_type) {
            debug!(%peer, packet = packet_type.as_str(), role = %self.role, "ignoring packet from outside the session");
            return;
        }
        if let Some(location) = packet.world_location() {
            if !game.world().is_location_initialized(&location) {
                warn!(%peer, packet = packet_type.as_str(), %location, "dropping packet for an uninitialised location");
                return;
            }
        }
        trace!(%peer, packet = packet_type.as_str(), "dispatching");

        let unhandled = match self.role {
            Role::Host => self.process_message_as_host(game, peer, packet),
            Role::Client { .. } => self.process_message_as_client(game, peer, packet),
            Role::Solo => None,
        };
        if let Some(packet) = unhandled {
            self.process_shared_message(game, peer, packet);
        }
    }

    fn accepts_from(&self, peer: PeerId, packet_type: PacketType) -> bool {
        match self.role {
            Role::Host => self.players.contains_key(&peer) || packet_type == PacketType::JoinReply,
            Role::Client { host, joined } => {
                host == Some(peer)
                    && (joined
                        || matches!(
                            packet_type,
                            PacketType::JoinQuery | PacketType::JoinInfo | PacketType::JoinFailed
                        ))
            }
            Role::Solo => false,
        }
    }

    /// Leave the session: a client drops its host, a host drops every client.
    pub fn disconnect<G: GameFacade>(&mut self, game: &mut G) {
        match self.role {
            Role::Host => {
                let peers: Vec<PeerId> = self.players.keys().copied().collect();
                for peer in peers {
                    self.transport.disconnect(peer);
                    self.remove_peer(game, peer);
                }
                self.role = Role::Solo;
                info!("stopped hosting");
            }
            Role::Client { .. } => self.leave_session(game, "Disconnected"),
            Role::Solo => {}
        }
    }

    pub(crate) fn leave_session<G: GameFacade>(&mut self, game: &mut G, reason: &str) {
        if let Some(host) = self.host_peer() {
            self.transport.disconnect(host);
        }
        self.role = Role::Solo;
        self.players.clear();
        self.chunk_requests.clear();
        self.pending_structure_enter = None;
        self.player_data_send.cancel();
        game.show_notice(reason);
        info!(reason, "left session");
    }

    /// Chunk views that keep `planet`'s chunks loaded: the local player
    /// and, on a host, every remote player on that surface.
    pub fn view_ranges<G: GameFacade>(&self, game: &G, planet: PlanetType) -> Vec<ChunkViewRange> {
        let world_size = game.world().world_size();
        let radius = self.config.view_radius;
        let surface = LocationState::surface(planet);
        let mut views = Vec::new();
        let local = game.player_data();
        if local.location == surface {
            views.push(ChunkViewRange::around(local.position, radius, world_size));
        }
        if self.is_host() {
            views.extend(
                self.players
                    .values()
                    .filter(|player| player.location() == surface)
                    .map(|player| ChunkViewRange::around(player.character.position, radius, world_size)),
            );
        }
        views
    }

    /// Player positions per planet surface, for simulation targets.
    pub fn simulation_targets<G: GameFacade>(&self, game: &G) -> BTreeMap<PlanetType, Vec<(f32, f32)>> {
        let mut targets: BTreeMap<PlanetType, Vec<(f32, f32)>> = BTreeMap::new();
        let local = game.player_data();
        if let (true, Some(planet)) = (local.location.is_on_planet_surface(), local.location.planet()) {
            targets.entry(planet).or_default().push(local.position);
        }
        for player in self.players.values() {
            let location = player.location();
            if let (true, Some(planet)) = (location.is_on_planet_surface(), location.planet()) {
                targets.entry(planet).or_default().push(player.character.position);
            }
        }
        targets
    }

    /// Load and unload chunks around every viewer. A client asks the host
    /// for chunks it does not have. Returns whether anything changed.
    #[instrument(skip_all, fields(role = self.role.as_str()))]
    pub fn update_chunks<G: GameFacade>(&mut self, game: &mut G) -> bool {
        if self.is_client() && !self.is_joined() {
            return false;
        }
        let planets: Vec<PlanetType> = game.world().planets().map(|planet| planet.planet_type()).collect();
        let is_client = self.is_client();
        let mut changed = false;
        let mut requests = Vec::new();
        for planet_type in planets {
            let views = self.view_ranges(game, planet_type);
            let Some(planet) = game.world_mut().planet_mut(planet_type) else {
                continue;
            };
            if views.is_empty() && planet.chunks.store().loaded_len() == 0 {
                continue;
            }
            let mut planet_requests = Vec::new();
            changed |= planet.chunks.update_chunks(&views, is_client, &mut planet_requests);
            changed |= planet.chunks.unload_chunks_out_of_view(&views);
            if is_client && game.player_data().location == LocationState::surface(planet_type) {
                requests.extend(planet_requests);
            }
        }
        if !requests.is_empty() {
            if let Err(err) = self.request_chunks_from_host(game, &requests, false) {
                debug!("chunk request not sent: {err}");
            }
        }
        changed
    }

    /// Ask the host for chunks of the local player's planet. Positions with
    /// a request younger than the timeout are skipped unless `force` is set.
    /// Returns how many positions were requested.
    #[instrument(skip_all, fields(count = positions.len(), force))]
    pub fn request_chunks_from_host<G: GameFacade>(
        &mut self,
        game: &mut G,
        positions: &[ChunkPosition],
        force: bool,
    ) -> SessionResult<usize> {
        self.require_joined_client("request_chunks_from_host")?;
        let Some(location) = game.player_data().location.surface_of() else {
            debug!("not on a planet, chunk request skipped");
            return Ok(0);
        };
        let claimed = self.chunk_requests.claim(positions, self.clock, force);
        for batch in claimed.chunks(MAX_CHUNK_REQUESTS_PER_PACKET) {
            let packet = Packet::from(starhaven_net::protocol::ChunkRequestsPacket {
                location,
                chunks: batch.to_vec(),
            });
            self.send_to_host(&packet)?;
        }
        if !claimed.is_empty() {
            debug!(requested = claimed.len(), "requested chunks from host");
        }
        Ok(claimed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestGame, TestSession};
    use starhaven_net::protocol::{ChatMessagePacket, ChunkModifiedAlertsPacket};

    #[test]
    fn host_only_operations_are_denied_to_clients() {
        let mut session = TestSession::joined(1);
        let (client, game) = session.client_mut(0);
        let err = client
            .send_chunk_modified_alerts(game, PlanetType::VERDANT, &[ChunkPosition::new(0, 0)])
            .unwrap_err();
        assert!(matches!(err, SessionError::AccessDenied { .. }));
    }

    #[test]
    fn client_only_operations_are_denied_to_hosts() {
        let mut session = TestSession::joined(1);
        let (host, game) = session.host_mut();
        let err = host
            .request_chunks_from_host(game, &[ChunkPosition::new(0, 0)], false)
            .unwrap_err();
        assert!(matches!(err, SessionError::AccessDenied { .. }));
    }

    #[test]
    fn packets_for_uninitialised_locations_are_dropped() {
        let mut session = TestSession::joined(1);
        let host_peer = session.host.local_peer();
        let (client, game) = session.client_mut(0);
        let before = game.world().planet(PlanetType::GLACIER).is_some();
        client.dispatch(
            game,
            host_peer,
            Packet::from(ChunkModifiedAlertsPacket {
                location: LocationState::surface(PlanetType::GLACIER),
                chunks: vec![ChunkPosition::new(1, 1)],
            }),
        );
        assert!(!before);
        assert!(game.world().planet(PlanetType::GLACIER).is_none());
        assert!(client.outstanding_chunk_requests().is_empty());
    }

    #[test]
    fn unanswered_chunk_requests_go_out_again_after_the_timeout() {
        let mut session = TestSession::joined(1);
        let hub = session.hub.clone();
        let host_peer = session.host.local_peer();
        let pos = ChunkPosition::new(9, 9);
        let (client, game) = session.client_mut(0);

        let before = hub.pending(host_peer);
        assert_eq!(client.request_chunks_from_host(game, &[pos], false).unwrap(), 1);
        assert_eq!(hub.pending(host_peer), before + 1);

        let before = hub.pending(host_peer);
        assert_eq!(client.request_chunks_from_host(game, &[pos], false).unwrap(), 0);
        assert_eq!(hub.pending(host_peer), before, "nothing new on the wire");

        // Host is not pumped, so the request stays unanswered.
        client.update(game, 3.5);
        let before = hub.pending(host_peer);
        assert_eq!(client.request_chunks_from_host(game, &[pos], false).unwrap(), 1);
        assert_eq!(hub.pending(host_peer), before + 1);
        assert!(client.outstanding_chunk_requests().is_outstanding(pos));
    }

    #[test]
    fn modified_alert_overrides_the_request_cooldown() {
        let mut session = TestSession::joined(1);
        let hub = session.hub.clone();
        let host_peer = session.host.local_peer();
        let pos = ChunkPosition::new(2, 3);
        let (client, game) = session.client_mut(0);
        game.world_mut()
            .planet_mut(PlanetType::VERDANT)
            .unwrap()
            .chunks
            .get_chunk_data_and_generate(pos);
        assert_eq!(client.request_chunks_from_host(game, &[pos], false).unwrap(), 1);

        let before = hub.pending(host_peer);
        client.dispatch(
            game,
            host_peer,
            Packet::from(ChunkModifiedAlertsPacket {
                location: LocationState::surface(PlanetType::VERDANT),
                chunks: vec![pos],
            }),
        );
        assert_eq!(hub.pending(host_peer), before + 1);
        assert!(client.outstanding_chunk_requests().is_outstanding(pos));
    }

    #[test]
    fn packets_from_strangers_are_ignored() {
        let mut session = TestSession::joined(1);
        let (host, game) = session.host_mut();
        host.dispatch(
            game,
            PeerId(999),
            Packet::from(ChatMessagePacket {
                sender: PeerId(999),
                name: "ghost".into(),
                text: "boo".into(),
            }),
        );
        assert!(game.chat.is_empty());
    }

    #[test]
    fn undecodable_bytes_do_not_stop_the_session() {
        let mut session = TestSession::joined(1);
        let client_peer = session.clients[0].0.local_peer();
        let (host, game) = session.host_mut();
        host.on_message(game, client_peer, &[0xff, 1, 2, 3]);
        assert!(host.player(client_peer).is_some());
    }

    #[test]
    fn losing_the_host_leaves_the_session() {
        let mut session = TestSession::joined(1);
        let host_peer = session.host.local_peer();
        session.hub.disconnect(host_peer);
        session.pump();
        let (client, game): (&mut NetworkHandler<_>, &mut TestGame) = session.client_mut(0);
        assert_eq!(client.role(), Role::Solo);
        assert!(!game.notices.is_empty());
    }
}
