//! A host and any number of clients stepped together over the loopback hub.

use std::time::Instant;

use starhaven_core::PeerId;
use starhaven_net::{LoopbackHub, LoopbackTransport};
use starhaven_session::{GameFacade, NetworkHandler, SessionConfig};
use tracing::{debug, info, instrument};

use crate::game::HeadlessGame;
use crate::report::{ExecutionMetrics, PeerMetrics, SessionMetrics, SessionReport, SessionReportBuilder, TestResult};

/// Peer id of the harness host. Clients count up from [`FIRST_CLIENT_PEER`].
pub const HOST_PEER: PeerId = PeerId(1);
/// Peer id of the first client added.
pub const FIRST_CLIENT_PEER: PeerId = PeerId(100);

/// One peer's handler and game.
pub struct Peer {
    /// Session driver.
    pub handler: NetworkHandler<LoopbackTransport>,
    /// Headless game it drives.
    pub game: HeadlessGame,
}

impl Peer {
    /// Run one frame of this peer: network, chunk views, then simulation.
    /// Only the host simulates; its world changes are announced to clients.
    pub fn step(&mut self, dt: f32) {
        let Self { handler, game } = self;
        handler.update(game, dt);
        handler.update_chunks(game);
        let targets = handler.simulation_targets(&*game);
        let updates = game.world_mut().update(dt, handler.is_authoritative(), &targets);
        if handler.is_host() {
            handler.handle_world_update(game, &updates);
        }
    }

    /// This peer's id.
    pub fn peer(&self) -> PeerId {
        self.handler.local_peer()
    }
}

/// In-process session of one host and its clients.
pub struct Harness {
    hub: LoopbackHub,
    config: SessionConfig,
    seed: u64,
    host: Peer,
    clients: Vec<Peer>,
    frames: u64,
    started: Instant,
}

impl Harness {
    /// A host on a world of `config.world_size` generated from `seed`, with
    /// no clients yet.
    pub fn new(config: SessionConfig, seed: u64) -> Self {
        let hub = LoopbackHub::new(seed);
        let game = HeadlessGame::host(
            "host",
            seed,
            config.world_size,
            config.starting_planet,
            config.spawn_water_search_radius,
        );
        let handler = NetworkHandler::host(hub.transport(HOST_PEER), config.clone());
        info!(seed, world_size = config.world_size, "harness ready");
        Self {
            hub,
            config,
            seed,
            host: Peer { handler, game },
            clients: Vec::new(),
            frames: 0,
            started: Instant::now(),
        }
    }

    /// Connect a client named `name`. It joins over the next frames.
    pub fn add_client(&mut self, name: &str) -> PeerId {
        self.connect_client(name, None)
    }

    /// Connect a client that presents `data_hash` instead of its own.
    pub fn add_client_with_hash(&mut self, name: &str, data_hash: u64) -> PeerId {
        self.connect_client(name, Some(data_hash))
    }

    fn connect_client(&mut self, name: &str, data_hash: Option<u64>) -> PeerId {
        let peer = PeerId(FIRST_CLIENT_PEER.0 + self.clients.len() as u64);
        let mut handler = NetworkHandler::client(self.hub.transport(peer), self.config.clone());
        if let Some(hash) = data_hash {
            handler = handler.with_data_hash(hash);
        }
        // The world is replaced by the host's at join.
        let game = HeadlessGame::new(name, 0, self.config.world_size);
        self.clients.push(Peer { handler, game });
        self.hub.link(HOST_PEER, peer);
        debug!(%peer, name, "client connected");
        peer
    }

    /// Drop `peer`'s links; both sides see the disconnect next frame.
    pub fn disconnect(&mut self, peer: PeerId) {
        self.hub.disconnect(peer);
    }

    /// Replace client `index` with a fresh one under the same peer id and name.
    pub fn reconnect_client(&mut self, index: usize) {
        let peer = self.clients[index].peer();
        let name = self.clients[index].game.player.name.clone();
        let handler = NetworkHandler::client(self.hub.transport(peer), self.config.clone());
        let game = HeadlessGame::new(&name, 0, self.config.world_size);
        self.clients[index] = Peer { handler, game };
        self.hub.link(HOST_PEER, peer);
    }

    /// Seconds per frame: one server tick.
    pub fn frame_time(&self) -> f32 {
        self.config.server_update_tick
    }

    /// Step the host, then every client, once.
    pub fn step(&mut self) {
        let dt = self.frame_time();
        self.host.step(dt);
        for client in &mut self.clients {
            client.step(dt);
        }
        self.frames += 1;
    }

    /// Step `frames` times.
    #[instrument(skip(self))]
    pub fn run(&mut self, frames: u64) {
        for _ in 0..frames {
            self.step();
        }
    }

    /// Step until `done` holds, for at most `max_frames`. Returns whether it
    /// held.
    pub fn run_until(&mut self, max_frames: u64, mut done: impl FnMut(&Harness) -> bool) -> bool {
        for _ in 0..max_frames {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    /// Step until every client has joined or left the session.
    pub fn settle_joins(&mut self, max_frames: u64) -> bool {
        self.run_until(max_frames, |harness| {
            harness
                .clients
                .iter()
                .all(|client| client.handler.is_joined() || !client.handler.is_client())
        })
    }

    /// The loopback hub, for drop rates and traffic counters.
    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }

    /// The shared session config.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The host peer.
    pub fn host(&self) -> &Peer {
        &self.host
    }

    /// The host peer, mutably.
    pub fn host_mut(&mut self) -> &mut Peer {
        &mut self.host
    }

    /// Client `index` in connection order.
    pub fn client(&self, index: usize) -> &Peer {
        &self.clients[index]
    }

    /// Client `index`, mutably.
    pub fn client_mut(&mut self, index: usize) -> &mut Peer {
        &mut self.clients[index]
    }

    /// All clients in connection order.
    pub fn clients(&self) -> &[Peer] {
        &self.clients
    }

    /// Frames stepped so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Summary of the session so far.
    pub fn report(&self, test_name: &str) -> SessionReport {
        let joined = self.clients.iter().filter(|c| c.handler.is_joined()).count();
        let peers = std::iter::once(&self.host)
            .chain(&self.clients)
            .map(|peer| PeerMetrics {
                peer: peer.peer().0,
                role: peer.handler.role().as_str().to_string(),
                location: peer.game.player.location.to_string(),
                known_players: peer.handler.players().count(),
                outstanding_chunk_requests: peer.handler.outstanding_chunk_requests().len(),
                resident_chunks: peer
                    .game
                    .world
                    .planets()
                    .map(|planet| planet.chunks.store().all_positions().count())
                    .sum(),
            })
            .collect();
        let result = if joined == self.clients.len() {
            TestResult::Pass
        } else {
            TestResult::Fail
        };
        SessionReportBuilder::new(test_name)
            .result(result)
            .session(SessionMetrics {
                seed: self.seed,
                world_size: self.config.world_size,
                clients: self.clients.len(),
                clients_joined: joined,
                bytes_sent: self.hub.sent_bytes(),
                messages_dropped: self.hub.dropped_messages(),
                game_time: self.host.game.world.game_time(),
                peers,
            })
            .execution(ExecutionMetrics {
                frames: self.frames,
                simulated_seconds: self.frames as f64 * f64::from(self.frame_time()),
                wall_seconds: self.started.elapsed().as_secs_f64(),
            })
            .build()
    }
}
