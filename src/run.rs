use std::time::{Duration, Instant};

use starhaven_session::{GameFacade, NetworkHandler, Role};
use starhaven_net::Transport;
use starhaven_testkit::{HeadlessGame, SessionReport};
use tracing::{info, warn};

/// Seconds between status lines.
const STATUS_INTERVAL: f64 = 10.0;

/// Drive one peer at the server tick rate until it leaves the session or
/// `frames` have run.
pub fn run_session<T: Transport>(handler: &mut NetworkHandler<T>, game: &mut HeadlessGame, frames: Option<u64>) {
    let frame_time = handler.config().server_update_tick;
    let frame = Duration::from_secs_f32(frame_time);
    let started_as_client = handler.is_client();
    let mut last = Instant::now();
    let mut since_status = 0.0;
    let mut count = 0u64;

    loop {
        if frames.is_some_and(|limit| count >= limit) {
            break;
        }
        let dt = last.elapsed().as_secs_f32().max(frame_time);
        last = Instant::now();

        handler.update(game, dt);
        handler.update_chunks(game);
        let targets = handler.simulation_targets(&*game);
        let updates = game.world_mut().update(dt, handler.is_authoritative(), &targets);
        if handler.is_host() {
            handler.handle_world_update(game, &updates);
        }
        if started_as_client && handler.role() == Role::Solo {
            warn!(notices = ?game.notices, "session ended");
            break;
        }

        since_status += f64::from(dt);
        if since_status >= STATUS_INTERVAL {
            since_status = 0.0;
            info!(
                role = %handler.role(),
                players = handler.players().count(),
                location = %game.player.location,
                game_time = game.world.game_time(),
                "status"
            );
        }
        count += 1;
        if let Some(rest) = frame.checked_sub(last.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}

pub fn log_report(report: &SessionReport) {
    let Some(session) = &report.session else {
        return;
    };
    info!(
        clients = session.clients,
        joined = session.clients_joined,
        bytes = session.bytes_sent,
        dropped = session.messages_dropped,
        frames = report.execution.frames,
        wall_seconds = report.execution.wall_seconds,
        "loopback run finished"
    );
    for peer in &session.peers {
        info!(
            peer = peer.peer,
            role = %peer.role,
            location = %peer.location,
            known_players = peer.known_players,
            resident_chunks = peer.resident_chunks,
            "peer"
        );
    }
}
