//! Host-side requests that are validated once per tick instead of inline.

use std::collections::VecDeque;

use starhaven_core::{LocationState, PeerId, PlanetType, RoomType};
use starhaven_world::{BossType, ChunkPosition, ObjectReference};

/// A request whose validation depends on simulation state that may change
/// between packets (is the rocket still free, is the boss still alive).
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    PlanetTravel {
        peer: PeerId,
        planet: PlanetType,
    },
    RoomTravel {
        peer: PeerId,
        room: RoomType,
    },
    StructureEnter {
        peer: PeerId,
        planet: PlanetType,
        chunk: ChunkPosition,
    },
    RocketEnter {
        peer: PeerId,
        location: LocationState,
        reference: ObjectReference,
    },
    BossSpawn {
        location: LocationState,
        boss_type: BossType,
        position: (f32, f32),
    },
}

impl HostRequest {
    /// The peer waiting on a reply, if any.
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            HostRequest::PlanetTravel { peer, .. }
            | HostRequest::RoomTravel { peer, .. }
            | HostRequest::StructureEnter { peer, .. }
            | HostRequest::RocketEnter { peer, .. } => Some(*peer),
            HostRequest::BossSpawn { .. } => None,
        }
    }
}

/// FIFO of pending [`HostRequest`]s.
#[derive(Debug, Clone, Default)]
pub struct HostRequestQueue {
    pending: VecDeque<HostRequest>,
}

impl HostRequestQueue {
    pub fn push(&mut self, request: HostRequest) {
        self.pending.push_back(request);
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<HostRequest> {
        self.pending.drain(..).collect()
    }

    /// Drop the requests of a peer that left.
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.pending.retain(|request| request.peer() != Some(peer));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
