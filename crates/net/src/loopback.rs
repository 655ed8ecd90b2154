//! In-process [`Transport`] for deterministic tests and headless runs.
//!
//! A [`LoopbackHub`] owns the per-peer event queues. Messages are delivered
//! to the receiver's queue immediately and show up on its next `poll`.
//! Unreliable messages can be dropped with a seeded probability.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use starhaven_core::PeerId;
use tracing::{debug, trace};

use crate::ping::PingLocation;
use crate::transport::{Delivery, Transport, TransportError, TransportEvent};

#[derive(Default)]
struct Endpoint {
    queue: VecDeque<TransportEvent>,
    links: BTreeSet<PeerId>,
    ping_location: PingLocation,
}

struct HubState {
    endpoints: BTreeMap<PeerId, Endpoint>,
    drop_rate: f64,
    rng: StdRng,
    sent_bytes: u64,
    dropped: u64,
}

/// Shared switchboard for [`LoopbackTransport`]s.
#[derive(Clone)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new(0)
    }
}

impl LoopbackHub {
    /// `seed` drives the unreliable drop decisions.
    pub fn new(seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(HubState {
                endpoints: BTreeMap::new(),
                drop_rate: 0.0,
                rng: StdRng::seed_from_u64(seed),
                sent_bytes: 0,
                dropped: 0,
            })),
        }
    }

    /// Create the endpoint for `peer`. Reusing a peer id resets its queue.
    pub fn transport(&self, peer: PeerId) -> LoopbackTransport {
        self.state.borrow_mut().endpoints.insert(peer, Endpoint::default());
        LoopbackTransport {
            hub: self.clone(),
            local: peer,
        }
    }

    /// Connect two endpoints. Each receives a `Connected` event for the other.
    pub fn link(&self, a: PeerId, b: PeerId) {
        let mut state = self.state.borrow_mut();
        for (from, to) in [(a, b), (b, a)] {
            if let Some(endpoint) = state.endpoints.get_mut(&from) {
                if endpoint.links.insert(to) {
                    endpoint.queue.push_back(TransportEvent::Connected(to));
                }
            }
        }
        debug!(%a, %b, "loopback link up");
    }

    /// Sever every link of `peer`. Its former partners see `Disconnected`.
    pub fn disconnect(&self, peer: PeerId) {
        let mut state = self.state.borrow_mut();
        let partners = match state.endpoints.get_mut(&peer) {
            Some(endpoint) => std::mem::take(&mut endpoint.links),
            None => return,
        };
        for partner in partners {
            if let Some(endpoint) = state.endpoints.get_mut(&partner) {
                endpoint.links.remove(&peer);
                endpoint.queue.push_back(TransportEvent::Disconnected(peer));
            }
            if let Some(endpoint) = state.endpoints.get_mut(&peer) {
                endpoint.queue.push_back(TransportEvent::Disconnected(partner));
            }
        }
        debug!(%peer, "loopback peer disconnected");
    }

    /// Probability in `[0, 1]` that an unreliable message is lost.
    pub fn set_unreliable_drop_rate(&self, rate: f64) {
        self.state.borrow_mut().drop_rate = rate.clamp(0.0, 1.0);
    }

    pub fn set_ping_location(&self, peer: PeerId, location: PingLocation) {
        if let Some(endpoint) = self.state.borrow_mut().endpoints.get_mut(&peer) {
            endpoint.ping_location = location;
        }
    }

    /// Total bytes accepted for delivery.
    pub fn sent_bytes(&self) -> u64 {
        self.state.borrow().sent_bytes
    }

    /// Unreliable messages lost to the drop rate.
    pub fn dropped_messages(&self) -> u64 {
        self.state.borrow().dropped
    }

    /// Events waiting for `peer`.
    pub fn pending(&self, peer: PeerId) -> usize {
        self.state
            .borrow()
            .endpoints
            .get(&peer)
            .map_or(0, |endpoint| endpoint.queue.len())
    }
}

pub struct LoopbackTransport {
    hub: LoopbackHub,
    local: PeerId,
}

impl Transport for LoopbackTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn send(&mut self, peer: PeerId, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        let mut state = self.hub.state.borrow_mut();
        let linked = state
            .endpoints
            .get(&self.local)
            .is_some_and(|endpoint| endpoint.links.contains(&peer));
        if !linked {
            return Err(TransportError::UnknownPeer(peer));
        }

        if delivery == Delivery::Unreliable && state.drop_rate > 0.0 {
            let rate = state.drop_rate;
            if state.rng.gen_bool(rate) {
                state.dropped += 1;
                trace!(from = %self.local, to = %peer, "dropped unreliable message");
                return Ok(());
            }
        }

        state.sent_bytes += bytes.len() as u64;
        let receiver = state
            .endpoints
            .get_mut(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        receiver.queue.push_back(TransportEvent::Message {
            peer: self.local,
            bytes: bytes.to_vec(),
            delivery,
        });
        Ok(())
    }

    fn poll(&mut self, max: usize) -> Vec<TransportEvent> {
        let mut state = self.hub.state.borrow_mut();
        let Some(endpoint) = state.endpoints.get_mut(&self.local) else {
            return Vec::new();
        };
        let count = max.min(endpoint.queue.len());
        endpoint.queue.drain(..count).collect()
    }

    fn ping_location(&self) -> PingLocation {
        self.hub
            .state
            .borrow()
            .endpoints
            .get(&self.local)
            .map(|endpoint| endpoint.ping_location.clone())
            .unwrap_or_default()
    }

    fn disconnect(&mut self, peer: PeerId) {
        let linked = self
            .hub
            .state
            .borrow()
            .endpoints
            .get(&self.local)
            .is_some_and(|endpoint| endpoint.links.contains(&peer));
        if !linked {
            return;
        }
        let mut state = self.hub.state.borrow_mut();
        for (from, to) in [(self.local, peer), (peer, self.local)] {
            if let Some(endpoint) = state.endpoints.get_mut(&from) {
                endpoint.links.remove(&to);
                endpoint.queue.push_back(TransportEvent::Disconnected(to));
            }
        }
    }
}
