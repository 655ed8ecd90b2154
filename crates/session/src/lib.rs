//! Host-authority session layer.
//!
//! One peer hosts and owns the authoritative world; clients mirror it,
//! request chunks on demand and send their mutations through the host.
//! [`NetworkHandler`] drives one peer's side over any
//! [`starhaven_net::Transport`].

mod cadence;
mod client;
mod config;
mod error;
mod game;
mod handler;
mod host;
mod host_queue;
pub mod mutation;
mod player;
mod requests;
mod shared;

#[cfg(test)]
mod test_support;

pub use cadence::{Debounce, ServerTick, UpdateCadence};
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use game::GameFacade;
pub use handler::{NetworkHandler, Role};
pub use host_queue::{HostRequest, HostRequestQueue};
pub use mutation::Rejection;
pub use player::{CharacterState, NetworkPlayer};
pub use requests::OutstandingChunkRequests;
