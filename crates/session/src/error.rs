use starhaven_net::TransportError;
use thiserror::Error;

/// Failure of a session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation needs the other role. Nothing was sent or applied.
    #[error("{operation} is not permitted in the current role")]
    AccessDenied { operation: &'static str },
    /// No session, or a client that has not finished joining.
    #[error("not connected to a session")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode packet: {0:#}")]
    Codec(#[from] anyhow::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
