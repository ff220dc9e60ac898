use thiserror::Error;

/// Failures of a single signaling exchange with the camera's
/// negotiation endpoint. The signaling client never retries; the
/// connection manager decides what happens next.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// The endpoint answered with a non-2xx status.
    #[error("negotiation endpoint rejected the offer (HTTP {0})")]
    ServerRejected(u16),
    /// The endpoint answered 200 but the body was not an applicable
    /// session description.
    #[error("negotiation endpoint returned an invalid answer: {0}")]
    InvalidAnswer(String),
    /// The POST never reached the endpoint.
    #[error("negotiation endpoint unreachable: {0}")]
    Unreachable(String),
    /// The HTTP exchange timed out.
    #[error("negotiation request timed out")]
    Timeout,
}

/// Failures reported by the underlying media transport after (or
/// while) a session is established.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connectivity is degraded; media may recover or drop entirely.
    #[error("media transport degraded")]
    Degraded,
    /// The transport lost connectivity.
    #[error("media transport disconnected")]
    Disconnected,
    /// The transport failed and cannot recover on its own.
    #[error("media transport failed: {0}")]
    Failed(String),
}

/// What subscribers see attached to an `Error` status. Either side of
/// the session can kill it, so both taxonomies funnel into one type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
