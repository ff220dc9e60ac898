//! Narrow abstraction over the real-time media transport.
//!
//! The connection manager and signaling client only ever talk to these
//! traits, so the whole state machine can be exercised in tests with a
//! mock transport. The production implementation lives in `peer`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TransportError;

/// Media kind of a remote track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Unknown,
}

/// A single live remote media track.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;
}

/// The shared media resource produced by a successful session.
///
/// Cloning is cheap and every clone refers to the same underlying
/// track; all viewers of a `Connected` manager hold clones of one
/// handle, never per-viewer copies.
#[derive(Clone)]
pub struct StreamHandle {
    track: Arc<dyn MediaTrack>,
}

impl StreamHandle {
    pub fn new(track: Arc<dyn MediaTrack>) -> Self {
        Self { track }
    }

    pub fn id(&self) -> String {
        self.track.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.track.kind()
    }

    /// True if both handles wrap the same underlying track instance.
    pub fn same_track(&self, other: &StreamHandle) -> bool {
        Arc::ptr_eq(&self.track, &other.track)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.track.id())
            .field("kind", &self.track.kind())
            .finish()
    }
}

/// Coarse connectivity state reported by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Degraded,
    Disconnected,
    Failed,
    Closed,
}

/// Asynchronous notifications from a transport session. Every event is
/// tagged with the session id it originated from before it reaches the
/// manager, so stale sessions cannot resurrect themselves.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A remote media track arrived. The first one becomes the
    /// session's shared stream handle.
    Track(StreamHandle),
    /// The transport's connectivity changed.
    PeerState(PeerState),
}

/// One low-level transport session (offer/answer plus candidate
/// discovery). Mirrors the handful of operations the negotiation flow
/// actually needs; everything else stays behind the implementation.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Build the local offer and install it as the local description.
    async fn create_offer(&self) -> Result<(), TransportError>;

    /// Wait until local candidate discovery reports complete, bounded
    /// by `timeout`. Returns false on timeout; on some networks
    /// discovery never naturally completes, so timing out is not an
    /// error and negotiation proceeds with whatever was gathered.
    async fn wait_for_candidates(&self, timeout: Duration) -> bool;

    /// The current local description, including gathered candidates.
    async fn local_description(&self) -> Option<String>;

    /// Apply the remote answer received from the endpoint.
    async fn set_remote_answer(&self, sdp: String) -> Result<(), TransportError>;

    /// Candidate strings discovered so far.
    fn candidates(&self) -> Vec<String>;

    async fn close(&self);
}

/// Builds transport sessions. The factory wires every asynchronous
/// transport callback into `events`, tagged with `session`.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        stun_urls: &[String],
        session: Uuid,
        events: mpsc::UnboundedSender<(Uuid, TransportEvent)>,
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTrack;

    impl MediaTrack for FakeTrack {
        fn id(&self) -> String {
            "cam0-video".to_string()
        }
        fn kind(&self) -> TrackKind {
            TrackKind::Video
        }
    }

    #[test]
    fn handle_clones_share_identity() {
        let handle = StreamHandle::new(Arc::new(FakeTrack));
        let clone = handle.clone();
        assert!(handle.same_track(&clone));
        assert_eq!(clone.id(), "cam0-video");
        assert_eq!(clone.kind(), TrackKind::Video);
    }

    #[test]
    fn distinct_tracks_are_not_identical() {
        let a = StreamHandle::new(Arc::new(FakeTrack));
        let b = StreamHandle::new(Arc::new(FakeTrack));
        assert!(!a.same_track(&b));
    }
}
