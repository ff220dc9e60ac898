//! Production transport backed by the `webrtc` crate.
//!
//! Receive-only: the viewer never sends media, it just negotiates a
//! peer connection and waits for the camera's tracks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_remote::TrackRemote;

use crate::error::TransportError;
use crate::transport::{
    MediaTrack, PeerState, StreamHandle, TrackKind, TransportEvent, TransportFactory,
    TransportSession,
};

/// A remote camera track as exposed to viewers.
struct RemoteTrack {
    track: Arc<TrackRemote>,
}

impl MediaTrack for RemoteTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            RTPCodecType::Unspecified => TrackKind::Unknown,
        }
    }
}

pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    candidates: Arc<Mutex<Vec<String>>>,
}

/// Builds receive-only peer connections and wires their callbacks into
/// the manager's event funnel, tagged with the owning session id.
pub struct WebRtcFactory;

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn create(
        &self,
        stun_urls: &[String],
        session: Uuid,
        events: mpsc::UnboundedSender<(Uuid, TransportEvent)>,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: stun_urls.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| TransportError::Failed(e.to_string()))?,
        );

        // The camera side decides what it sends; we only receive.
        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| TransportError::Failed(e.to_string()))?;
        }

        let candidates = Arc::new(Mutex::new(Vec::new()));
        let gathered = Arc::clone(&candidates);
        peer_connection.on_ice_candidate(Box::new(move |candidate| {
            if let Some(c) = candidate {
                match c.to_json() {
                    Ok(json) => {
                        gathered
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(json.candidate);
                    }
                    Err(e) => {
                        warn!("Failed to serialize ICE candidate: {e}");
                    }
                }
            }
            Box::pin(async {})
        }));

        let track_tx = events.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let handle = StreamHandle::new(Arc::new(RemoteTrack {
                track: Arc::clone(&track),
            }));
            info!(
                %session,
                track_id = %track.id(),
                "Remote media track arrived"
            );
            let _ = track_tx.send((session, TransportEvent::Track(handle)));
            Box::pin(async {})
        }));

        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |state| {
            let mapped = match state {
                RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerState::New,
                RTCPeerConnectionState::Connecting => PeerState::Connecting,
                RTCPeerConnectionState::Connected => PeerState::Connected,
                RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
                RTCPeerConnectionState::Failed => PeerState::Failed,
                RTCPeerConnectionState::Closed => PeerState::Closed,
            };
            debug!(%session, ?state, "Peer connection state changed");
            let _ = state_tx.send((session, TransportEvent::PeerState(mapped)));
            Box::pin(async {})
        }));

        // ICE can report disconnected while the peer connection still
        // claims connected; surface that as degraded so the manager
        // can renegotiate instead of showing a frozen frame.
        let ice_tx = events;
        peer_connection.on_ice_connection_state_change(Box::new(move |state| {
            if state == RTCIceConnectionState::Disconnected {
                let _ = ice_tx.send((session, TransportEvent::PeerState(PeerState::Degraded)));
            }
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcTransport {
            peer_connection,
            candidates,
        }))
    }
}

#[async_trait]
impl TransportSession for WebRtcTransport {
    async fn create_offer(&self) -> Result<(), TransportError> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_candidates(&self, timeout: Duration) -> bool {
        let mut done = self.peer_connection.gathering_complete_promise().await;
        tokio::time::timeout(timeout, done.recv()).await.is_ok()
    }

    async fn local_description(&self) -> Option<String> {
        self.peer_connection
            .local_description()
            .await
            .map(|d| d.sdp)
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<(), TransportError> {
        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }

    fn candidates(&self) -> Vec<String> {
        self.candidates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Failed to close peer connection: {e}");
        }
    }
}
