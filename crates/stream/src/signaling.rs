//! One WHEP-style negotiation exchange: offer out over HTTP POST,
//! answer back in the response body. No retry logic lives here — the
//! connection manager owns attempt counting and backoff.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::StreamConfig;
use crate::error::{SignalingError, StreamError, TransportError};
use crate::transport::TransportSession;

use std::time::Duration;

/// The descriptions a successful exchange produced.
#[derive(Debug, Clone)]
pub struct NegotiatedOffer {
    pub local_sdp: String,
    pub remote_sdp: String,
}

/// Seam between the connection manager and the signaling exchange so
/// the manager's state machine can be tested without HTTP.
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(
        &self,
        endpoint: &str,
        transport: &dyn TransportSession,
    ) -> Result<NegotiatedOffer, StreamError>;
}

#[derive(Clone)]
pub struct SignalingClient {
    http: reqwest::Client,
    gather_timeout: Duration,
    request_timeout: Duration,
}

impl SignalingClient {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            gather_timeout: config.gather_timeout(),
            request_timeout: config.request_timeout(),
        }
    }
}

#[async_trait]
impl Negotiator for SignalingClient {
    /// Build the local offer, wait (bounded) for candidate discovery,
    /// POST the offer as `application/sdp`, and apply the raw-SDP
    /// answer from the response body.
    async fn negotiate(
        &self,
        endpoint: &str,
        transport: &dyn TransportSession,
    ) -> Result<NegotiatedOffer, StreamError> {
        transport
            .create_offer()
            .await
            .map_err(StreamError::Transport)?;

        if !transport.wait_for_candidates(self.gather_timeout).await {
            debug!(
                timeout_secs = self.gather_timeout.as_secs(),
                "Candidate discovery did not complete in time, proceeding with partial candidates"
            );
        }

        let local_sdp = transport.local_description().await.ok_or_else(|| {
            StreamError::Transport(TransportError::Failed(
                "transport produced no local description".to_string(),
            ))
        })?;

        let response = self
            .http
            .post(endpoint)
            .timeout(self.request_timeout)
            .header(CONTENT_TYPE, "application/sdp")
            .body(local_sdp.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StreamError::Signaling(SignalingError::Timeout)
                } else {
                    StreamError::Signaling(SignalingError::Unreachable(e.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Signaling(SignalingError::ServerRejected(
                status.as_u16(),
            )));
        }

        // The body is the remote description as raw text, not JSON.
        let remote_sdp = response
            .text()
            .await
            .map_err(|e| StreamError::Signaling(SignalingError::Unreachable(e.to_string())))?;

        transport
            .set_remote_answer(remote_sdp.clone())
            .await
            .map_err(|e| StreamError::Signaling(SignalingError::InvalidAnswer(e.to_string())))?;

        debug!(endpoint, "Negotiation exchange complete");
        Ok(NegotiatedOffer {
            local_sdp,
            remote_sdp,
        })
    }
}
