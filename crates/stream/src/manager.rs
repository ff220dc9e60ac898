//! The shared connection manager: one negotiation at a time, one live
//! session at most, and one stream handle fanned out to every viewer.
//!
//! All transport callbacks, signaling results, and timer fires funnel
//! through a single event loop, so state transitions are serialized
//! and every event is checked against the current session identity
//! before it is allowed to act. A late callback from a torn-down
//! session is discarded instead of resurrecting it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::{RetryTimer, retry_delay};
use crate::config::StreamConfig;
use crate::distributor::{ConnectionState, StreamDistributor, StreamUpdate, SubscriptionId};
use crate::error::{StreamError, TransportError};
use crate::peer::WebRtcFactory;
use crate::signaling::{NegotiatedOffer, Negotiator, SignalingClient};
use crate::transport::{
    PeerState, StreamHandle, TransportEvent, TransportFactory, TransportSession,
};

/// External commands from the manager handle. The driver loop ends
/// when every handle is gone.
enum Command {
    Connect { endpoint: String },
    Reconnect,
    Disconnect,
    SubscriberJoined,
    AllSubscribersGone,
}

/// Self-generated events: negotiation results and timer fires.
enum InternalEvent {
    Negotiated {
        session: Uuid,
        result: Result<NegotiatedSession, StreamError>,
    },
    RetryFired,
    LingerFired,
}

struct NegotiatedSession {
    transport: Arc<dyn TransportSession>,
    offer: NegotiatedOffer,
}

/// One active or in-progress session.
struct Session {
    id: Uuid,
    transport: Arc<dyn TransportSession>,
    local_sdp: String,
    remote_sdp: String,
    candidates: Vec<String>,
    handle: Option<StreamHandle>,
}

/// Handle to a per-camera connection manager.
///
/// Viewers only ever need `subscribe`/`unsubscribe`, `reconnect` and
/// `state`; SDP, candidates and timers stay behind this surface.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    distributor: Arc<StreamDistributor>,
}

impl ConnectionManager {
    /// Manager with the production WebRTC transport and HTTP signaling.
    pub fn new(config: StreamConfig) -> Self {
        let negotiator = Arc::new(SignalingClient::new(&config));
        Self::with_parts(config, Arc::new(WebRtcFactory), negotiator)
    }

    /// Seam for tests and alternative transports.
    pub fn with_parts(
        config: StreamConfig,
        factory: Arc<dyn TransportFactory>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let distributor = Arc::new(StreamDistributor::new());

        let driver = Driver {
            config,
            factory,
            negotiator,
            distributor: Arc::clone(&distributor),
            internal_tx,
            transport_tx,
            state: ConnectionState::Idle,
            endpoint: None,
            attempt_id: None,
            session: None,
            pending_track: None,
            attempts: 0,
            retry: None,
            linger: None,
        };
        tokio::spawn(driver.run(commands_rx, internal_rx, transport_rx));

        Self {
            commands: commands_tx,
            distributor,
        }
    }

    /// Start (or keep) a session against `endpoint`. A call while
    /// already connecting or connected to the same endpoint is a
    /// no-op; callers wanting to observe the in-flight attempt should
    /// subscribe instead.
    pub fn connect(&self, endpoint: &str) {
        let _ = self.commands.send(Command::Connect {
            endpoint: endpoint.to_string(),
        });
    }

    /// User-initiated retry: resets the attempt counter and connects
    /// immediately, bypassing any pending backoff.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Tear everything down and enter the terminal `Closed` state.
    /// Cancels any pending retry; nothing leaves `Closed`.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Register a viewer callback. The current state and handle are
    /// replayed to it immediately, so a viewer mounting mid-flight
    /// never misses the state it joined in. Callbacks run without any
    /// manager lock held and may call back into the manager.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StreamUpdate) + Send + Sync + 'static,
    {
        let id = self.distributor.subscribe(Arc::new(callback));
        let _ = self.commands.send(Command::SubscriberJoined);
        id
    }

    /// Remove a viewer. When the last one leaves, the idle-linger
    /// policy decides whether (and when) to tear the session down.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.distributor.unsubscribe(id);
        if removed && self.distributor.subscriber_count() == 0 {
            let _ = self.commands.send(Command::AllSubscribersGone);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.distributor.current().state
    }
}

struct Driver {
    config: StreamConfig,
    factory: Arc<dyn TransportFactory>,
    negotiator: Arc<dyn Negotiator>,
    distributor: Arc<StreamDistributor>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    transport_tx: mpsc::UnboundedSender<(Uuid, TransportEvent)>,
    state: ConnectionState,
    endpoint: Option<String>,
    /// Identity of the session currently being negotiated or served.
    /// Events carrying any other id are stale and dropped.
    attempt_id: Option<Uuid>,
    session: Option<Session>,
    /// A track that arrived before the signaling result was processed.
    pending_track: Option<StreamHandle>,
    /// Attempt count for the current failure episode; reset on connect
    /// success and on user-initiated reconnect.
    attempts: u32,
    retry: Option<RetryTimer>,
    linger: Option<RetryTimer>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<InternalEvent>,
        mut transport_events: mpsc::UnboundedReceiver<(Uuid, TransportEvent)>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    // Every manager handle is gone.
                    None => break,
                },
                Some(event) = internal.recv() => self.handle_internal(event),
                Some((id, event)) = transport_events.recv() => self.handle_transport_event(id, event),
            }
        }
        self.teardown_session("manager dropped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { endpoint } => self.start_connect(endpoint),
            Command::Reconnect => {
                if self.state == ConnectionState::Closed {
                    warn!("reconnect() after close, ignoring");
                    return;
                }
                self.attempts = 0;
                match self.endpoint.clone() {
                    Some(endpoint) => self.start_connect(endpoint),
                    None => warn!("reconnect() before any connect(), ignoring"),
                }
            }
            Command::Disconnect => self.shutdown("disconnect requested"),
            Command::SubscriberJoined => {
                if let Some(timer) = self.linger.take() {
                    timer.cancel();
                    debug!("Viewer joined during linger window, keeping session");
                }
            }
            Command::AllSubscribersGone => self.start_linger(),
        }
    }

    fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::Negotiated { session, result } => {
                self.handle_negotiated(session, result)
            }
            InternalEvent::RetryFired => {
                self.retry = None;
                if self.state != ConnectionState::Error {
                    debug!(state = ?self.state, "Retry fired outside error state, ignoring");
                    return;
                }
                if let Some(endpoint) = self.endpoint.clone() {
                    info!(attempt = self.attempts, "Retry timer fired");
                    self.start_connect(endpoint);
                }
            }
            InternalEvent::LingerFired => {
                self.linger = None;
                let viewers = self.distributor.subscriber_count();
                if viewers == 0 && self.state != ConnectionState::Closed {
                    info!("No viewer returned within the linger window");
                    self.shutdown("idle linger expired");
                }
            }
        }
    }

    fn start_connect(&mut self, endpoint: String) {
        match self.state {
            ConnectionState::Closed => {
                warn!("connect() after close, ignoring");
                return;
            }
            ConnectionState::Connecting | ConnectionState::Connected
                if self.endpoint.as_deref() == Some(endpoint.as_str()) =>
            {
                debug!(%endpoint, "Already connecting/connected to this endpoint, ignoring");
                return;
            }
            _ => {}
        }

        if let Some(timer) = self.retry.take() {
            timer.cancel();
        }
        self.teardown_session("superseded by new connect");
        self.pending_track = None;
        self.endpoint = Some(endpoint.clone());

        let id = Uuid::new_v4();
        self.attempt_id = Some(id);
        self.set_state(ConnectionState::Connecting, None, None);
        info!(%endpoint, session = %id, "Starting negotiation");

        let factory = Arc::clone(&self.factory);
        let negotiator = Arc::clone(&self.negotiator);
        let stun_urls = self.config.stun_urls.clone();
        let events = self.transport_tx.clone();
        let results = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let transport = factory
                    .create(&stun_urls, id, events)
                    .await
                    .map_err(StreamError::Transport)?;
                match negotiator.negotiate(&endpoint, transport.as_ref()).await {
                    Ok(offer) => Ok(NegotiatedSession { transport, offer }),
                    Err(e) => {
                        transport.close().await;
                        Err(e)
                    }
                }
            }
            .await;
            let _ = results.send(InternalEvent::Negotiated {
                session: id,
                result,
            });
        });
    }

    fn handle_negotiated(&mut self, session: Uuid, result: Result<NegotiatedSession, StreamError>) {
        if self.attempt_id != Some(session) || self.state == ConnectionState::Closed {
            debug!(%session, "Dropping stale negotiation result");
            if let Ok(negotiated) = result {
                let transport = negotiated.transport;
                tokio::spawn(async move { transport.close().await });
            }
            return;
        }

        match result {
            Ok(negotiated) => {
                let candidates = negotiated.transport.candidates();
                debug!(
                    %session,
                    candidate_count = candidates.len(),
                    offer_bytes = negotiated.offer.local_sdp.len(),
                    answer_bytes = negotiated.offer.remote_sdp.len(),
                    "Signaling complete, waiting for media"
                );
                self.session = Some(Session {
                    id: session,
                    transport: negotiated.transport,
                    local_sdp: negotiated.offer.local_sdp,
                    remote_sdp: negotiated.offer.remote_sdp,
                    candidates,
                    handle: None,
                });
                // The track may have raced ahead of the signaling result.
                if let Some(handle) = self.pending_track.take() {
                    self.adopt_track(handle);
                }
            }
            Err(e) => {
                warn!(%session, error = %e, "Negotiation failed");
                self.enter_error(e);
            }
        }
    }

    fn handle_transport_event(&mut self, session: Uuid, event: TransportEvent) {
        if self.attempt_id != Some(session) || self.state == ConnectionState::Closed {
            debug!(%session, "Discarding event from stale session");
            return;
        }

        match event {
            TransportEvent::Track(handle) => {
                let established = match &self.session {
                    Some(current) => current.handle.is_some(),
                    None => {
                        // The track raced ahead of the signaling result.
                        if self.pending_track.is_none() {
                            self.pending_track = Some(handle);
                        }
                        return;
                    }
                };
                if established {
                    debug!("Additional track ignored, the first track is the shared handle");
                } else {
                    self.adopt_track(handle);
                }
            }
            TransportEvent::PeerState(state) => self.handle_peer_state(state),
        }
    }

    fn handle_peer_state(&mut self, state: PeerState) {
        match state {
            PeerState::Degraded => {
                self.enter_error(StreamError::Transport(TransportError::Degraded))
            }
            PeerState::Disconnected => {
                self.enter_error(StreamError::Transport(TransportError::Disconnected))
            }
            PeerState::Failed => self.enter_error(StreamError::Transport(TransportError::Failed(
                "peer connection failed".to_string(),
            ))),
            // Connected is keyed on track arrival, not transport state.
            PeerState::New | PeerState::Connecting | PeerState::Connected | PeerState::Closed => {
                debug!(?state, "Transport connectivity changed");
            }
        }
    }

    /// First track for the current session: the session is live.
    fn adopt_track(&mut self, handle: StreamHandle) {
        if let Some(session) = self.session.as_mut() {
            session.handle = Some(handle.clone());
            info!(session = %session.id, track = %handle.id(), "Stream established");
        }
        self.attempts = 0;
        self.set_state(ConnectionState::Connected, Some(handle), None);
    }

    fn enter_error(&mut self, error: StreamError) {
        // A disconnect may have won the race before this failure was
        // processed; Closed is terminal.
        if self.state == ConnectionState::Closed {
            return;
        }
        self.teardown_session("entering error state");
        self.attempt_id = None;
        self.pending_track = None;
        self.set_state(ConnectionState::Error, None, Some(error));
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        self.attempts += 1;
        let delay = retry_delay(
            self.attempts,
            self.config.base_retry_delay(),
            self.config.max_retry_delay(),
        );
        info!(
            attempt = self.attempts,
            delay_secs = delay.as_secs(),
            "Scheduling reconnection"
        );
        let results = self.internal_tx.clone();
        // Replacing the timer drops (and thereby cancels) any prior one.
        self.retry = Some(RetryTimer::schedule(delay, move || {
            let _ = results.send(InternalEvent::RetryFired);
        }));
    }

    fn start_linger(&mut self) {
        if self.config.idle_linger_secs == 0 || self.state == ConnectionState::Closed {
            return;
        }
        debug!(
            linger_secs = self.config.idle_linger_secs,
            "Last viewer unsubscribed, starting idle linger"
        );
        let results = self.internal_tx.clone();
        self.linger = Some(RetryTimer::schedule(
            Duration::from_secs(self.config.idle_linger_secs),
            move || {
                let _ = results.send(InternalEvent::LingerFired);
            },
        ));
    }

    fn shutdown(&mut self, reason: &str) {
        if self.state == ConnectionState::Closed {
            debug!("Already closed");
            return;
        }
        if let Some(timer) = self.retry.take() {
            timer.cancel();
        }
        if let Some(timer) = self.linger.take() {
            timer.cancel();
        }
        self.teardown_session(reason);
        self.attempt_id = None;
        self.pending_track = None;
        self.set_state(ConnectionState::Closed, None, None);
        info!(reason, "Connection closed");
    }

    fn teardown_session(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            debug!(
                session = %session.id,
                candidate_count = session.candidates.len(),
                reason,
                "Closing session"
            );
            let transport = session.transport;
            tokio::spawn(async move { transport.close().await });
        }
    }

    fn set_state(
        &mut self,
        state: ConnectionState,
        handle: Option<StreamHandle>,
        error: Option<StreamError>,
    ) {
        self.state = state;
        self.distributor.publish(StreamUpdate {
            state,
            handle,
            error,
        });
    }
}
