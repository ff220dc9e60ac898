//! Shared camera-stream connections for the farm dashboard.
//!
//! Each camera gets one [`ConnectionManager`]: it negotiates a
//! receive-only media session against the camera's HTTP endpoint,
//! reconnects with exponential backoff when anything fails, and fans
//! one shared [`StreamHandle`] out to every subscribed viewer. Ten
//! tiles showing the same camera cost one session, not ten.

pub mod backoff;
pub mod config;
pub mod distributor;
pub mod error;
pub mod manager;
pub mod peer;
pub mod signaling;
pub mod transport;

pub use config::StreamConfig;
pub use distributor::{ConnectionState, StreamUpdate, SubscriptionId};
pub use error::{SignalingError, StreamError, TransportError};
pub use manager::ConnectionManager;
pub use transport::{StreamHandle, TrackKind};
