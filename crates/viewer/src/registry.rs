//! Thin client for the farm's camera registry. The registry owns
//! camera metadata; this binary only needs the negotiation endpoint.

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CameraRecord {
    pub id: String,
    pub name: String,
    /// The camera's negotiation endpoint URL.
    pub stream_url: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub online: bool,
}

pub(crate) async fn fetch_camera(base_url: &str, camera_id: &str) -> anyhow::Result<CameraRecord> {
    let url = format!(
        "{}/api/cameras/{camera_id}",
        base_url.trim_end_matches('/')
    );
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach camera registry at {url}"))?;
    anyhow::ensure!(
        response.status().is_success(),
        "Registry returned HTTP {} for camera '{camera_id}'",
        response.status()
    );
    response
        .json::<CameraRecord>()
        .await
        .with_context(|| format!("Registry returned an invalid record for camera '{camera_id}'"))
}
