//! Headless viewer: resolves a camera's negotiation endpoint, connects
//! through the shared stream manager, and logs every status update
//! until ctrl-c. Useful for soak-testing camera endpoints without the
//! dashboard in front.

mod cli;
mod registry;

use anyhow::Context;
use farmsight_stream::{ConnectionManager, ConnectionState, StreamConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::parse_args()?;

    let mut config: StreamConfig = match &args.config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {path}"))?;
            toml::from_str(&raw).with_context(|| format!("Failed to parse config file {path}"))?
        }
        None => StreamConfig::default(),
    };
    if !args.stun_urls.is_empty() {
        config.stun_urls = args.stun_urls.clone();
    }

    if let Err(issues) = config.validate() {
        let mut fatal = false;
        for issue in &issues {
            if issue.starts_with("ERROR:") {
                error!("{issue}");
                fatal = true;
            } else {
                warn!("{issue}");
            }
        }
        if fatal {
            anyhow::bail!("Invalid stream configuration");
        }
    }

    let endpoint = match &args.endpoint {
        Some(endpoint) => endpoint.clone(),
        None => {
            let registry_url = args
                .registry_url
                .as_deref()
                .context("--registry-url is required without --endpoint")?;
            let camera_id = args
                .camera_id
                .as_deref()
                .context("--camera-id is required without --endpoint")?;
            let camera = registry::fetch_camera(registry_url, camera_id).await?;
            if !camera.online {
                warn!(camera = %camera.name, "Registry reports the camera offline, trying anyway");
            }
            info!(camera = %camera.name, id = %camera.id, "Resolved camera via registry");
            camera.stream_url
        }
    };

    let manager = ConnectionManager::new(config);
    let subscription = manager.subscribe(|update| match update.state {
        ConnectionState::Connected => {
            if let Some(handle) = &update.handle {
                info!(track = %handle.id(), kind = ?handle.kind(), "Stream connected");
            }
        }
        ConnectionState::Error => {
            if let Some(error) = &update.error {
                warn!(%error, "Stream error, reconnection pending");
            }
        }
        state => info!(?state, "Stream state changed"),
    });

    info!(%endpoint, "Connecting");
    manager.connect(&endpoint);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutting down");
    manager.unsubscribe(subscription);
    manager.disconnect();
    Ok(())
}
