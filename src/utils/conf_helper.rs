use anyhow::{anyhow, Context};
use std::sync::OnceLock;
use tokio::fs;
use tokio::net::TcpListener;
use tracing::info;

use crate::models::extension_model::ServiceConfig;

static CONFIG_CACHE: OnceLock<ServiceConfig> = OnceLock::new();

pub const DEFAULT_CONFIG_PATH: &str = "service.json";

/// Loads the service config once and opens its listening socket.
pub async fn init_config_and_bind(file_path: &str) -> anyhow::Result<TcpListener> {
    let data = fs::read_to_string(file_path)
        .await
        .with_context(|| format!("reading {file_path}"))?;

    let mut config: ServiceConfig =
        serde_json::from_str(&data).with_context(|| format!("parsing {file_path}"))?;
    config.resampler.validate()?;

    let bind_addr = format!("{}:{}", config.connection.ip, config.connection.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;

    // port 0 resolves to whatever the OS handed out
    config.connection.port = listener.local_addr()?.port();
    info!("Config initialized on port {}", config.connection.port);

    CONFIG_CACHE
        .set(config)
        .map_err(|_| anyhow!("config already initialized"))?;

    Ok(listener)
}

pub fn get_cached_config() -> Option<&'static ServiceConfig> {
    CONFIG_CACHE.get()
}
