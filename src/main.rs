use axum::Router;
use tracing::{info, Level};

mod models;
mod routes;
mod state;
mod utils;

use crate::state::app_state::AppState;
use crate::utils::conf_helper::{get_cached_config, init_config_and_bind, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // === CONFIG + LISTENER ===
    let listener = init_config_and_bind(&config_path).await?;
    let config = get_cached_config().ok_or_else(|| anyhow::anyhow!("config not initialized"))?;

    info!(
        "Server initialized on {}:{}",
        config.connection.ip, config.connection.port
    );

    let state = AppState::new(config.resampler.clone());
    let app = Router::new()
        .merge(routes::info_routes::health_routes())
        .merge(routes::data_routes::data_routes(state));

    axum::serve(listener, app).await?;
    Ok(())
}
