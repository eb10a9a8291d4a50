use frame_ds::ResamplerConfig;
use serde::{Deserialize, Serialize};

/// Contents of `service.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub connection: Connection,
    /// Defaults for runs; requests may override rate, method and output dir
    pub resampler: ResamplerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub ip: String,
    /// 0 picks a free port
    pub port: u16,
}
