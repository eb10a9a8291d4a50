use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use chrono::{DateTime, Utc};
use frame_ds::{ResamplerConfig, RunReport};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished { report: RunReport },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub manifest: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
    /// Base config every run request starts from
    pub defaults: Arc<ResamplerConfig>,
}

impl AppState {
    pub fn new(defaults: ResamplerConfig) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            defaults: Arc::new(defaults),
        }
    }

    pub async fn finish(&self, id: Uuid, status: RunStatus) {
        if let Some(record) = self.runs.write().await.get_mut(&id) {
            record.finished_at = Some(Utc::now());
            record.status = status;
        }
    }
}
