use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::state::app_state::{AppState, RunRecord, RunStatus};
use frame_ds::core::format::{ChannelDescriptor, ChunkHeader};
use frame_ds::{
    list_channels, ChunkReader, DownsamplingPipeline, FrameError, FrameIndex, FsSource, Manifest,
    ResamplerConfig,
};

#[derive(Deserialize, Debug)]
pub struct ChannelsRequest {
    pub manifest: PathBuf,
    pub start: f64,
    pub stop: f64,
    /// Defaults to `start`
    pub instant: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct DownsampleRequest {
    pub manifest: PathBuf,
    pub start: f64,
    pub stop: f64,
    pub target_rate: Option<f64>,
    pub method: Option<String>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Serialize, Debug)]
pub struct RunAccepted {
    pub id: Uuid,
}

#[derive(Serialize, Debug)]
pub struct ChunkListing {
    pub name: String,
    pub header: ChunkHeader,
    pub channels: Vec<String>,
    pub datasets: Vec<String>,
}

/// =======================
/// ROUTER
/// =======================

pub fn data_routes(state: AppState) -> Router {
    Router::new()
        .route("/channels", post(channels))
        .route("/downsample", post(downsample))
        .route("/runs", get(list_runs))
        .route("/runs/{id}", get(get_run))
        .route("/chunks/{name}", get(chunk_listing))
        .with_state(state)
}

fn error_response(e: &FrameError) -> Response {
    let status = match e {
        FrameError::ParseError { .. }
        | FrameError::InvalidConfig(_)
        | FrameError::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
        FrameError::EmptyArchive { .. }
        | FrameError::NoCoverage(_)
        | FrameError::ChannelNotFound { .. }
        | FrameError::DatasetNotFound(_) => StatusCode::NOT_FOUND,
        FrameError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

fn load_index(manifest: &std::path::Path, start: f64, stop: f64) -> frame_ds::Result<FrameIndex> {
    let manifest = Manifest::load(manifest)?;
    FrameIndex::build(&manifest, start, stop)
}

/// =======================
/// HANDLERS
/// =======================

async fn channels(Json(request): Json<ChannelsRequest>) -> Response {
    debug!("Listing channels: {:?}", request);

    let result = tokio::task::spawn_blocking(move || -> frame_ds::Result<Vec<ChannelDescriptor>> {
        let index = load_index(&request.manifest, request.start, request.stop)?;
        let source = FsSource::for_manifest(&request.manifest);
        list_channels(&index, &source, request.instant.unwrap_or(request.start))
    })
    .await;

    match result {
        Ok(Ok(channels)) => Json(channels).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!("Channel listing task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn downsample(
    State(state): State<AppState>,
    Json(request): Json<DownsampleRequest>,
) -> Response {
    let mut config: ResamplerConfig = (*state.defaults).clone();
    if let Some(rate) = request.target_rate {
        config.target_rate = rate;
    }
    if let Some(method) = request.method {
        config.method = method;
    }
    if let Some(dir) = request.output_dir {
        config.output_dir = dir;
    }
    if let Err(e) = config.validate() {
        return error_response(&e);
    }

    let id = Uuid::new_v4();
    state.runs.write().await.insert(
        id,
        RunRecord {
            id,
            manifest: request.manifest.clone(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
        },
    );
    info!(
        "Run {} accepted: {} [{}, {})",
        id,
        request.manifest.display(),
        request.start,
        request.stop
    );

    let manifest = request.manifest;
    let (start, stop) = (request.start, request.stop);
    tokio::spawn(async move {
        let job = tokio::task::spawn_blocking(move || {
            let index = load_index(&manifest, start, stop)?;
            let pipeline = DownsamplingPipeline::new(FsSource::for_manifest(&manifest), config)?;
            pipeline.run(&index)
        });

        let status = match job.await {
            Ok(Ok(report)) => RunStatus::Finished { report },
            Ok(Err(e)) => RunStatus::Failed {
                error: e.to_string(),
            },
            Err(e) => RunStatus::Failed {
                error: format!("run task failed: {e}"),
            },
        };
        if let RunStatus::Failed { error } = &status {
            error!("Run {} failed: {}", id, error);
        }
        state.finish(id, status).await;
    });

    (StatusCode::ACCEPTED, Json(RunAccepted { id })).into_response()
}

async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunRecord>> {
    let mut runs: Vec<RunRecord> = state.runs.read().await.values().cloned().collect();
    runs.sort_by_key(|r| r.started_at);
    Json(runs)
}

async fn get_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.runs.read().await.get(&id) {
        Some(record) => Json(record.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn chunk_listing(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let path = state.defaults.output_dir.join(&name);

    let result = tokio::task::spawn_blocking(move || -> frame_ds::Result<ChunkListing> {
        let chunk = ChunkReader::open(&path)?;
        Ok(ChunkListing {
            name,
            header: chunk.header().clone(),
            channels: chunk.channels()?,
            datasets: chunk.dataset_names().into_iter().map(str::to_owned).collect(),
        })
    })
    .await;

    match result {
        Ok(Ok(listing)) => Json(listing).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!("Chunk listing task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
