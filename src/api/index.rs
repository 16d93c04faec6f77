use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::corpus::{read_policies, PolicyCorpus};
use crate::models::{BuildStatus, Policy};
use crate::search::vector::IndexInfo;
use crate::state::AppState;

/// Build request: inline policies, or a JSON/JSONL file on the server.
#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    #[serde(default)]
    pub policies: Option<Vec<Policy>>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct IndexStatusResponse {
    pub loaded: bool,
    pub info: Option<IndexInfo>,
    pub chunks: usize,
    pub policies: usize,
    pub build: BuildStatus,
}

/// GET /api/index - Loaded index description and last build status
pub async fn index_status(State(state): State<AppState>) -> Json<IndexStatusResponse> {
    let corpus = state.current_corpus();
    Json(IndexStatusResponse {
        loaded: corpus.is_some(),
        info: corpus.as_ref().map(|c| c.info().clone()),
        chunks: corpus.as_ref().map_or(0, |c| c.chunk_count()),
        policies: corpus.as_ref().map_or(0, |c| c.policy_count()),
        build: state.build_status.read().clone(),
    })
}

/// POST /api/index - Rebuild the index in the background
pub async fn build_index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<(StatusCode, Json<BuildStatus>), (StatusCode, String)> {
    let policies = match (req.policies, req.path) {
        (Some(policies), None) => policies,
        (None, Some(path)) => {
            tokio::task::spawn_blocking(move || read_policies(&path))
                .await
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read task failed: {e}")))?
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("{e:#}")))?
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Provide exactly one of 'policies' or 'path'".to_string(),
            ))
        }
    };
    if policies.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No policies to index".to_string()));
    }

    // Only one build at a time; a second request is rejected, not queued
    let permit = state
        .build_semaphore
        .clone()
        .try_acquire_owned()
        .map_err(|_| {
            (
                StatusCode::CONFLICT,
                "An index build is already running".to_string(),
            )
        })?;

    let status = BuildStatus::Building {
        started_at: chrono::Utc::now(),
        policies: policies.len(),
    };
    *state.build_status.write() = status.clone();

    tokio::spawn(async move {
        let _permit = permit;
        let status = match run_build(&state, &policies).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Index build failed: {e:#}");
                BuildStatus::Failed {
                    finished_at: chrono::Utc::now(),
                    error: format!("{e:#}"),
                }
            }
        };
        *state.build_status.write() = status;
    });

    Ok((StatusCode::ACCEPTED, Json(status)))
}

async fn run_build(state: &AppState, policies: &[Policy]) -> anyhow::Result<BuildStatus> {
    let (corpus, report) = PolicyCorpus::build(policies, &state.config, &state.http_client).await?;

    let corpus = Arc::new(corpus);
    let index_dir = state.config.index_dir();
    let to_save = corpus.clone();
    tokio::task::spawn_blocking(move || to_save.save(&index_dir)).await??;

    *state.corpus.write() = Some(corpus);
    tracing::info!(
        "Index ready: {} chunks from {} policies",
        report.chunks,
        report.policies
    );

    Ok(BuildStatus::Ready {
        finished_at: chrono::Utc::now(),
        report,
    })
}
