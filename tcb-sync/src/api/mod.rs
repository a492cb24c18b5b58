//! HTTP trigger API
//!
//! Minimal surface: a health probe, a job listing, and a per-job trigger.
//! Jobs run to completion inside the request; a trigger for a job that is
//! already running answers 409 and does nothing.

use crate::error::ApiError;
use crate::jobs::{JobOutcome, JobRegistry};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tcb_common::config::SyncConfig;

pub struct AppState {
    pub config: SyncConfig,
    pub jobs: JobRegistry,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:name/run", post(run_job))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "jobs": state.jobs.job_names() }))
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.jobs.run(&name).await? {
        JobOutcome::Completed(report) => Ok(Json(report)),
        JobOutcome::Skipped { job } => Err(ApiError::Conflict(format!(
            "job {job} is already running; trigger skipped"
        ))),
    }
}
