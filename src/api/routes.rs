//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::scheduler::cron;

const MAX_UPCOMING: usize = 50;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/cron/initialize", post(initialize))
        .route("/cron/status", get(status))
        .route("/cron/toggle", post(toggle))
        .route("/cron/run-now", post(run_now))
        .route("/cron/last-result", get(last_result))
        .route("/cron/upcoming", get(upcoming))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn initialize(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let registered = state.bridge.initialize();
    let code = if registered {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(json!({ "data": { "registered": registered }, "meta": meta() })))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let status = state.bridge.check_status().await;
    Json(json!({ "data": status, "meta": meta() }))
}

#[derive(Debug, Deserialize)]
struct ToggleBody {
    enabled: bool,
}

async fn toggle(
    State(state): State<AppState>,
    Json(body): Json<ToggleBody>,
) -> (StatusCode, Json<Value>) {
    let applied = state.bridge.toggle(body.enabled).await;
    if applied {
        (
            StatusCode::OK,
            Json(json!({
                "data": { "requested": body.enabled, "applied": true },
                "meta": meta()
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "data": { "requested": body.enabled, "applied": false },
                "meta": { "message": "scheduler worker did not acknowledge" }
            })),
        )
    }
}

async fn run_now(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let started = state.bridge.run_now().await;
    if started {
        (
            StatusCode::ACCEPTED,
            Json(json!({ "data": { "started": true }, "meta": meta() })),
        )
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({
                "data": { "started": false },
                "meta": { "message": "worker inactive or a dispatch is already running" }
            })),
        )
    }
}

async fn last_result(State(state): State<AppState>) -> Json<Value> {
    match state.bridge.last_result() {
        Some(result) => Json(json!({ "data": result, "meta": meta() })),
        None => Json(json!({ "data": null, "meta": { "message": "no execution results yet" } })),
    }
}

#[derive(Debug, Deserialize)]
struct UpcomingQuery {
    count: Option<usize>,
}

async fn upcoming(State(state): State<AppState>, Query(q): Query<UpcomingQuery>) -> Json<Value> {
    let count = q.count.unwrap_or(5).min(MAX_UPCOMING);
    let runs: Vec<String> = cron::upcoming(&state.task, state.clock.now(), None, count)
        .into_iter()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
        .collect();
    let total = runs.len();
    Json(json!({
        "data": { "upcoming": runs },
        "meta": { "total": total, "expression": cron::cron_expression(&state.task) }
    }))
}
