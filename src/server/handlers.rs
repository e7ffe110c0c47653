//! Route handlers. Each maps a service call onto JSON, with internal
//! failures rendered as a plain-text 500 line.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::store::models::NewPackage;

use super::AppState;

fn internal_error(err: impl std::fmt::Display) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

// ----- packages -----

pub async fn list_packages(State(state): State<AppState>) -> Response {
    match state.packages.list() {
        Ok(packages) => Json(packages).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn get_package(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.packages.get(id) {
        Ok(Some(package)) => Json(package).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("package {id} not found")).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn create_package(
    State(state): State<AppState>,
    Json(new): Json<NewPackage>,
) -> Response {
    match state.packages.create(&new) {
        Ok(package) => (StatusCode::CREATED, Json(package)).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn update_package(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(new): Json<NewPackage>,
) -> Response {
    match state.packages.update(id, &new) {
        Ok(package) => Json(package).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn delete_package(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.packages.delete(id) {
        Ok(()) => Json(serde_json::json!({"deleted": id})).into_response(),
        Err(e) => internal_error(e),
    }
}

// ----- checks -----

pub async fn check_aur_one(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.aur.check_one(id).await {
        Ok(()) => Json(serde_json::json!({"checked": id})).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn check_aur_all(State(state): State<AppState>) -> Response {
    match state.aur.check_all().await {
        Ok(refreshed) => Json(serde_json::json!({"refreshed": refreshed})).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn check_upstream_one(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.upstream.check_one(id).await {
        Ok(version) => Json(serde_json::json!({"checked": id, "version": version})).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn check_upstream_all(State(state): State<AppState>) -> Response {
    match state.upstream.check_all().await {
        Ok(submitted) => Json(serde_json::json!({"submitted": submitted})).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn list_checkers(State(state): State<AppState>) -> Response {
    Json(state.registry.names()).into_response()
}

// ----- timer -----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStartBody {
    pub interval_minutes: u64,
}

pub async fn timer_status(State(state): State<AppState>) -> Response {
    Json(state.scheduler.status()).into_response()
}

pub async fn timer_start(
    State(state): State<AppState>,
    Json(body): Json<TimerStartBody>,
) -> Response {
    if body.interval_minutes == 0 {
        return (StatusCode::BAD_REQUEST, "intervalMinutes must be positive").into_response();
    }
    state.scheduler.start(body.interval_minutes);
    Json(state.scheduler.status()).into_response()
}

pub async fn timer_stop(State(state): State<AppState>) -> Response {
    state.scheduler.stop();
    Json(state.scheduler.status()).into_response()
}

// ----- logs -----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryParams {
    pub level: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    100
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestLogParams {
    pub since_time: Option<String>,
    pub level: Option<String>,
}

pub async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Response {
    let page = state
        .logs
        .query(params.level.as_deref(), params.page, params.page_size);
    Json(page).into_response()
}

pub async fn latest_logs(
    State(state): State<AppState>,
    Query(params): Query<LatestLogParams>,
) -> Response {
    let entries = state
        .logs
        .latest(params.since_time.as_deref(), params.level.as_deref());
    Json(entries).into_response()
}

pub async fn clear_logs(State(state): State<AppState>) -> Response {
    match state.logs.clear() {
        Ok(()) => Json(serde_json::json!({"cleared": true})).into_response(),
        Err(e) => internal_error(e),
    }
}
