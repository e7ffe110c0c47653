//! HTTP API surface.
//!
//! JSON in and out on every route; internal failures come back as a
//! `500 text/plain` error line. CORS is wide open so a local frontend can
//! talk to the daemon from any origin.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::checker::CheckerRegistry;
use crate::logging::LogQuery;
use crate::scheduler::Scheduler;
use crate::services::aur::AurService;
use crate::services::package::PackageService;
use crate::services::upstream::UpstreamService;

#[derive(Clone)]
pub struct AppState {
    pub packages: Arc<PackageService>,
    pub aur: Arc<AurService>,
    pub upstream: Arc<UpstreamService>,
    pub scheduler: Arc<Scheduler>,
    pub registry: Arc<CheckerRegistry>,
    pub logs: Arc<LogQuery>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/packages",
            get(handlers::list_packages).post(handlers::create_package),
        )
        .route(
            "/api/packages/:id",
            get(handlers::get_package)
                .put(handlers::update_package)
                .delete(handlers::delete_package),
        )
        .route("/api/aur/check/all", post(handlers::check_aur_all))
        .route("/api/aur/check/:id", post(handlers::check_aur_one))
        .route("/api/upstream/check/all", post(handlers::check_upstream_all))
        .route("/api/upstream/check/:id", post(handlers::check_upstream_one))
        .route("/api/upstream/checkers", get(handlers::list_checkers))
        .route("/api/timer/status", get(handlers::timer_status))
        .route("/api/timer/start", post(handlers::timer_start))
        .route("/api/timer/stop", post(handlers::timer_stop))
        .route("/api/logs", get(handlers::query_logs))
        .route("/api/logs/latest", get(handlers::latest_logs))
        .route("/api/logs/clear", post(handlers::clear_logs))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState, listen_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    tracing::info!(address = %listener.local_addr()?, "http server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
