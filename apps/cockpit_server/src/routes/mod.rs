mod agents;
mod credentials;
mod inventories;
mod jobs;
mod logs;
mod nautobot;

use crate::auth;
use crate::rbac::auth_middleware;
use crate::state::AppState;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/jobs/start", post(jobs::start))
        .route("/jobs", get(jobs::recent))
        .route("/jobs/:id", get(jobs::get))
        .route("/jobs/:id/results", get(jobs::results))
        .route("/jobs/:id/cancel", post(jobs::cancel))
        .route("/api/nb2cmk/start", post(jobs::nb2cmk_start))
        .route("/api/nb2cmk/active", get(jobs::nb2cmk_active))
        .route("/api/nb2cmk/jobs/:id", get(jobs::nb2cmk_status))
        .route("/api/nb2cmk/jobs/:id/results", get(jobs::nb2cmk_results))
        .route("/api/cockpit-agent/agents", get(agents::list))
        .route("/api/cockpit-agent/command", post(agents::command))
        .route("/api/cockpit-agent/git-pull", post(agents::git_pull))
        .route("/api/cockpit-agent/docker-restart", post(agents::docker_restart))
        .route("/api/cockpit-agent/history", get(agents::all_history))
        .route("/api/cockpit-agent/history/:agent_id", get(agents::history))
        .route("/api/logs", get(logs::list))
        .route("/api/nautobot/devices", get(nautobot::devices))
        .route("/api/nautobot/devices/:id/offboard", post(nautobot::offboard))
        .route("/api/credentials", get(credentials::list).post(credentials::create))
        .route(
            "/api/credentials/:id",
            get(credentials::get)
                .put(credentials::update)
                .delete(credentials::remove),
        )
        .route("/api/templates", get(jobs::list_templates).post(jobs::create_template))
        .route("/api/templates/:id", delete(jobs::delete_template))
        .route("/api/inventories", get(inventories::list).post(inventories::create))
        .route(
            "/api/inventories/:id",
            axum::routing::put(inventories::update).delete(inventories::remove),
        )
        .route("/api/inventories/preview", post(inventories::preview))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/api-key-login", post(auth::api_key_login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
