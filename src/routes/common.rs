//! Health, readiness and version routes.

use crate::sql::{PgDriver, Query, QueryRunner};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
    resources: usize,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ping(state: &AppState) -> bool {
    let Ok(mut driver) = PgDriver::acquire(&state.pool).await else {
        return false;
    };
    QueryRunner::exec(&mut driver, &Query::raw("SELECT 1", false))
        .await
        .is_success()
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let resources = state.graph.resources.len();
    if !ping(&state).await {
        tracing::warn!("readiness check failed: database unavailable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                database: "unavailable",
                resources,
            }),
        );
    }
    (
        StatusCode::OK,
        Json(ReadyBody {
            status: "ok",
            database: "ok",
            resources,
        }),
    )
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health and GET /version; no state needed.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Adds GET /ready, which pings the database through a pooled driver.
pub fn common_routes_with_ready(state: AppState) -> Router {
    common_routes().merge(Router::new().route("/ready", get(ready)).with_state(state))
}
