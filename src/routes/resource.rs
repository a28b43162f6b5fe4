//! Resource routes: a fallback handler that hands every request to the controller whose
//! endpoint can process it, on a connection of its own.

use crate::controller::{operation_for, route, ResourceRequest, ResourceResponse};
use crate::error::AppError;
use crate::locator::ResourceLocator;
use crate::sql::PgDriver;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

fn parse_body(bytes: &Bytes) -> Result<Option<Value>, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

async fn serve(state: &AppState, req: &ResourceRequest) -> Result<ResourceResponse, AppError> {
    let controller = route(&state.controllers, req)
        .ok_or_else(|| AppError::NotFound(format!("no resource at {}", req.endpoint)))?;
    let has_identifier = ResourceLocator::parse(&req.endpoint).identifier().is_some();
    if operation_for(&req.method, has_identifier).is_none() {
        tracing::debug!(method = %req.method, endpoint = %req.endpoint, "unhandled request");
        return Ok(ResourceResponse::unhandled(&req.method, has_identifier));
    }

    let mut driver = PgDriver::acquire(&state.pool).await?;
    Ok(controller
        .process(req, &mut driver)
        .await
        .unwrap_or_else(|| ResourceResponse::unhandled(&req.method, has_identifier)))
}

async fn handle(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let req = ResourceRequest {
        endpoint: uri.path().to_string(),
        method,
        query,
        headers,
        body,
    };
    match serve(&state, &req).await {
        Ok(resp) => resp.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Every declared resource under `/<name>` and `/<name>/<id>`.
pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .fallback(handle)
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
        .with_state(state)
}
