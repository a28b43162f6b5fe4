mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::graph;
use restmap_sdk::{common_routes, resource_routes, AppState, Settings};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

fn app() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/restmap_test")
        .unwrap();
    let state = AppState::new(pool, (*graph()).clone(), Settings::default());
    common_routes().merge(resource_routes(state))
}

async fn call(method: &str, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = call("GET", "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let (status, body) = call("GET", "/ghosts", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = call("GET", "/stocks/1/product", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn write_without_identifier_is_bad_request() {
    let (status, body) = call("PUT", "/stocks", r#"{"quantity": 1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn unsupported_method_is_not_allowed() {
    let (status, _) = call("OPTIONS", "/stocks/1", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (status, body) = call("POST", "/stocks", "{").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}
