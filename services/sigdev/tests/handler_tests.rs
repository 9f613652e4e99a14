//! End-to-end tests for the signature device handlers.
//!
//! Runs the real router against the in-memory store with `oneshot`, no
//! network involved. Each test builds its own app, so tests are independent.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use serde_json::json;
use sigdev::{DeviceManager, MemoryDeviceStore};
use sigdev_service::handlers::{AppState, DeviceResponse, ErrorResponse, SignResponse};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

fn test_app() -> Router {
    let state = Arc::new(AppState {
        manager: DeviceManager::new(MemoryDeviceStore::new()),
        shutdown: CancellationToken::new(),
    });
    sigdev_service::create_router(state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn create_device(app: &Router, body: serde_json::Value) -> DeviceResponse {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v0/devices", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

async fn sign(app: &Router, id: Uuid, data: &str) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v0/devices/{}/sign", id),
            json!({ "data": data }),
        ))
        .await
        .unwrap()
}

// ==================== Health Check ====================

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ==================== Device Lifecycle ====================

#[tokio::test]
async fn test_create_device() {
    let app = test_app();

    let device = create_device(
        &app,
        json!({ "signing_algorithm": "ECC", "label": "till-3" }),
    )
    .await;

    assert_eq!(device.signature_counter, 0);
    assert_eq!(device.label.as_deref(), Some("till-3"));
    assert!(device.public_key.starts_with("-----BEGIN PUBLIC KEY-----"));
}

#[tokio::test]
async fn test_create_device_with_explicit_id() {
    let app = test_app();
    let id = Uuid::new_v4();

    let device = create_device(
        &app,
        json!({ "id": id, "signing_algorithm": "ECC" }),
    )
    .await;
    assert_eq!(device.id, id);

    // Second create with the same id conflicts.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v0/devices",
            json!({ "id": id, "signing_algorithm": "ECC" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let error: ErrorResponse = read_json(response).await;
    assert!(error.error.contains(&id.to_string()));
}

#[tokio::test]
async fn test_create_device_rejects_unknown_algorithm() {
    let app = test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v0/devices",
            json!({ "signing_algorithm": "DSA" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_get_device() {
    let app = test_app();
    let created = create_device(&app, json!({ "signing_algorithm": "ECC" })).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/v0/devices/{}", created.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fetched: DeviceResponse = read_json(response).await;
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.public_key, created.public_key);
}

#[tokio::test]
async fn test_get_missing_device() {
    let app = test_app();

    let response = app
        .oneshot(get_request(&format!("/api/v0/devices/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_invalid_uuid() {
    let app = test_app();

    let response = app
        .oneshot(get_request("/api/v0/devices/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_devices_with_pagination() {
    let app = test_app();
    for _ in 0..3 {
        create_device(&app, json!({ "signing_algorithm": "ECC" })).await;
    }

    let response = app
        .clone()
        .oneshot(get_request("/api/v0/devices"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let all: Vec<DeviceResponse> = read_json(response).await;
    assert_eq!(all.len(), 3);

    let response = app
        .clone()
        .oneshot(get_request("/api/v0/devices?limit=2&offset=2"))
        .await
        .unwrap();
    let page: Vec<DeviceResponse> = read_json(response).await;
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn test_delete_device_is_idempotent() {
    let app = test_app();
    let created = create_device(&app, json!({ "signing_algorithm": "ECC" })).await;

    let delete = |id: Uuid| {
        let app = app.clone();
        async move {
            app.oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v0/devices/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
        }
    };

    let response = delete(created.id).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/v0/devices/{}", created.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Deleting again is still a success.
    let response = delete(created.id).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ==================== Signing ====================

#[tokio::test]
async fn test_sign_chains_signatures() {
    let app = test_app();
    let device = create_device(&app, json!({ "signing_algorithm": "ECC" })).await;

    // First signature: chain link is the base64 of the raw device id bytes.
    let response = sign(&app, device.id, "first payload").await;
    assert_eq!(response.status(), StatusCode::OK);
    let first: SignResponse = read_json(response).await;

    let expected_link = STANDARD.encode(device.id.as_bytes());
    assert_eq!(
        first.signed_data,
        format!("1_{}_first payload", expected_link)
    );

    // Second signature: chain link is the first signature.
    let response = sign(&app, device.id, "second payload").await;
    assert_eq!(response.status(), StatusCode::OK);
    let second: SignResponse = read_json(response).await;
    assert_eq!(
        second.signed_data,
        format!("2_{}_second payload", first.signature)
    );
    assert_ne!(second.signature, first.signature);

    // The stored counter reflects both signatures.
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/v0/devices/{}", device.id)))
        .await
        .unwrap();
    let fetched: DeviceResponse = read_json(response).await;
    assert_eq!(fetched.signature_counter, 2);
}

#[tokio::test]
async fn test_sign_empty_data_is_no_content() {
    let app = test_app();
    let device = create_device(&app, json!({ "signing_algorithm": "ECC" })).await;

    let response = sign(&app, device.id, "").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/v0/devices/{}", device.id)))
        .await
        .unwrap();
    let fetched: DeviceResponse = read_json(response).await;
    assert_eq!(fetched.signature_counter, 0);
}

#[tokio::test]
async fn test_sign_missing_device() {
    let app = test_app();

    let response = sign(&app, Uuid::new_v4(), "payload").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let error: ErrorResponse = read_json(response).await;
    assert!(error.error.contains("not found"));
}

#[tokio::test]
async fn test_sign_data_with_underscores_round_trips() {
    let app = test_app();
    let device = create_device(&app, json!({ "signing_algorithm": "ECC" })).await;

    let response = sign(&app, device.id, "a_b_c").await;
    assert_eq!(response.status(), StatusCode::OK);
    let signed: SignResponse = read_json(response).await;

    // Counter and chain link occupy the first two underscore-separated
    // positions; everything after belongs to the data.
    let mut parts = signed.signed_data.splitn(3, '_');
    assert_eq!(parts.next(), Some("1"));
    assert_eq!(
        parts.next(),
        Some(STANDARD.encode(device.id.as_bytes()).as_str())
    );
    assert_eq!(parts.next(), Some("a_b_c"));
}
