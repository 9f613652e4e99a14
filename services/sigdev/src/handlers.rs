//! Signature Device REST API Handlers
//!
//! Device CRUD plus the signing endpoint. Only sign and delete go through the
//! keyed lock; everything else passes straight through to the store.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigdev::{
    Device, DeviceFilter, DeviceManager, MemoryDeviceStore, NewDevice, SigdevError, SignOutcome,
    SigningAlgorithm,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub manager: DeviceManager<MemoryDeviceStore>,
    /// Cancelled on server shutdown; aborts pending lock waits.
    pub shutdown: CancellationToken,
}

// ==================== Error Handling ====================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: msg.into() }),
        )
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::CONFLICT,
            Json(ErrorResponse { error: msg.into() }),
        )
    }

    /// Lock acquisition was cancelled; the request is safe to retry.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse { error: msg.into() }),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: msg.into() }),
        )
    }
}

impl From<SigdevError> for ApiError {
    fn from(e: SigdevError) -> Self {
        match e {
            SigdevError::NotFound(_) => ApiError::not_found(e.to_string()),
            SigdevError::DeviceExists(_) => ApiError::conflict(e.to_string()),
            SigdevError::Cancelled => ApiError::unavailable(e.to_string()),
            SigdevError::KeyDecode(_)
            | SigdevError::KeyGeneration(_)
            | SigdevError::Signing(_)
            | SigdevError::Verification(_)
            | SigdevError::Storage(_) => {
                tracing::error!("internal error: {}", e);
                ApiError::internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== DTOs ====================

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub id: Option<Uuid>,
    pub signing_algorithm: SigningAlgorithm,
    pub label: Option<String>,
}

/// Device as exposed to callers: public key half only.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub signing_algorithm: SigningAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub public_key: String,
    pub signature_counter: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Device> for DeviceResponse {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            signing_algorithm: device.signing_algorithm,
            label: device.label,
            public_key: device.public_key_pem,
            signature_counter: device.signature_counter,
            created_at: device.created_at,
            updated_at: device.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDevicesParams {
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignResponse {
    pub signature: String,
    /// `<counter>_<chain_link>_<data>`; the chain link precedes the data so
    /// the fixed parts parse unambiguously even when the data contains
    /// underscores.
    pub signed_data: String,
}

// ==================== Health Check ====================

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ==================== Device Handlers ====================

/// Create a device with a freshly generated keypair.
pub async fn create_device(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceResponse>), ApiError> {
    let device = state
        .manager
        .create(NewDevice {
            id: request.id,
            signing_algorithm: request.signing_algorithm,
            label: request.label,
        })
        .await?;

    tracing::info!(device_id = %device.id, algorithm = %device.signing_algorithm, "device created");
    Ok((StatusCode::CREATED, Json(device.into())))
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeviceResponse>, ApiError> {
    let device = state.manager.get(id).await?;
    Ok(Json(device.into()))
}

pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDevicesParams>,
) -> Result<Json<Vec<DeviceResponse>>, ApiError> {
    let devices = state
        .manager
        .list(DeviceFilter {
            ids: Vec::new(),
            limit: params.limit,
            offset: params.offset,
        })
        .await?;

    Ok(Json(devices.into_iter().map(Into::into).collect()))
}

/// Delete a device. Held under the device lock so a delete cannot race a
/// signing transaction; deleting an absent device succeeds.
pub async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.manager.delete(id, &state.shutdown).await?;
    Ok(StatusCode::OK)
}

// ==================== Signing Handler ====================

/// Sign data with a device, advancing its signature chain.
///
/// Empty data returns 204 without touching any state. Otherwise the response
/// carries the base64 signature plus the `signed_data` chain string.
pub async fn sign_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SignRequest>,
) -> Result<Response, ApiError> {
    match state.manager.sign(id, &request.data, &state.shutdown).await? {
        SignOutcome::NothingToSign => Ok(StatusCode::NO_CONTENT.into_response()),
        SignOutcome::Signed(signed) => Ok(Json(SignResponse {
            signed_data: format!(
                "{}_{}_{}",
                signed.signature_counter, signed.chain_link, signed.data
            ),
            signature: signed.signature,
        })
        .into_response()),
    }
}
