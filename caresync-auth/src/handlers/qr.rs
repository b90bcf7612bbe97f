//! Cross-device QR login handlers.

use axum::extract::{Json, Path, State};
use validator::Validate;

use caresync_core::error::AppError;

use crate::dtos::QrSessionRequest;
use crate::services::qr_login::{QrPollResponse, QrSessionResponse};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/qr/sessions",
    request_body = QrSessionRequest,
    responses(
        (status = 200, description = "Session opened", body = QrSessionResponse),
        (status = 502, description = "Identity provider unavailable")
    ),
    tag = "QR Login"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<QrSessionRequest>,
) -> Result<Json<QrSessionResponse>, AppError> {
    req.validate()?;
    let session = state.qr.create_session(req.tenant_id).await?;
    Ok(Json(session))
}

#[utoipa::path(
    get,
    path = "/qr/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Current session state", body = QrPollResponse),
        (status = 404, description = "Session expired, consumed or unknown")
    ),
    tag = "QR Login"
)]
pub async fn poll_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<QrPollResponse>, AppError> {
    let poll = state.qr.poll_session(&session_id).await?;
    Ok(Json(poll))
}
