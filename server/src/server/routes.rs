//! HTTP route handlers for the banking API

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartRejection},
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;

use super::AppState;
use super::error::{ApiError, BANK_NOT_FOUND, FieldError};
use super::forms::{FormOrJson, TransferForm};
use crate::client::BankInfoList;
use crate::qr::QrError;

/// GET /balance - Balance of the operated account
pub async fn balance(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.session.balance().await?))
}

/// GET /activities - Recent activities; registers them for detail lookups
pub async fn activities(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.session.fetch_activities().await?))
}

/// GET /activity-detail/:rqUid - Detail of a previously listed activity
pub async fn activity_detail(
    State(state): State<AppState>,
    Path(rq_uid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.session.activity_detail(&rq_uid).await.map_err(|e| {
        tracing::debug!("Activity detail for {} rejected: {}", rq_uid, e);
        ApiError::from(e)
    })?;

    Ok(Json(detail))
}

/// GET /bank-info-list - Transfer metadata keyed by bank code
pub async fn bank_info_list(
    State(state): State<AppState>,
) -> Result<Json<BankInfoList>, ApiError> {
    let banks = state.session.bank_info_list().await?;
    Ok(Json(banks.as_ref().clone()))
}

/// POST /inquire-for-transfer-money - First transfer phase
pub async fn inquire_for_transfer_money(
    State(state): State<AppState>,
    FormOrJson(form): FormOrJson<TransferForm>,
) -> Result<Json<Value>, ApiError> {
    let parsed = form.parse();

    let bank_error = match form.bank_code() {
        Some(code) => match state.session.bank_info_list().await {
            Ok(banks) if banks.contains_key(code) => None,
            Ok(_) => Some(FieldError::body(
                "toBankCode",
                form.to_bank_code.clone(),
                BANK_NOT_FOUND,
            )),
            Err(e) => Some(FieldError::body(
                "toBankCode",
                form.to_bank_code.clone(),
                e.to_string(),
            )),
        },
        None => None,
    };

    let request = match (parsed, bank_error) {
        (Ok(request), None) => request,
        (Ok(_), Some(error)) => return Err(ApiError::Validation(vec![error])),
        (Err(mut errors), bank_error) => {
            errors.extend(bank_error);
            return Err(ApiError::Validation(errors));
        }
    };

    Ok(Json(state.session.inquire_transfer(request).await?))
}

/// POST /transfer-money78/:kbankInternalSessionId - Confirm an inquired transfer
pub async fn transfer_money(
    State(state): State<AppState>,
    Path(internal_session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let receipt = state
        .session
        .confirm_transfer(&internal_session_id)
        .await
        .map_err(|e| {
            tracing::warn!("Transfer {} not executed: {}", internal_session_id, e);
            ApiError::from(e)
        })?;

    tracing::info!("Transfer {} executed", internal_session_id);
    Ok(Json(receipt))
}

/// POST /scan-qrcode/:raw - Resolve a raw QR payload
pub async fn scan_qrcode_raw(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.session.scan_qr(raw).await?))
}

/// POST /scan-qrcode - Resolve the QR code found in an uploaded image
pub async fn scan_qrcode_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let image = read_image_field(multipart).await?;

    let decoder = Arc::clone(&state.qr_decoder);
    let payload = tokio::task::spawn_blocking(move || decoder.decode(&image))
        .await
        .map_err(|e| {
            tracing::error!("QR decoder task failed: {}", e);
            ApiError::Operation("Failed to decode image".to_string())
        })??;

    tracing::debug!("Decoded QR payload of {} bytes", payload.len());
    Ok(Json(state.session.scan_qr(payload).await?))
}

/// Pull the bytes of the `image` field out of a multipart body
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, ApiError> {
    let image_error = |msg: String| ApiError::Validation(vec![FieldError::file("image", msg)]);

    let mut multipart = multipart.map_err(|e| image_error(e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| image_error(e.body_text()))?
    {
        if field.name() == Some("image") {
            let data = field.bytes().await.map_err(|e| image_error(e.body_text()))?;
            return Ok(data.to_vec());
        }
    }

    Err(ApiError::from(QrError::InvalidImage))
}

/// Build the banking API routes. `upload_limit` caps the QR image body size.
pub fn api_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/balance", get(balance))
        .route("/activities", get(activities))
        .route("/activity-detail/:rqUid", get(activity_detail))
        .route("/bank-info-list", get(bank_info_list))
        .route("/inquire-for-transfer-money", post(inquire_for_transfer_money))
        .route("/transfer-money78/:kbankInternalSessionId", post(transfer_money))
        .route("/scan-qrcode/:raw", post(scan_qrcode_raw))
        .route(
            "/scan-qrcode",
            post(scan_qrcode_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
}
