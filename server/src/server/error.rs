//! Error envelopes returned by the HTTP API

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::qr::QrError;
use crate::session::SessionError;

pub const INVALID_VALUE: &str = "Invalid value";
pub const RECORD_NOT_FOUND: &str = "Record not found";
pub const BANK_NOT_FOUND: &str = "Destination bank not found";

/// Where a rejected input came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Params,
    Body,
    File,
}

/// One rejected input field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub msg: String,
    pub param: String,
    pub location: Location,
}

impl FieldError {
    pub fn params(param: &str, value: impl Into<Value>, msg: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            msg: msg.into(),
            param: param.to_string(),
            location: Location::Params,
        }
    }

    /// Rejected upload; the file content is never echoed back
    pub fn file(param: &str, msg: impl Into<String>) -> Self {
        Self {
            value: None,
            msg: msg.into(),
            param: param.to_string(),
            location: Location::File,
        }
    }

    pub fn body(param: &str, value: Option<Value>, msg: impl Into<String>) -> Self {
        Self {
            value,
            msg: msg.into(),
            param: param.to_string(),
            location: Location::Body,
        }
    }
}

/// Failure of an API request. Both kinds answer `400 Bad Request`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The banking operation failed: `{"error": message}`
    Operation(String),
    /// Input was rejected before any banking call: `{"errors": [...]}`
    Validation(Vec<FieldError>),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::Operation(message) => json!({ "error": message }),
            ApiError::Validation(errors) => json!({ "errors": errors }),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::ActivityNotFound(id) => {
                ApiError::Validation(vec![FieldError::params("rqUid", id, RECORD_NOT_FOUND)])
            }
            SessionError::TransferNotFound(id) => ApiError::Validation(vec![FieldError::params(
                "kbankInternalSessionId",
                id,
                RECORD_NOT_FOUND,
            )]),
            SessionError::UnknownBankCode(code) => ApiError::Validation(vec![FieldError::body(
                "toBankCode",
                Some(Value::String(code)),
                BANK_NOT_FOUND,
            )]),
            other => ApiError::Operation(other.to_string()),
        }
    }
}

impl From<QrError> for ApiError {
    fn from(e: QrError) -> Self {
        ApiError::Validation(vec![FieldError::file("image", e.to_string())])
    }
}
