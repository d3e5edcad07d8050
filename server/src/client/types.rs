//! Banking client types and error definitions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors reported by the banking backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BankError {
    #[error("{0}")]
    Rejected(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Backend unreachable: {0}")]
    Transport(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Opaque snapshot of the client session (tokens, device identifiers, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurableState(pub Value);

/// Static credentials of the operated account
#[derive(Clone)]
pub struct Account {
    pub number: String,
    pub account_type: String,
    pub pin: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("number", &self.number)
            .field("account_type", &self.account_type)
            .field("pin", &"***")
            .finish()
    }
}

/// An entry of the activity list, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Activity(pub Value);

impl Activity {
    /// Server-issued request identifier of this activity
    pub fn rq_uid(&self) -> Option<&str> {
        self.0.get("rqUid").and_then(Value::as_str)
    }
}

/// Opaque token produced by a transfer inquiry and consumed by its confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferHandle(pub Value);

/// Transfer metadata for one destination bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankInfo {
    pub transfer_type: String,
    pub target_bank_code: String,
    /// Fields the backend returns that the gateway does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BankInfo {
    pub fn new(transfer_type: impl Into<String>, target_bank_code: impl Into<String>) -> Self {
        Self {
            transfer_type: transfer_type.into(),
            target_bank_code: target_bank_code.into(),
            extra: Map::new(),
        }
    }
}

/// Bank code -> transfer metadata
pub type BankInfoList = BTreeMap<String, BankInfo>;

/// Parameters of the first transfer phase
#[derive(Debug, Clone, PartialEq)]
pub struct TransferInquiry {
    pub from_account: String,
    pub to_account: String,
    pub amount: Decimal,
    pub transfer_type: String,
    pub target_bank_code: String,
}

/// Result of the first transfer phase
#[derive(Debug, Clone)]
pub struct TransferInquiryOutcome {
    /// Handle to pass back on confirmation
    pub handle: TransferHandle,
    /// Raw backend response, returned to the caller as-is
    pub response: Value,
}

impl TransferInquiryOutcome {
    /// Correlation id issued by the backend for this inquiry
    pub fn internal_session_id(&self) -> Option<&str> {
        self.response
            .get("kbankInternalSessionId")
            .and_then(Value::as_str)
    }
}
