//! Banking client module
//!
//! This module provides:
//! - `BankClient` trait for abstracting the authenticated banking backend
//! - `SandboxBankClient`, an in-process backend for development and tests
//! - Request/response types shared with the session coordinator

pub mod sandbox;
mod service;
mod types;

pub use sandbox::{SandboxBankClient, SandboxConfig};
pub use service::BankClient;
pub use types::{
    Account, Activity, BankError, BankInfo, BankInfoList, DurableState, TransferHandle,
    TransferInquiry, TransferInquiryOutcome,
};
