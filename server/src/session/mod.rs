//! Session coordination
//!
//! This module provides:
//! - `Session`, the single gate in front of the authenticated banking client
//! - `CorrelationTable` for ids that bridge two-request flows
//! - `BankInfoCache` for the optional bank metadata cache
//! - `StateStore` and the background state writer

pub mod bank_info;
pub mod coordinator;
pub mod correlation;
pub mod state;

pub use bank_info::BankInfoCache;
pub use coordinator::{ClientOp, Session, SessionConfig, SessionError, TransferRequest};
pub use correlation::CorrelationTable;
pub use state::{StateSender, StateStore, StoreError, spawn_state_writer};
