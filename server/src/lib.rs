//! Bankgate Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod client;
pub mod config;
pub mod qr;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use client::{BankClient, BankError, SandboxBankClient};
pub use server::{AppState, api_routes};
pub use session::{Session, SessionConfig, SessionError, StateStore, spawn_state_writer};
