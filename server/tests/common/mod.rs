//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

use async_trait::async_trait;
use axum::{Json, Router, routing::get};
use bankgate_server::client::{
    Account, Activity, BankClient, BankError, BankInfoList, DurableState, SandboxBankClient,
    SandboxConfig, TransferHandle, TransferInquiry, TransferInquiryOutcome,
};
use bankgate_server::qr::{QrDecoder, QrError};
use bankgate_server::session::{StateSender, Session, SessionConfig};
use bankgate_server::{AppState, api_routes};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

pub const ACCOUNT_NO: &str = "0987654321";

/// A QR payload the sandbox backend understands
pub const SAMPLE_QR: &str = "00020101021153037645406100.005802TH5904SHOP6304ABCD";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn test_account() -> Account {
    Account {
        number: ACCOUNT_NO.to_string(),
        account_type: "SA".to_string(),
        pin: "112233".to_string(),
    }
}

/// Counts the backend operations that reached the client
#[derive(Default)]
pub struct CallCounter {
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl CallCounter {
    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }
}

/// Sandbox client that records every operation it is asked to run
pub struct CountingClient {
    inner: SandboxBankClient,
    counter: Arc<CallCounter>,
}

#[async_trait]
impl BankClient for CountingClient {
    fn durable_state(&self) -> DurableState {
        self.inner.durable_state()
    }

    async fn get_inquiry_account_balance(
        &mut self,
        account_no: &str,
        account_type: &str,
    ) -> Result<Value, BankError> {
        self.counter.record("balance");
        self.inner
            .get_inquiry_account_balance(account_no, account_type)
            .await
    }

    async fn get_account_activity_list(&mut self, account_no: &str) -> Result<Value, BankError> {
        self.counter.record("activity_list");
        self.inner.get_account_activity_list(account_no).await
    }

    async fn get_account_activity_detail(
        &mut self,
        account_no: &str,
        activity: &Activity,
    ) -> Result<Value, BankError> {
        self.counter.record("activity_detail");
        self.inner
            .get_account_activity_detail(account_no, activity)
            .await
    }

    async fn get_bank_info_list(&mut self) -> Result<BankInfoList, BankError> {
        self.counter.record("bank_info_list");
        self.inner.get_bank_info_list().await
    }

    async fn inquire_for_transfer_money(
        &mut self,
        inquiry: &TransferInquiry,
    ) -> Result<TransferInquiryOutcome, BankError> {
        self.counter.record("inquire");
        self.inner.inquire_for_transfer_money(inquiry).await
    }

    async fn transfer_money(&mut self, handle: &TransferHandle) -> Result<Value, BankError> {
        self.counter.record("transfer");
        self.inner.transfer_money(handle).await
    }

    async fn scan_qr(&mut self, payload: &str) -> Result<Value, BankError> {
        self.counter.record("scan_qr");
        self.inner.scan_qr(payload).await
    }
}

/// Decoder returning a fixed payload for any upload that is not empty
pub struct FixedQrDecoder(pub Option<String>);

impl QrDecoder for FixedQrDecoder {
    fn decode(&self, image: &[u8]) -> Result<String, QrError> {
        if image.is_empty() {
            return Err(QrError::InvalidImage);
        }
        self.0.clone().ok_or(QrError::NotFound)
    }
}

/// Everything a test needs to drive and observe the gateway
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub counter: Arc<CallCounter>,
    pub state_rx: mpsc::UnboundedReceiver<DurableState>,
}

/// Build a session around the sandbox backend, wired to `state_tx`
pub fn create_test_session(
    account: Account,
    state_tx: StateSender,
) -> (Session, Arc<CallCounter>) {
    let counter = Arc::new(CallCounter::default());
    let inner = SandboxBankClient::resume(
        account.clone(),
        &DurableState::default(),
        SandboxConfig::default(),
    )
    .unwrap();
    let client = CountingClient {
        inner,
        counter: Arc::clone(&counter),
    };

    let session = Session::new(Box::new(client), account, SessionConfig::default(), state_tx);
    (session, counter)
}

/// Create a router over `state` with the same layout the server uses
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(api_routes(1024 * 1024))
        .with_state(state)
        .layer(cors)
}

/// Create a test application for `account`
pub fn create_test_app_for(account: Account) -> TestApp {
    let (state_tx, state_rx) = mpsc::unbounded_channel();
    let (session, counter) = create_test_session(account, state_tx);
    let state = AppState::new(Arc::new(session))
        .with_qr_decoder(Arc::new(FixedQrDecoder(Some(SAMPLE_QR.to_string()))));

    TestApp {
        router: create_router(state.clone()),
        state,
        counter,
        state_rx,
    }
}

/// Create a test application for the default test account
pub fn create_test_app() -> TestApp {
    create_test_app_for(test_account())
}

/// Initialize test logging for detailed output
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bankgate_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
