//! Test Utilities Module
//!
//! Provides an instrumented banking client and session fixtures for unit tests.
//! This module is only compiled when running tests.

#![cfg(test)]

use crate::client::{
    Account, Activity, BankClient, BankError, BankInfo, BankInfoList, DurableState,
    TransferHandle, TransferInquiry, TransferInquiryOutcome,
};
use crate::session::{Session, SessionConfig};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Call Probe
// ============================================================================

/// Records what the mock client was asked to do, shared with the test body
#[derive(Default)]
pub struct CallProbe {
    calls: Mutex<Vec<&'static str>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    inquiries: Mutex<Vec<TransferInquiry>>,
    transferred: Mutex<Vec<TransferHandle>>,
}

impl CallProbe {
    fn enter(&self, op: &'static str) {
        self.calls.lock().unwrap().push(op);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of calls made to `op`
    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of operation bodies observed running at once
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn inquiries(&self) -> Vec<TransferInquiry> {
        self.inquiries.lock().unwrap().clone()
    }

    /// Handles passed to `transfer_money`, in call order
    pub fn transferred(&self) -> Vec<TransferHandle> {
        self.transferred.lock().unwrap().clone()
    }
}

// ============================================================================
// Mock Client
// ============================================================================

/// Scriptable `BankClient` backed by a [`CallProbe`]
pub struct MockBankClient {
    pub probe: Arc<CallProbe>,
    /// Time spent inside every operation body
    pub delay: Duration,
    pub banks: BankInfoList,
    pub activity_list: Value,
    /// `kbankInternalSessionId` returned by the next inquiry
    pub next_session_id: String,
    /// Return inquiry responses without `kbankInternalSessionId`
    pub omit_session_id: bool,
    state_version: u64,
    mutating: HashSet<&'static str>,
    failures: HashMap<&'static str, BankError>,
}

impl MockBankClient {
    pub fn new() -> Self {
        let mut banks = BankInfoList::new();
        banks.insert("KBANK".to_string(), BankInfo::new("T1", "004"));
        banks.insert("SCB".to_string(), BankInfo::new("T2", "014"));

        Self {
            probe: Arc::new(CallProbe::default()),
            delay: Duration::ZERO,
            banks,
            activity_list: json!({ "activityList": [] }),
            next_session_id: "session-1".to_string(),
            omit_session_id: false,
            state_version: 0,
            mutating: HashSet::new(),
            failures: HashMap::new(),
        }
    }

    /// Make `op` change the durable state every time it runs
    pub fn mutate_state_on(&mut self, op: &'static str) {
        self.mutating.insert(op);
    }

    /// Make the next call to `op` fail with `error`
    pub fn fail_next(&mut self, op: &'static str, error: BankError) {
        self.failures.insert(op, error);
    }

    async fn run(&mut self, op: &'static str) -> Result<(), BankError> {
        self.probe.enter(op);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.mutating.contains(op) {
            self.state_version += 1;
        }
        let outcome = match self.failures.remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        };
        self.probe.exit();
        outcome
    }
}

impl Default for MockBankClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BankClient for MockBankClient {
    fn durable_state(&self) -> DurableState {
        DurableState(json!({ "version": self.state_version }))
    }

    async fn get_inquiry_account_balance(
        &mut self,
        account_no: &str,
        account_type: &str,
    ) -> Result<Value, BankError> {
        self.run("get_inquiry_account_balance").await?;
        Ok(json!({
            "accountNo": account_no,
            "accountType": account_type,
            "availableBalance": "5000.00",
        }))
    }

    async fn get_account_activity_list(&mut self, _account_no: &str) -> Result<Value, BankError> {
        self.run("get_account_activity_list").await?;
        Ok(self.activity_list.clone())
    }

    async fn get_account_activity_detail(
        &mut self,
        account_no: &str,
        activity: &Activity,
    ) -> Result<Value, BankError> {
        self.run("get_account_activity_detail").await?;
        Ok(json!({ "accountNo": account_no, "activity": activity.0 }))
    }

    async fn get_bank_info_list(&mut self) -> Result<BankInfoList, BankError> {
        self.run("get_bank_info_list").await?;
        Ok(self.banks.clone())
    }

    async fn inquire_for_transfer_money(
        &mut self,
        inquiry: &TransferInquiry,
    ) -> Result<TransferInquiryOutcome, BankError> {
        self.run("inquire_for_transfer_money").await?;
        self.probe.inquiries.lock().unwrap().push(inquiry.clone());

        let id = self.next_session_id.clone();
        let response = if self.omit_session_id {
            json!({ "toAccount": inquiry.to_account })
        } else {
            json!({ "kbankInternalSessionId": id, "toAccount": inquiry.to_account })
        };
        Ok(TransferInquiryOutcome {
            handle: TransferHandle(json!({ "token": format!("handle-{}", id) })),
            response,
        })
    }

    async fn transfer_money(&mut self, handle: &TransferHandle) -> Result<Value, BankError> {
        self.run("transfer_money").await?;
        self.probe.transferred.lock().unwrap().push(handle.clone());
        Ok(json!({ "status": "SUCCESS" }))
    }

    async fn scan_qr(&mut self, payload: &str) -> Result<Value, BankError> {
        self.run("scan_qr").await?;
        Ok(json!({ "raw": payload }))
    }
}

// ============================================================================
// Session Fixtures
// ============================================================================

pub fn test_account() -> Account {
    Account {
        number: "0011223344".to_string(),
        account_type: "SA".to_string(),
        pin: "135790".to_string(),
    }
}

/// Build a session around `client`, returning its probe and the state channel
pub fn test_session(
    client: MockBankClient,
    config: SessionConfig,
) -> (
    Session,
    Arc<CallProbe>,
    mpsc::UnboundedReceiver<DurableState>,
) {
    let probe = Arc::clone(&client.probe);
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::new(Box::new(client), test_account(), config, tx);
    (session, probe, rx)
}
