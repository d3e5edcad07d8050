//! In-process banking backend
//!
//! `SandboxBankClient` behaves like a real authenticated session: it logs in
//! with the account PIN, keeps its device id and access token in the durable
//! state, and silently re-authenticates once the token expires. Balances,
//! activities and pending transfers live in memory only.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

use super::service::BankClient;
use super::types::{
    Account, Activity, BankError, BankInfo, BankInfoList, DurableState, TransferHandle,
    TransferInquiry, TransferInquiryOutcome,
};

/// Sandbox backend configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Lifetime of an access token before re-authentication
    pub token_ttl: Duration,
    /// Balance the account starts with
    pub opening_balance: Decimal,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(15 * 60),
            opening_balance: Decimal::new(1_000_000, 2), // 10,000.00
        }
    }
}

/// Persisted part of the sandbox session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Credentials {
    device_id: Option<String>,
    access_token: Option<String>,
    token_issued_at: u64,
    login_count: u64,
}

#[derive(Debug, Clone)]
struct PendingTransfer {
    to_account: String,
    amount: Decimal,
    target_bank_code: String,
    executed: bool,
}

/// Banking backend simulated in memory
pub struct SandboxBankClient {
    account: Account,
    config: SandboxConfig,
    credentials: Credentials,
    balance: Decimal,
    activities: Vec<Value>,
    banks: BankInfoList,
    pending: HashMap<String, PendingTransfer>,
}

impl SandboxBankClient {
    /// Resume a sandbox session from a persisted state blob.
    ///
    /// An empty object (or `null`) starts a fresh, logged-out session.
    pub fn resume(
        account: Account,
        state: &DurableState,
        config: SandboxConfig,
    ) -> Result<Self, BankError> {
        let credentials = if state.0.is_null() {
            Credentials::default()
        } else {
            serde_json::from_value(state.0.clone()).map_err(|e| {
                BankError::Authentication(format!("unusable session state: {}", e))
            })?
        };

        let balance = config.opening_balance;
        let now = now_millis();
        let activities = vec![
            activity_entry("DEPOSIT", Decimal::new(250_000, 2), "Salary", now - 86_400_000),
            activity_entry("PAYMENT", Decimal::new(-45_050, 2), "Electricity bill", now - 3_600_000),
        ];

        Ok(Self {
            account,
            config,
            credentials,
            balance,
            activities,
            banks: default_banks(),
            pending: HashMap::new(),
        })
    }

    /// Make sure a valid access token exists, logging in again if needed
    fn ensure_authenticated(&mut self) -> Result<(), BankError> {
        let now = now_millis();
        let ttl = duration_millis(self.config.token_ttl);
        let valid = self.credentials.access_token.is_some()
            && now.saturating_sub(self.credentials.token_issued_at) < ttl;
        if valid {
            return Ok(());
        }

        if self.account.pin.is_empty() {
            return Err(BankError::Authentication("PIN is not configured".to_string()));
        }

        if self.credentials.device_id.is_none() {
            self.credentials.device_id = Some(Uuid::new_v4().to_string());
        }
        self.credentials.access_token = Some(Uuid::new_v4().simple().to_string());
        self.credentials.token_issued_at = now;
        self.credentials.login_count += 1;

        info!(
            "Sandbox session authenticated (login #{})",
            self.credentials.login_count
        );
        Ok(())
    }

    fn check_account(&self, account_no: &str) -> Result<(), BankError> {
        if account_no != self.account.number {
            return Err(BankError::Rejected(format!(
                "Account {} is not linked to this session",
                account_no
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BankClient for SandboxBankClient {
    fn durable_state(&self) -> DurableState {
        DurableState(serde_json::to_value(&self.credentials).unwrap_or(Value::Null))
    }

    async fn get_inquiry_account_balance(
        &mut self,
        account_no: &str,
        account_type: &str,
    ) -> Result<Value, BankError> {
        self.ensure_authenticated()?;
        self.check_account(account_no)?;

        Ok(json!({
            "accountNo": account_no,
            "accountType": account_type,
            "availableBalance": self.balance,
            "currency": "THB",
            "asOf": now_millis(),
        }))
    }

    async fn get_account_activity_list(&mut self, account_no: &str) -> Result<Value, BankError> {
        self.ensure_authenticated()?;
        self.check_account(account_no)?;

        Ok(json!({
            "accountNo": account_no,
            "activityList": self.activities,
            "total": self.activities.len(),
        }))
    }

    async fn get_account_activity_detail(
        &mut self,
        account_no: &str,
        activity: &Activity,
    ) -> Result<Value, BankError> {
        self.ensure_authenticated()?;
        self.check_account(account_no)?;

        let rq_uid = activity
            .rq_uid()
            .ok_or_else(|| BankError::Rejected("Activity has no rqUid".to_string()))?;
        let entry = self
            .activities
            .iter()
            .find(|a| a.get("rqUid").and_then(Value::as_str) == Some(rq_uid))
            .ok_or_else(|| BankError::Rejected(format!("Activity {} not found", rq_uid)))?;

        let mut detail = entry.as_object().cloned().unwrap_or_default();
        detail.insert("accountNo".to_string(), json!(account_no));
        detail.insert("channel".to_string(), json!("SANDBOX"));
        detail.insert("status".to_string(), json!("COMPLETED"));
        Ok(Value::Object(detail))
    }

    async fn get_bank_info_list(&mut self) -> Result<BankInfoList, BankError> {
        self.ensure_authenticated()?;
        Ok(self.banks.clone())
    }

    async fn inquire_for_transfer_money(
        &mut self,
        inquiry: &TransferInquiry,
    ) -> Result<TransferInquiryOutcome, BankError> {
        self.ensure_authenticated()?;
        self.check_account(&inquiry.from_account)?;

        if inquiry.amount <= Decimal::ZERO {
            return Err(BankError::Rejected("Invalid transfer amount".to_string()));
        }
        if inquiry.amount > self.balance {
            return Err(BankError::Rejected("Insufficient balance".to_string()));
        }

        let session_id = Uuid::new_v4().simple().to_string();
        let fee = if inquiry.transfer_type == "T1" {
            Decimal::ZERO
        } else {
            Decimal::new(1_000, 2)
        };

        self.pending.insert(
            session_id.clone(),
            PendingTransfer {
                to_account: inquiry.to_account.clone(),
                amount: inquiry.amount,
                target_bank_code: inquiry.target_bank_code.clone(),
                executed: false,
            },
        );
        debug!("Sandbox transfer inquiry {} registered", session_id);

        Ok(TransferInquiryOutcome {
            handle: TransferHandle(json!({
                "kbankInternalSessionId": session_id,
                "inquiryRef": Uuid::new_v4().to_string(),
            })),
            response: json!({
                "kbankInternalSessionId": session_id,
                "fromAccount": inquiry.from_account,
                "toAccount": inquiry.to_account,
                "toAccountName": "SANDBOX RECIPIENT",
                "targetBankCode": inquiry.target_bank_code,
                "amount": inquiry.amount,
                "fee": fee,
            }),
        })
    }

    async fn transfer_money(&mut self, handle: &TransferHandle) -> Result<Value, BankError> {
        self.ensure_authenticated()?;

        let session_id = handle
            .0
            .get("kbankInternalSessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BankError::Rejected("Malformed transfer handle".to_string()))?;
        let pending = self
            .pending
            .get_mut(session_id)
            .ok_or_else(|| BankError::Rejected("Transfer inquiry has expired".to_string()))?;

        if pending.executed {
            return Err(BankError::Rejected("Transfer already executed".to_string()));
        }
        if pending.amount > self.balance {
            return Err(BankError::Rejected("Insufficient balance".to_string()));
        }

        pending.executed = true;
        let amount = pending.amount;
        let description = format!(
            "Transfer to {} ({})",
            pending.to_account, pending.target_bank_code
        );
        self.balance -= amount;
        self.activities
            .insert(0, activity_entry("TRANSFER_OUT", -amount, &description, now_millis()));

        Ok(json!({
            "status": "SUCCESS",
            "kbankInternalSessionId": session_id,
            "transactionRef": Uuid::new_v4().simple().to_string(),
            "amount": amount,
            "availableBalance": self.balance,
        }))
    }

    async fn scan_qr(&mut self, payload: &str) -> Result<Value, BankError> {
        self.ensure_authenticated()?;

        let fields = parse_emv_payload(payload)
            .ok_or_else(|| BankError::Rejected("Unsupported QR payload".to_string()))?;

        let mut response = Map::new();
        response.insert("raw".to_string(), json!(payload));
        if let Some(amount) = fields.get("54") {
            response.insert("amount".to_string(), json!(amount));
        }
        if let Some(currency) = fields.get("53") {
            response.insert("currency".to_string(), json!(currency));
        }
        if let Some(name) = fields.get("59") {
            response.insert("merchantName".to_string(), json!(name));
        }
        response.insert("fields".to_string(), json!(fields));
        Ok(Value::Object(response))
    }
}

/// Split an EMVCo merchant-presented payload into its top-level tags.
///
/// Each field is `ID(2) LEN(2) VALUE(LEN)`; the payload must start with the
/// format indicator `000201`.
fn parse_emv_payload(payload: &str) -> Option<BTreeMap<String, String>> {
    if !payload.is_ascii() || !payload.starts_with("000201") {
        return None;
    }

    let mut fields = BTreeMap::new();
    let mut rest = payload;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return None;
        }
        let (id, tail) = rest.split_at(2);
        let (len, tail) = tail.split_at(2);
        let len: usize = len.parse().ok()?;
        if tail.len() < len {
            return None;
        }
        let (value, tail) = tail.split_at(len);
        fields.insert(id.to_string(), value.to_string());
        rest = tail;
    }

    Some(fields)
}

fn activity_entry(kind: &str, amount: Decimal, description: &str, at: u64) -> Value {
    json!({
        "rqUid": Uuid::new_v4().to_string(),
        "activityType": kind,
        "amount": amount,
        "description": description,
        "createdAt": at,
    })
}

fn default_banks() -> BankInfoList {
    [
        ("KBANK", "T1", "004"),
        ("BBL", "T2", "002"),
        ("KTB", "T2", "006"),
        ("SCB", "T2", "014"),
        ("BAY", "T2", "025"),
    ]
    .into_iter()
    .map(|(code, kind, target)| (code.to_string(), BankInfo::new(kind, target)))
    .collect()
}

/// Whole milliseconds in `duration`, clamped at `u64::MAX`
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn now_millis() -> u64 {
    duration_millis(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default(),
    )
}
