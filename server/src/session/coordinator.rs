use crate::client::{
    Account, Activity, BankClient, BankError, BankInfoList, DurableState, TransferHandle,
    TransferInquiry, TransferInquiryOutcome,
};
use crate::session::bank_info::BankInfoCache;
use crate::session::correlation::CorrelationTable;
use crate::session::state::StateSender;
use futures_util::future::BoxFuture;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

/// Session coordinator errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BankError),

    #[error("Activity not found: {0}")]
    ActivityNotFound(String),

    #[error("Transfer inquiry not found: {0}")]
    TransferNotFound(String),

    #[error("Unknown destination bank: {0}")]
    UnknownBankCode(String),

    #[error("Timed out after {0:?} waiting for the banking session")]
    GateTimeout(Duration),

    #[error("Banking call did not complete: {0}")]
    Interrupted(String),
}

/// Future returned by an operation passed to [`Session::call`]
pub type ClientOp<'c, T> = BoxFuture<'c, Result<T, SessionError>>;

/// Session coordinator configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest wait for the execution gate; `None` waits forever
    pub gate_timeout: Option<Duration>,
    /// Bank info cache lifetime; `None` refetches on every request
    pub bank_info_ttl: Option<Duration>,
    /// Maximum activities kept for detail lookups (0 = unbounded)
    pub activity_capacity: usize,
    /// Maximum pending transfer handles (0 = unbounded)
    pub transfer_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gate_timeout: None,
            bank_info_ttl: None,
            activity_capacity: 4096,
            transfer_capacity: 1024,
        }
    }
}

/// First transfer phase as requested by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub to_account: String,
    pub amount: Decimal,
    pub to_bank_code: String,
}

/// Everything guarded by the execution gate
struct Gate {
    client: Box<dyn BankClient>,
    /// Last snapshot handed to the state writer
    last_state: DurableState,
}

impl Gate {
    /// Queue the client's snapshot if it moved since the last one
    fn emit_state_change(&mut self, state_tx: &StateSender) {
        let state = self.client.durable_state();
        if state == self.last_state {
            return;
        }

        self.last_state = state.clone();
        counter!("bankgate_state_changes_total").increment(1);
        if state_tx.send(state).is_err() {
            warn!("State writer has stopped; session state change not persisted");
        } else {
            debug!("Session state changed, queued for persistence");
        }
    }
}

/// The single authenticated banking session of this process.
///
/// Every client operation goes through [`Session::call`], which runs one
/// operation at a time and queues state changes for persistence.
pub struct Session {
    account: Account,
    gate: Arc<Mutex<Gate>>,
    gate_timeout: Option<Duration>,
    activities: Arc<CorrelationTable<Activity>>,
    transfers: Arc<CorrelationTable<TransferHandle>>,
    bank_info: Arc<BankInfoCache>,
    state_tx: StateSender,
}

impl Session {
    /// Wrap a client resumed from persisted state. Its current snapshot becomes
    /// the baseline for change detection.
    pub fn new(
        client: Box<dyn BankClient>,
        account: Account,
        config: SessionConfig,
        state_tx: StateSender,
    ) -> Self {
        let last_state = client.durable_state();

        Self {
            account,
            gate: Arc::new(Mutex::new(Gate { client, last_state })),
            gate_timeout: config.gate_timeout,
            activities: Arc::new(CorrelationTable::new(
                "activity",
                config.activity_capacity,
            )),
            transfers: Arc::new(CorrelationTable::new(
                "transfer",
                config.transfer_capacity,
            )),
            bank_info: Arc::new(BankInfoCache::new(config.bank_info_ttl)),
            state_tx,
        }
    }

    pub fn activity_table(&self) -> &CorrelationTable<Activity> {
        &self.activities
    }

    pub fn transfer_table(&self) -> &CorrelationTable<TransferHandle> {
        &self.transfers
    }

    /// Last durable state emitted by the session
    pub async fn durable_state(&self) -> DurableState {
        self.gate.lock().await.last_state.clone()
    }

    /// Run `op` with exclusive access to the client.
    ///
    /// The result of `op` is returned unchanged. If the client's durable state
    /// differs afterwards (success or failure), the new snapshot is queued for
    /// persistence before the gate is released; the write itself is not awaited.
    ///
    /// Once the gate is acquired, `op` runs on its own task holding the gate.
    /// Dropping the returned future stops the wait for the result, but the
    /// operation still runs to completion and its state change is still queued.
    pub async fn call<F, T>(&self, op: F) -> Result<T, SessionError>
    where
        F: for<'c> FnOnce(&'c mut dyn BankClient) -> ClientOp<'c, T> + Send + 'static,
        T: Send + 'static,
    {
        let wait = Instant::now();
        let mut gate = self.acquire().await?;
        histogram!("bankgate_gate_wait_seconds").record(wait.elapsed());

        let state_tx = self.state_tx.clone();
        let task = tokio::spawn(async move {
            let start = Instant::now();
            let result = op(gate.client.as_mut()).await;
            histogram!("bankgate_session_call_duration_seconds").record(start.elapsed());

            gate.emit_state_change(&state_tx);
            result
        });

        let result = task.await.unwrap_or_else(|e| {
            error!("Banking call task failed: {}", e);
            Err(SessionError::Interrupted(e.to_string()))
        });

        match &result {
            Ok(_) => counter!("bankgate_session_calls_total", "outcome" => "ok").increment(1),
            Err(e) => {
                counter!("bankgate_session_calls_total", "outcome" => "error").increment(1);
                warn!("Banking call failed: {}", e);
            }
        }

        result
    }

    async fn acquire(&self) -> Result<OwnedMutexGuard<Gate>, SessionError> {
        let gate = Arc::clone(&self.gate);
        let Some(limit) = self.gate_timeout else {
            return Ok(gate.lock_owned().await);
        };

        tokio::time::timeout(limit, gate.lock_owned())
            .await
            .map_err(|_| {
                counter!("bankgate_gate_timeouts_total").increment(1);
                warn!("Gave up waiting {:?} for the banking session", limit);
                SessionError::GateTimeout(limit)
            })
    }

    /// Balance of the operated account
    pub async fn balance(&self) -> Result<Value, SessionError> {
        let number = self.account.number.clone();
        let account_type = self.account.account_type.clone();

        self.call(move |client| {
            Box::pin(async move {
                Ok(client
                    .get_inquiry_account_balance(&number, &account_type)
                    .await?)
            })
        })
        .await
    }

    /// Fetch the activity list and register each entry for detail lookups
    pub async fn fetch_activities(&self) -> Result<Value, SessionError> {
        let number = self.account.number.clone();
        let activities = Arc::clone(&self.activities);

        self.call(move |client| {
            Box::pin(async move {
                let response = client.get_account_activity_list(&number).await?;

                let entries: Vec<(String, Activity)> = response
                    .get("activityList")
                    .and_then(Value::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(|raw| {
                                let activity = Activity(raw.clone());
                                let id = activity.rq_uid()?.to_string();
                                Some((id, activity))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let count = activities.register_all(entries).await;
                debug!("Registered {} activities", count);

                Ok(response)
            })
        })
        .await
    }

    /// Detail of an activity seen in an earlier list. Unknown ids fail without
    /// reaching the client.
    pub async fn activity_detail(&self, rq_uid: &str) -> Result<Value, SessionError> {
        let activity = self
            .activities
            .resolve(rq_uid)
            .await
            .ok_or_else(|| SessionError::ActivityNotFound(rq_uid.to_string()))?;
        let number = self.account.number.clone();

        self.call(move |client| {
            Box::pin(async move {
                Ok(client
                    .get_account_activity_detail(&number, &activity)
                    .await?)
            })
        })
        .await
    }

    /// Bank code -> transfer metadata. A fresh cached copy skips the gate.
    pub async fn bank_info_list(&self) -> Result<Arc<BankInfoList>, SessionError> {
        if let Some(list) = self.bank_info.get().await {
            return Ok(list);
        }

        let cache = Arc::clone(&self.bank_info);
        self.call(move |client| Box::pin(async move { Ok(cache.get_or_fetch(client).await?) }))
            .await
    }

    /// First transfer phase. The returned handle is kept under the backend's
    /// `kbankInternalSessionId` until confirmation.
    pub async fn inquire_transfer(&self, request: TransferRequest) -> Result<Value, SessionError> {
        let from_account = self.account.number.clone();
        let cache = Arc::clone(&self.bank_info);
        let transfers = Arc::clone(&self.transfers);

        self.call(move |client| {
            Box::pin(async move {
                let banks = cache.get_or_fetch(client).await?;
                let bank = banks
                    .get(&request.to_bank_code)
                    .ok_or_else(|| SessionError::UnknownBankCode(request.to_bank_code.clone()))?;

                let inquiry = TransferInquiry {
                    from_account,
                    to_account: request.to_account,
                    amount: request.amount,
                    transfer_type: bank.transfer_type.clone(),
                    target_bank_code: bank.target_bank_code.clone(),
                };
                let outcome = client.inquire_for_transfer_money(&inquiry).await?;

                let id = outcome
                    .internal_session_id()
                    .ok_or_else(|| {
                        BankError::InvalidResponse("missing kbankInternalSessionId".to_string())
                    })?
                    .to_string();
                let TransferInquiryOutcome { handle, response } = outcome;

                transfers.register(id.clone(), handle).await;
                info!("Transfer inquiry {} awaiting confirmation", id);

                Ok(response)
            })
        })
        .await
    }

    /// Second transfer phase, executed with the handle captured at inquiry.
    /// Unknown ids fail without reaching the client.
    pub async fn confirm_transfer(&self, internal_session_id: &str) -> Result<Value, SessionError> {
        let handle = self
            .transfers
            .resolve(internal_session_id)
            .await
            .ok_or_else(|| SessionError::TransferNotFound(internal_session_id.to_string()))?;

        self.call(move |client| Box::pin(async move { Ok(client.transfer_money(&handle).await?) }))
            .await
    }

    /// Resolve a raw QR payment payload
    pub async fn scan_qr(&self, payload: String) -> Result<Value, SessionError> {
        self.call(move |client| Box::pin(async move { Ok(client.scan_qr(&payload).await?) }))
            .await
    }
}
