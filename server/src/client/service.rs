//! BankClient trait definition

use async_trait::async_trait;
use serde_json::Value;

use super::types::{
    Activity, BankError, BankInfoList, DurableState, TransferHandle, TransferInquiry,
    TransferInquiryOutcome,
};

/// One authenticated, stateful banking session.
///
/// Implementations are not re-entrant: callers must serialize access (the
/// session coordinator does). Any method may transparently re-authenticate,
/// which shows up as a change in [`BankClient::durable_state`].
#[async_trait]
pub trait BankClient: Send {
    /// Snapshot of everything needed to resume this session after a restart
    fn durable_state(&self) -> DurableState;

    /// Get the balance of an account
    async fn get_inquiry_account_balance(
        &mut self,
        account_no: &str,
        account_type: &str,
    ) -> Result<Value, BankError>;

    /// List recent account activities. The response carries an `activityList`
    /// array whose entries are keyed by `rqUid`.
    async fn get_account_activity_list(&mut self, account_no: &str) -> Result<Value, BankError>;

    /// Get the detail of an activity previously returned by the list call
    async fn get_account_activity_detail(
        &mut self,
        account_no: &str,
        activity: &Activity,
    ) -> Result<Value, BankError>;

    /// Get transfer metadata keyed by bank code
    async fn get_bank_info_list(&mut self) -> Result<BankInfoList, BankError>;

    /// First phase of a transfer. The response carries `kbankInternalSessionId`.
    async fn inquire_for_transfer_money(
        &mut self,
        inquiry: &TransferInquiry,
    ) -> Result<TransferInquiryOutcome, BankError>;

    /// Second phase of a transfer, executed with the handle from the inquiry
    async fn transfer_money(&mut self, handle: &TransferHandle) -> Result<Value, BankError>;

    /// Resolve a raw QR payment payload
    async fn scan_qr(&mut self, payload: &str) -> Result<Value, BankError>;
}
