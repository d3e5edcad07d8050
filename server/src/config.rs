//! Server configuration
//!
//! Configuration is loaded from environment variables. See `.env.example` for documentation.

use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::client::Account;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// JSON file holding the persisted session state
    pub state_file: PathBuf,

    /// Operated account credentials
    pub account: AccountConfig,

    /// Session coordinator configuration
    pub session: SessionConfig,

    /// Sandbox backend configuration
    pub sandbox: SandboxSettings,

    /// Upload configuration
    pub upload: UploadConfig,
}

/// Static credentials of the single operated account
#[derive(Clone, Default)]
pub struct AccountConfig {
    pub number: String,
    pub account_type: String,
    pub pin: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("number", &self.number)
            .field("account_type", &self.account_type)
            .field("pin", &"***")
            .finish()
    }
}

impl AccountConfig {
    pub fn to_account(&self) -> Account {
        Account {
            number: self.number.clone(),
            account_type: self.account_type.clone(),
            pin: self.pin.clone(),
        }
    }
}

/// Session-related configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest wait for the banking session gate (unset = wait forever)
    pub call_gate_timeout: Option<Duration>,
    /// Bank info cache lifetime (zero = no caching)
    pub bank_info_cache_ttl: Duration,
    /// Activities kept for detail lookups (0 = unbounded)
    pub activity_table_capacity: usize,
    /// Pending transfer handles kept for confirmation (0 = unbounded)
    pub transfer_table_capacity: usize,
}

/// Sandbox backend configuration
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    /// Access token lifetime before the sandbox re-authenticates
    pub token_ttl: Duration,
    /// Starting balance of the sandbox account
    pub opening_balance: Decimal,
}

/// Upload-related configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum QR image upload size in bytes
    pub max_upload_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 64436,
            state_file: PathBuf::from("state.json"),
            account: AccountConfig {
                account_type: "SA".to_string(),
                ..AccountConfig::default()
            },
            session: SessionConfig::default(),
            sandbox: SandboxSettings::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_gate_timeout: None,
            bank_info_cache_ttl: Duration::ZERO,
            activity_table_capacity: 4096,
            transfer_table_capacity: 1024,
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(15 * 60),
            opening_balance: Decimal::new(1_000_000, 2), // 10,000.00
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl SessionConfig {
    /// Coordinator settings derived from this configuration
    pub fn to_session_config(&self) -> crate::session::SessionConfig {
        crate::session::SessionConfig {
            gate_timeout: self.call_gate_timeout,
            bank_info_ttl: Some(self.bank_info_cache_ttl).filter(|ttl| !ttl.is_zero()),
            activity_capacity: self.activity_table_capacity,
            transfer_capacity: self.transfer_table_capacity,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Ok(path) = env::var("STATE_FILE")
            && !path.is_empty()
        {
            config.state_file = PathBuf::from(path);
        }

        // Account config
        if let Ok(number) = env::var("ACCOUNT_NO") {
            config.account.number = number;
        }
        if let Ok(kind) = env::var("ACCOUNT_TYPE")
            && !kind.is_empty()
        {
            config.account.account_type = kind;
        }
        if let Ok(pin) = env::var("ACCOUNT_PIN") {
            config.account.pin = pin;
        }

        // Session config
        if let Ok(val) = env::var("CALL_GATE_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.call_gate_timeout = Some(Duration::from_secs(secs));
        }
        if let Ok(val) = env::var("BANK_INFO_CACHE_TTL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.bank_info_cache_ttl = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("ACTIVITY_TABLE_CAPACITY")
            && let Ok(v) = val.parse()
        {
            config.session.activity_table_capacity = v;
        }
        if let Ok(val) = env::var("TRANSFER_TABLE_CAPACITY")
            && let Ok(v) = val.parse()
        {
            config.session.transfer_table_capacity = v;
        }

        // Sandbox config
        if let Ok(val) = env::var("SANDBOX_TOKEN_TTL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.sandbox.token_ttl = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("SANDBOX_OPENING_BALANCE")
            && let Ok(balance) = Decimal::from_str(&val)
        {
            config.sandbox.opening_balance = balance;
        }

        // Upload config
        if let Ok(val) = env::var("MAX_UPLOAD_SIZE_MB")
            && let Ok(mb) = val.parse::<usize>()
        {
            config.upload.max_upload_size = megabytes(mb);
        }

        config
    }
}

/// Byte count of `mb` megabytes, clamped at `usize::MAX`
fn megabytes(mb: usize) -> usize {
    mb.saturating_mul(1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 64436);
        assert_eq!(config.state_file, PathBuf::from("state.json"));
        assert!(config.session.call_gate_timeout.is_none());
        assert!(config.session.bank_info_cache_ttl.is_zero());
    }

    #[test]
    fn test_zero_ttl_disables_bank_info_cache() {
        let session = SessionConfig::default().to_session_config();
        assert!(session.bank_info_ttl.is_none());

        let cached = SessionConfig {
            bank_info_cache_ttl: Duration::from_secs(300),
            ..SessionConfig::default()
        }
        .to_session_config();
        assert_eq!(cached.bank_info_ttl, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_upload_size_saturates() {
        assert_eq!(megabytes(10), 10 * 1024 * 1024);
        assert_eq!(megabytes(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_account_config_debug_hides_pin() {
        let account = AccountConfig {
            number: "1234567890".to_string(),
            account_type: "SA".to_string(),
            pin: "975310".to_string(),
        };
        assert!(!format!("{:?}", account).contains("975310"));
    }
}
