//! Configuration Management Module
//!
//! This module handles loading and validating configuration for the relayer.
//! Configuration includes both chain endpoints, the signer keystore, the
//! target-contract allow-list, local storage and loop tuning parameters.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::RelayerError;

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "RELAYER_CONFIG_PATH";
/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/relayer.toml";
/// Prefix for per-field environment overrides (`RELAYER__ZIL__API_ENDPOINT=...`).
const ENV_OVERRIDE_PREFIX: &str = "RELAYER";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all relayer settings.
///
/// This structure holds configuration for:
/// - Chain A (Zilliqa) connection, contracts and signer keystore
/// - Chain B (Poly) connection, wallet and entrance contract
/// - Local durable storage
/// - Target-contract allow-list for poly → zilliqa transfers
/// - Loop timing and dispatch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub zil: ZilConfig,
    pub poly: PolyConfig,
    pub storage: StorageConfig,
    /// Contract address → inbound restriction. Empty means every contract is accepted.
    #[serde(default)]
    pub target_contracts: HashMap<String, TargetContract>,
    #[serde(default)]
    pub relayer: RelayerTuning,
}

/// Chain A (Zilliqa) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZilConfig {
    /// JSON-RPC endpoint
    pub api_endpoint: String,
    /// Chain id used when signing transactions
    pub chain_id: u32,
    /// Message version used when signing transactions
    pub message_version: u32,
    /// Poll interval of the zilliqa → poly monitor in seconds
    pub monitor_interval_secs: u64,
    /// Header buffer size that forces a header-sync submission
    pub headers_per_batch: usize,
    /// Start height override (0 = disabled)
    #[serde(default)]
    pub force_height: u64,
    /// This chain's id on the poly network
    pub side_chain_id: u64,
    /// Cross-chain manager contract (base16)
    pub cross_chain_manager_contract: String,
    /// Cross-chain manager proxy contract (base16)
    pub cross_chain_manager_proxy_contract: String,
    /// Blocks a relay transaction may stay unconfirmed before it is resubmitted
    pub max_exist_tx_epoch: u64,
    /// Keystore file, one encrypted key per line
    pub keystore_path: String,
    /// Address → keystore password
    #[serde(default)]
    pub keystore_passwords: HashMap<String, String>,
}

/// Chain B (Poly) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyConfig {
    pub wallet_file: String,
    pub wallet_password: String,
    /// Start height override (0 = resolve from storage and chain A)
    #[serde(default)]
    pub start_height: u32,
    /// Poll interval of the poly → zilliqa monitor in seconds
    pub monitor_interval_secs: u64,
    /// Contract emitting `makeProof` notifications
    pub entrance_contract_address: String,
    pub rest_url: String,
}

/// Local durable storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the database
    pub path: String,
    /// Wipe the database before opening
    #[serde(default)]
    pub remove_db: bool,
}

/// Allow-list entry for one destination contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContract {
    /// Accepted origin chain ids; empty accepts any origin
    #[serde(default)]
    pub inbound: Vec<u64>,
}

/// How poly → zilliqa submissions pick a signer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Check out the first free signer from the pool
    #[default]
    Pool,
    /// Cycle through signers in fixed order
    RoundRobin,
}

/// Loop timing and dispatch tuning. Every field has a production default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerTuning {
    pub dispatch: DispatchStrategy,
    pub nonce_update_interval_secs: u64,
    pub sender_backoff_secs: u64,
    pub retry_item_delay_ms: u64,
    pub header_confirm_interval_ms: u64,
    pub header_confirm_max_retries: u32,
    pub ds_block_wait_ms: u64,
    /// Poly blocks kept behind the chain head
    pub useful_block_num: u32,
    /// Retry records processed per drain
    pub retry_batch_limit: usize,
    /// JSON-lines audit file for deposit commits (`None` disables it)
    pub audit_log_path: Option<String>,
    pub enable_zil_to_poly: bool,
    pub enable_poly_to_zil: bool,
}

impl Default for RelayerTuning {
    fn default() -> Self {
        Self {
            dispatch: DispatchStrategy::Pool,
            nonce_update_interval_secs: 30,
            sender_backoff_secs: 10,
            retry_item_delay_ms: 1000,
            header_confirm_interval_ms: 100,
            header_confirm_max_retries: 5000,
            ds_block_wait_ms: 2000,
            useful_block_num: 1,
            retry_batch_limit: 1000,
            audit_log_path: Some("audit.log".to_string()),
            enable_zil_to_poly: true,
            enable_poly_to_zil: true,
        }
    }
}

impl RelayerTuning {
    pub fn nonce_update_interval(&self) -> Duration {
        Duration::from_secs(self.nonce_update_interval_secs)
    }

    pub fn sender_backoff(&self) -> Duration {
        Duration::from_secs(self.sender_backoff_secs)
    }

    pub fn retry_item_delay(&self) -> Duration {
        Duration::from_millis(self.retry_item_delay_ms)
    }

    pub fn header_confirm_interval(&self) -> Duration {
        Duration::from_millis(self.header_confirm_interval_ms)
    }

    pub fn ds_block_wait(&self) -> Duration {
        Duration::from_millis(self.ds_block_wait_ms)
    }
}

// ============================================================================
// CONFIGURATION LOADING AND VALIDATION
// ============================================================================

impl Config {
    /// Loads configuration from the TOML file, then applies environment overrides.
    ///
    /// The file path is taken from `RELAYER_CONFIG_PATH` and defaults to
    /// `config/relayer.toml`. Individual fields can be overridden with
    /// `RELAYER__<SECTION>__<FIELD>` variables.
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - Missing file, parse failure or invalid values
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(&config_path)
    }

    /// Loads configuration from an explicit path, with environment overrides.
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        if !std::path::Path::new(config_path).exists() {
            // Configuration file doesn't exist - user needs to copy template
            return Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/relayer.template.toml config/relayer.toml\n\
                Then edit config/relayer.toml with your actual values.",
                config_path
            ));
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::new(config_path, ::config::FileFormat::Toml))
            .add_source(
                ::config::Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration '{}'", config_path))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration '{}'", config_path))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the monitors cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.zil.api_endpoint.trim().is_empty() {
            anyhow::bail!(RelayerError::InvalidConfig("zil.api_endpoint is empty".to_string()));
        }
        if self.poly.rest_url.trim().is_empty() {
            anyhow::bail!(RelayerError::InvalidConfig("poly.rest_url is empty".to_string()));
        }
        if self.zil.side_chain_id == 0 {
            anyhow::bail!(RelayerError::InvalidConfig("zil.side_chain_id must be non-zero".to_string()));
        }
        if normalize_address(&self.zil.cross_chain_manager_contract).is_empty() {
            anyhow::bail!(RelayerError::InvalidConfig("zil.cross_chain_manager_contract is empty".to_string()));
        }
        if self.zil.headers_per_batch == 0 {
            anyhow::bail!(RelayerError::InvalidConfig("zil.headers_per_batch must be non-zero".to_string()));
        }
        if self.zil.monitor_interval_secs == 0 || self.poly.monitor_interval_secs == 0 {
            anyhow::bail!(RelayerError::InvalidConfig("monitor intervals must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Cross-chain manager address in canonical form.
    pub fn cross_chain_manager(&self) -> String {
        normalize_address(&self.zil.cross_chain_manager_contract)
    }

    /// Looks up the keystore password for `address`, ignoring case and `0x`.
    pub fn keystore_password(&self, address: &str) -> Option<&str> {
        let wanted = normalize_address(address);
        self.zil
            .keystore_passwords
            .iter()
            .find(|(addr, _)| normalize_address(addr) == wanted)
            .map(|(_, pwd)| pwd.as_str())
    }

    /// Applies the target-contract allow-list to one poly → zilliqa transfer.
    ///
    /// An empty allow-list accepts everything. Otherwise the destination contract
    /// must be listed, and when its entry restricts inbound chains the origin chain
    /// must be among them.
    pub fn is_target_contract(&self, to_contract: &str, from_chain_id: u64) -> bool {
        if self.target_contracts.is_empty() {
            return true;
        }
        let wanted = normalize_address(to_contract);
        self.target_contracts
            .iter()
            .find(|(addr, _)| normalize_address(addr) == wanted)
            .map(|(_, target)| target.inbound.is_empty() || target.inbound.contains(&from_chain_id))
            .unwrap_or(false)
    }
}

/// Canonical address form: trimmed, lowercase, without `0x`.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}
