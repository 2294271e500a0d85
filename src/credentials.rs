//! Signer Credentials Module
//!
//! Loads the chain-A signing accounts the relayer submits with. The keystore
//! file holds one encrypted JSON keystore per line; decryption itself is
//! delegated to a [`KeystoreDecryptor`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::normalize_address;
use crate::error::RelayerError;

// ============================================================================
// SIGNING ACCOUNT
// ============================================================================

/// A decrypted chain-A account.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningAccount {
    /// Base16 address without `0x`
    pub address: String,
    /// Hex private key
    pub private_key: String,
}

impl fmt::Debug for SigningAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningAccount")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// CREDENTIAL STORE
// ============================================================================

/// Source of decrypted signing accounts.
pub trait CredentialStore: Send + Sync {
    fn signing_accounts(&self) -> Result<Vec<SigningAccount>>;
}

/// Decrypts one keystore entry into a hex private key.
pub trait KeystoreDecryptor: Send + Sync {
    fn decrypt(&self, keystore_json: &str, password: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct KeystoreEntry {
    address: String,
}

/// Keystore file with one JSON keystore per line and a password per address.
pub struct KeystoreCredentials {
    path: String,
    passwords: HashMap<String, String>,
    decryptor: Arc<dyn KeystoreDecryptor>,
}

impl KeystoreCredentials {
    pub fn new(
        path: impl Into<String>,
        passwords: &HashMap<String, String>,
        decryptor: Arc<dyn KeystoreDecryptor>,
    ) -> Self {
        let passwords = passwords
            .iter()
            .map(|(addr, pwd)| (normalize_address(addr), pwd.clone()))
            .collect();
        Self {
            path: path.into(),
            passwords,
            decryptor,
        }
    }

    fn decrypt_line(&self, line: &str) -> Result<SigningAccount> {
        let entry: KeystoreEntry =
            serde_json::from_str(line).context("Keystore line is not valid JSON")?;
        let address = normalize_address(&entry.address);
        let password = self
            .passwords
            .get(&address)
            .with_context(|| format!("No password configured for {}", address))?;
        let private_key = self
            .decryptor
            .decrypt(line, password)
            .with_context(|| format!("Failed to decrypt keystore of {}", address))?;
        Ok(SigningAccount {
            address,
            private_key,
        })
    }
}

impl CredentialStore for KeystoreCredentials {
    /// Decrypts every usable keystore line. Undecryptable lines are skipped;
    /// having none left is fatal.
    fn signing_accounts(&self) -> Result<Vec<SigningAccount>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read keystore file '{}'", self.path))?;

        let mut accounts = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.decrypt_line(line) {
                Ok(account) => {
                    info!("Loaded signer {}", account.address);
                    accounts.push(account);
                }
                Err(e) => warn!("Skipping keystore line {}: {:#}", line_no + 1, e),
            }
        }

        if accounts.is_empty() {
            return Err(RelayerError::NoSigners.into());
        }
        Ok(accounts)
    }
}
