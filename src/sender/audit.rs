//! Append-only JSON-lines log of deposit relay attempts on chain A.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::chain::ZilTransaction;

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionAuditEntry {
    pub time: DateTime<Utc>,
    /// JSON of the submitted transaction, empty on failure
    pub payload: String,
    /// Error text, empty on success
    pub error: String,
}

impl TransactionAuditEntry {
    pub fn from_result(result: &Result<ZilTransaction>) -> Self {
        match result {
            Ok(txn) => Self {
                time: Utc::now(),
                payload: serde_json::to_string(txn).unwrap_or_default(),
                error: String::new(),
            },
            Err(e) => Self {
                time: Utc::now(),
                payload: String::new(),
                error: format!("{:#}", e),
            },
        }
    }
}

pub struct AuditLog {
    path: PathBuf,
    // Serializes appends so lines from concurrent signers never interleave.
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry for a submission result. Failures are logged only.
    pub async fn record(&self, result: &Result<ZilTransaction>) {
        let entry = TransactionAuditEntry::from_result(result);
        if let Err(e) = self.append(&entry).await {
            warn!("Failed to append to audit log {}: {:#}", self.path.display(), e);
        }
    }

    async fn append(&self, entry: &TransactionAuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
