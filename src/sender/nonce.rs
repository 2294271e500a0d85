//! Nonce Manager
//!
//! Owns the per-signer nonce book: the last nonce handed out locally, every
//! relay transaction still waiting for confirmation and how long it has been
//! waiting. A background loop reconciles the book against chain A and
//! resubmits transactions that have been stuck for too long.
//!
//! The book lives behind one mutex that is only held for in-memory
//! read-modify-write steps, never across a network call.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{ZilTransaction, ZilliqaClient};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A submitted transaction awaiting confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTransaction {
    pub txn: ZilTransaction,
    /// Tx block at which the transaction was first seen pending
    pub start_tx_block: Option<u64>,
    /// Blocks spent pending since `start_tx_block`
    pub age: u64,
}

#[derive(Debug, Default)]
struct NonceBook {
    /// Signer addresses in round-robin order
    order: Vec<String>,
    next_index: usize,
    /// address → last nonce used by this process
    local_nonces: HashMap<String, u64>,
    /// address → tx hash → pending transaction
    sent: HashMap<String, HashMap<String, TrackedTransaction>>,
    /// address → number of confirmed transactions
    confirmed: HashMap<String, usize>,
}

/// Blocks elapsed since `start`, floored at zero when the chain height moves backwards.
pub fn pending_age(current: u64, start: u64) -> u64 {
    current.saturating_sub(start)
}

// ============================================================================
// NONCE MANAGER
// ============================================================================

pub struct NonceManager {
    zil: Arc<dyn ZilliqaClient>,
    max_exist_tx_epoch: u64,
    book: Mutex<NonceBook>,
}

impl NonceManager {
    pub fn new(zil: Arc<dyn ZilliqaClient>, max_exist_tx_epoch: u64) -> Self {
        Self {
            zil,
            max_exist_tx_epoch,
            book: Mutex::new(NonceBook::default()),
        }
    }

    /// Starts tracking a signer from its current on-chain nonce.
    pub async fn register_signer(&self, address: &str) -> Result<()> {
        let remote = self
            .zil
            .get_balance(address)
            .await
            .with_context(|| format!("Failed to fetch nonce of signer {}", address))?;
        info!(
            "NonceManager - signer {} balance {} nonce {}",
            address, remote.balance, remote.nonce
        );
        self.register_signer_with_nonce(address, remote.nonce).await;
        Ok(())
    }

    /// Starts tracking a signer whose last used nonce is `nonce`.
    pub async fn register_signer_with_nonce(&self, address: &str, nonce: u64) {
        let mut book = self.book.lock().await;
        if !book.local_nonces.contains_key(address) {
            book.order.push(address.to_string());
        }
        book.local_nonces.insert(address.to_string(), nonce);
    }

    pub async fn signers(&self) -> Vec<String> {
        self.book.lock().await.order.clone()
    }

    /// Nonce the signer must use for its next transaction.
    pub async fn next_nonce(&self, address: &str) -> Result<u64> {
        let book = self.book.lock().await;
        book.local_nonces
            .get(address)
            .map(|n| n + 1)
            .with_context(|| format!("Signer {} is not tracked by the nonce manager", address))
    }

    pub async fn local_nonce(&self, address: &str) -> Option<u64> {
        self.book.lock().await.local_nonces.get(address).copied()
    }

    /// Advances the signer's local nonce past `txn` and tracks it until confirmed.
    pub async fn record_sent(&self, address: &str, txn: ZilTransaction) {
        let mut book = self.book.lock().await;
        let local = book.local_nonces.entry(address.to_string()).or_insert(0);
        *local = (*local).max(txn.nonce);
        book.sent.entry(address.to_string()).or_default().insert(
            txn.id.clone(),
            TrackedTransaction {
                txn,
                start_tx_block: None,
                age: 0,
            },
        );
    }

    /// Next signer in fixed rotation order.
    pub async fn next_round_robin(&self) -> Option<String> {
        let mut book = self.book.lock().await;
        if book.order.is_empty() {
            return None;
        }
        let index = book.next_index % book.order.len();
        book.next_index = (index + 1) % book.order.len();
        Some(book.order[index].clone())
    }

    /// Snapshot of the signer's unconfirmed transactions, ordered by nonce.
    pub async fn pending_transactions(&self, address: &str) -> Vec<TrackedTransaction> {
        let book = self.book.lock().await;
        let mut pending: Vec<TrackedTransaction> = book
            .sent
            .get(address)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        pending.sort_by_key(|t| t.txn.nonce);
        pending
    }

    pub async fn confirmed_count(&self, address: &str) -> usize {
        self.book
            .lock()
            .await
            .confirmed
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Runs the reconciliation loop until `shutdown` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!("NonceManager - starting, update interval {:?}", interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("NonceManager - shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.reconcile().await {
                        warn!("NonceManager - reconciliation failed: {:#}", e);
                    }
                }
            }
        }
    }

    /// One reconciliation pass over every tracked signer.
    ///
    /// Confirmed transactions leave the pending set. Pending ones are aged
    /// against the current tx block. When any pending transaction is older than
    /// `max_exist_tx_epoch`, it and every pending transaction of that signer with
    /// a nonce at or above it are resubmitted unchanged and their ages reset.
    pub async fn reconcile(&self) -> Result<()> {
        let current = self
            .zil
            .get_latest_tx_block_num()
            .await
            .context("Failed to get current tx block number")?;
        debug!("NonceManager - current tx block number is {}", current);

        for address in self.signers().await {
            let local = self.local_nonce(&address).await;
            match self.zil.get_balance(&address).await {
                Ok(remote) => info!(
                    "NonceManager - address {}, local nonce = {:?}, remote nonce = {}",
                    address, local, remote.nonce
                ),
                Err(e) => {
                    warn!("NonceManager - get nonce for address {} error {:#}", address, e);
                    continue;
                }
            }

            let hashes: Vec<String> = {
                let book = self.book.lock().await;
                book.sent
                    .get(&address)
                    .map(|m| m.keys().cloned().collect())
                    .unwrap_or_default()
            };

            let mut confirmed = Vec::new();
            for hash in hashes {
                match self.zil.is_transaction_confirmed(&hash).await {
                    Ok(true) => confirmed.push(hash),
                    Ok(false) => {}
                    Err(e) => debug!("NonceManager - transaction {} not found: {:#}", hash, e),
                }
            }

            let resubmit = self.apply_observations(&address, current, &confirmed).await;

            for txn in resubmit {
                info!(
                    "NonceManager - resending transaction {} of {}, nonce {}",
                    txn.id, address, txn.nonce
                );
                if let Err(e) = self.zil.create_transaction(&txn.payload).await {
                    error!(
                        "NonceManager - failed to resend transaction {} of {}: {:#}",
                        txn.id, address, e
                    );
                }
            }
        }
        Ok(())
    }

    /// Applies one round of confirmation results to a signer and returns the
    /// transactions that must be resubmitted.
    async fn apply_observations(
        &self,
        address: &str,
        current: u64,
        confirmed: &[String],
    ) -> Vec<ZilTransaction> {
        let mut book = self.book.lock().await;
        let NonceBook {
            sent,
            confirmed: confirmed_book,
            ..
        } = &mut *book;
        let pending = sent.entry(address.to_string()).or_default();

        for hash in confirmed {
            if pending.remove(hash).is_some() {
                info!("NonceManager - transaction {} confirmed", hash);
                *confirmed_book.entry(address.to_string()).or_default() += 1;
            }
        }

        for tracked in pending.values_mut() {
            match tracked.start_tx_block {
                None => {
                    tracked.start_tx_block = Some(current);
                    tracked.age = 0;
                }
                Some(start) => tracked.age = pending_age(current, start),
            }
        }

        let dead_nonce = pending
            .values()
            .filter(|t| t.age > self.max_exist_tx_epoch)
            .map(|t| t.txn.nonce)
            .min();

        let Some(dead_nonce) = dead_nonce else {
            return Vec::new();
        };
        warn!(
            "NonceManager - dead transaction detected for {}, bad nonce is {}",
            address, dead_nonce
        );

        let mut resubmit: Vec<ZilTransaction> = pending
            .values_mut()
            .filter(|t| t.txn.nonce >= dead_nonce)
            .map(|t| {
                t.start_tx_block = Some(current);
                t.age = 0;
                t.txn.clone()
            })
            .collect();
        resubmit.sort_by_key(|t| t.nonce);
        resubmit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_age_floors_at_zero() {
        assert_eq!(pending_age(120, 100), 20);
        assert_eq!(pending_age(90, 100), 0);
    }
}
