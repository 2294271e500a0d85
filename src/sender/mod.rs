//! Chain-A Sender Module
//!
//! Signers that relay poly transfers and committee rotations into the
//! zilliqa cross-chain manager, the pool they are checked out from, and the
//! nonce manager tracking what they sent.
//!
//! A signer is used by at most one submission at a time: it is claimed on
//! checkout and released when its [`SenderGuard`] drops, whatever the outcome.

pub mod audit;
pub mod nonce;

pub use audit::{AuditLog, TransactionAuditEntry};
pub use nonce::{NonceManager, TrackedTransaction};

use anyhow::{Context, Result};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::chain::{
    ChangeBookKeeperRequest, CrossChainProxy, PolyHeader, VerifyHeaderRequest, ZilTransaction,
    ZilliqaClient,
};
use crate::codec::ToMerkleValue;
use crate::config::DispatchStrategy;
use crate::credentials::SigningAccount;
use crate::crypto;

/// Contract field recording which origin transactions were already executed.
const FROM_CHAIN_TX_EXIST: &str = "fromChainTxExist";

// ============================================================================
// SUBMISSION TYPES
// ============================================================================

/// Everything needed to relay one poly transfer into chain A.
#[derive(Debug, Clone)]
pub struct DepositRelay<'a> {
    /// Poly header at `height + 1` of the notification
    pub header: &'a PolyHeader,
    pub param: &'a ToMerkleValue,
    /// Merkle proof from `header` to `anchor`; empty without an anchor
    pub header_proof: &'a [u8],
    pub anchor: Option<&'a PolyHeader>,
    pub poly_tx_hash: &'a str,
    pub raw_audit_path: &'a [u8],
}

#[derive(Debug, Clone, PartialEq)]
pub enum DepositOutcome {
    Submitted(ZilTransaction),
    /// The origin transaction was already executed on chain A; nothing was sent
    AlreadyRelayed,
}

// ============================================================================
// SIGNER
// ============================================================================

/// One chain-A signing account.
pub struct ZilSender {
    account: SigningAccount,
    in_use: AtomicBool,
    zil: Arc<dyn ZilliqaClient>,
    proxy: Arc<dyn CrossChainProxy>,
    nonces: Arc<NonceManager>,
    audit: Option<Arc<AuditLog>>,
    /// Cross-chain manager contract (base16)
    cross_chain_manager: String,
}

impl ZilSender {
    pub fn new(
        account: SigningAccount,
        zil: Arc<dyn ZilliqaClient>,
        proxy: Arc<dyn CrossChainProxy>,
        nonces: Arc<NonceManager>,
        audit: Option<Arc<AuditLog>>,
        cross_chain_manager: String,
    ) -> Self {
        Self {
            account,
            in_use: AtomicBool::new(false),
            zil,
            proxy,
            nonces,
            audit,
            cross_chain_manager,
        }
    }

    pub fn address(&self) -> &str {
        &self.account.address
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    fn try_claim(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.in_use.store(false, Ordering::Release);
    }

    /// Relays one transfer through `verifyHeaderAndExecuteTx`.
    ///
    /// Signatures come from the anchor header when an anchor proof is present,
    /// otherwise from the header itself.
    pub async fn commit_deposit(&self, relay: &DepositRelay<'_>) -> Result<DepositOutcome> {
        let sig_source = match relay.anchor {
            Some(anchor) if !relay.header_proof.is_empty() => &anchor.sig_data,
            _ => &relay.header.sig_data,
        };
        let signatures = crypto::convert_signatures(sig_source)?;

        let param = relay.param;
        if self
            .from_chain_tx_exists(param.from_chain_id, &param.tx_hash)
            .await?
        {
            info!(
                "ZilSender {} - already relayed to zil: from_chain_id {}, from_txhash {}, poly tx {}",
                self.address(),
                param.from_chain_id,
                hex::encode(&param.tx_hash),
                relay.poly_tx_hash
            );
            return Ok(DepositOutcome::AlreadyRelayed);
        }

        let request = VerifyHeaderRequest {
            audit_path: relay.raw_audit_path.to_vec(),
            raw_header: relay.header.message.clone(),
            header_proof: relay.header_proof.to_vec(),
            raw_anchor: relay.anchor.map(|a| a.message.clone()).unwrap_or_default(),
            signatures,
        };

        let nonce = self.nonces.next_nonce(self.address()).await?;
        let result = self
            .proxy
            .verify_header_and_execute_tx(&self.account, &request, nonce)
            .await;
        if let Some(audit) = &self.audit {
            audit.record(&result).await;
        }
        let txn = result.with_context(|| {
            format!(
                "ZilSender {} - verifyHeaderAndExecuteTx failed for poly tx {} (nonce {})",
                self.address(),
                relay.poly_tx_hash,
                nonce
            )
        })?;

        self.nonces.record_sent(self.address(), txn.clone()).await;
        info!(
            "ZilSender {} - sent transaction {} for poly tx {}, nonce {}",
            self.address(),
            txn.id,
            relay.poly_tx_hash,
            txn.nonce
        );
        Ok(DepositOutcome::Submitted(txn))
    }

    /// Relays a committee rotation through `changeBookKeeper`.
    pub async fn commit_header(&self, header: &PolyHeader) -> Result<ZilTransaction> {
        info!("ZilSender {} - commit header at height {}", self.address(), header.height);

        let info = header
            .block_info()
            .with_context(|| format!("Failed to parse consensus payload at height {}", header.height))?;
        let chain_config = info
            .new_chain_config
            .with_context(|| format!("Header {} carries no new chain config", header.height))?;
        let peer_ids: Vec<String> = chain_config.peers.into_iter().map(|p| p.id).collect();

        let request = ChangeBookKeeperRequest {
            raw_header: header.message.clone(),
            pub_keys: crypto::sorted_bookkeeper_keys(&peer_ids)?,
            signatures: crypto::convert_signatures(&header.sig_data)?,
        };

        let nonce = self.nonces.next_nonce(self.address()).await?;
        let txn = self
            .proxy
            .change_book_keeper(&self.account, &request, nonce)
            .await
            .with_context(|| {
                format!(
                    "ZilSender {} - changeBookKeeper failed at height {} (nonce {})",
                    self.address(),
                    header.height,
                    nonce
                )
            })?;

        self.nonces.record_sent(self.address(), txn.clone()).await;
        info!(
            "ZilSender {} - sent changeBookKeeper transaction {}, nonce {}",
            self.address(),
            txn.id,
            txn.nonce
        );
        Ok(txn)
    }

    /// Whether the cross-chain manager already executed `tx_hash` from `from_chain_id`.
    async fn from_chain_tx_exists(&self, from_chain_id: u64, tx_hash: &[u8]) -> Result<bool> {
        let chain_key = from_chain_id.to_string();
        let hash_key = format!("0x{}", hex::encode(tx_hash));
        let state = self
            .zil
            .get_smart_contract_sub_state(
                &self.cross_chain_manager,
                FROM_CHAIN_TX_EXIST,
                &[chain_key.clone(), hash_key.clone()],
            )
            .await
            .context("Failed to query fromChainTxExist")?;

        let exists = state
            .get(FROM_CHAIN_TX_EXIST)
            .and_then(|by_chain| by_chain.get(&chain_key))
            .and_then(|by_hash| by_hash.get(&hash_key))
            .is_some();
        debug!(
            "fromChainTxExist[{}][{}] = {}",
            chain_key, hash_key, exists
        );
        Ok(exists)
    }
}

// ============================================================================
// SIGNER CHECKOUT
// ============================================================================

/// Exclusive use of one signer; released on drop.
pub struct SenderGuard {
    sender: Arc<ZilSender>,
}

impl Deref for SenderGuard {
    type Target = ZilSender;

    fn deref(&self) -> &ZilSender {
        &self.sender
    }
}

impl Drop for SenderGuard {
    fn drop(&mut self) {
        self.sender.release();
    }
}

/// Fixed set of chain-A signers.
pub struct SenderPool {
    senders: Vec<Arc<ZilSender>>,
    nonces: Arc<NonceManager>,
    backoff: Duration,
}

impl SenderPool {
    pub fn new(senders: Vec<Arc<ZilSender>>, nonces: Arc<NonceManager>, backoff: Duration) -> Self {
        Self {
            senders,
            nonces,
            backoff,
        }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn nonces(&self) -> &Arc<NonceManager> {
        &self.nonces
    }

    /// Checks out a signer according to `strategy`.
    pub async fn checkout(&self, strategy: DispatchStrategy) -> Result<SenderGuard> {
        if self.senders.is_empty() {
            anyhow::bail!("Sender pool is empty");
        }
        match strategy {
            DispatchStrategy::Pool => Ok(self.select_sender().await),
            DispatchStrategy::RoundRobin => self.select_round_robin().await,
        }
    }

    /// Claims the first free signer, rescanning after `backoff` while all are busy.
    pub async fn select_sender(&self) -> SenderGuard {
        loop {
            if let Some(sender) = self.senders.iter().find(|s| s.try_claim()) {
                debug!("Checked out signer {}", sender.address());
                return SenderGuard {
                    sender: Arc::clone(sender),
                };
            }
            info!("All signers busy, retrying in {:?}", self.backoff);
            tokio::time::sleep(self.backoff).await;
        }
    }

    /// Claims the next signer in rotation, waiting until it is free.
    async fn select_round_robin(&self) -> Result<SenderGuard> {
        let address = self
            .nonces
            .next_round_robin()
            .await
            .context("No signer registered with the nonce manager")?;
        let sender = self
            .senders
            .iter()
            .find(|s| s.address() == address)
            .with_context(|| format!("Signer {} is not in the pool", address))?;

        while !sender.try_claim() {
            debug!("Signer {} busy, retrying in {:?}", address, self.backoff);
            tokio::time::sleep(self.backoff).await;
        }
        Ok(SenderGuard {
            sender: Arc::clone(sender),
        })
    }
}
