//! Zilliqa → Poly Monitor
//!
//! Scans zilliqa tx blocks in order and, per height:
//! 1. Buffers the DS block the first time a tx block references a newer one
//! 2. Buffers the tx block header unless poly already stores it at that height
//! 3. Queues every successful `CrossChainEvent` of the cross-chain manager
//!
//! The header buffer is submitted to poly as one batch. When poly rejects the
//! batch because it does not connect to its chain, the cursor rolls back to the
//! highest height whose header hash matches poly's copy. After every accepted
//! batch the retry queue is drained by importing each queued event on poly
//! together with a zilliqa state proof.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::poly::{current_header_height_key, main_chain_key, HEADER_SYNC_CONTRACT};
use crate::chain::zilliqa::DS_BLOCK_NOT_READY;
use crate::chain::{EventLog, ImportOuterTransfer, PolyClient, TxBlock, ZilliqaClient};
use crate::codec::bigint::parse_hex_big_int;
use crate::codec::{encode_big_int, hex_index_to_decimal, scilla_storage_key, CrossTransfer, ZilProof};
use crate::config::{normalize_address, Config};
use crate::crypto::sha256;
use crate::error::{is_empty_block_error, RelayerError, SubmitErrorKind};
use crate::storage::RelayerStore;

/// Event emitted by the cross-chain manager for every outbound transfer.
const CROSS_CHAIN_EVENT: &str = "CrossChainEvent";
/// Contract map proving an outbound transfer was recorded.
const TX_HASH_MAP: &str = "zilToPolyTxHashMap";

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// One entry of the header batch, serialized as `{"DsBlock": .., "TxBlock": ..}`
/// with exactly one side set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderEnvelope {
    #[serde(rename = "DsBlock")]
    pub ds_block: Option<serde_json::Value>,
    #[serde(rename = "TxBlock")]
    pub tx_block: Option<serde_json::Value>,
}

impl HeaderEnvelope {
    pub fn tx(raw: serde_json::Value) -> Self {
        Self {
            ds_block: None,
            tx_block: Some(raw),
        }
    }

    pub fn ds(raw: serde_json::Value) -> Self {
        Self {
            ds_block: Some(raw),
            tx_block: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize header envelope")
    }
}

/// Result of submitting the header buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCommit {
    /// Accepted by poly; `confirmed` tells whether inclusion was observed in time
    Committed { confirmed: bool },
    /// Rejected as disconnected; cursor rewound to the common ancestor
    RolledBack,
}

/// Settings of the zilliqa → poly direction.
#[derive(Debug, Clone)]
struct ZilSyncSettings {
    side_chain_id: u64,
    cross_chain_manager: String,
    headers_per_batch: usize,
    force_height: u64,
    monitor_interval: Duration,
    ds_block_wait: Duration,
    header_confirm_interval: Duration,
    header_confirm_max_retries: u32,
    retry_item_delay: Duration,
    retry_batch_limit: usize,
}

impl ZilSyncSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            side_chain_id: config.zil.side_chain_id,
            cross_chain_manager: config.cross_chain_manager(),
            headers_per_batch: config.zil.headers_per_batch,
            force_height: config.zil.force_height,
            monitor_interval: Duration::from_secs(config.zil.monitor_interval_secs),
            ds_block_wait: config.relayer.ds_block_wait(),
            header_confirm_interval: config.relayer.header_confirm_interval(),
            header_confirm_max_retries: config.relayer.header_confirm_max_retries,
            retry_item_delay: config.relayer.retry_item_delay(),
            retry_batch_limit: config.relayer.retry_batch_limit,
        }
    }
}

// ============================================================================
// EVENT PARSING
// ============================================================================

fn param_str<'a>(event: &'a EventLog, names: &[&str]) -> Result<&'a str> {
    event
        .params
        .iter()
        .find(|p| names.contains(&p.vname.as_str()))
        .with_context(|| format!("Event is missing parameter {}", names.join("/")))?
        .value
        .as_str()
        .with_context(|| format!("Parameter {} is not a string", names.join("/")))
}

/// Builds the retry record for one `CrossChainEvent` of transaction `tx_id` at `height`.
///
/// `txId` is hex big-integer text, `toChainId` decimal text and
/// `rawdata`/`rawData` hex.
pub fn parse_cross_chain_event(event: &EventLog, tx_id: &str, height: u64) -> Result<CrossTransfer> {
    let index = parse_hex_big_int(param_str(event, &["txId"])?)?;
    let to_chain: u32 = param_str(event, &["toChainId"])?
        .trim()
        .parse()
        .context("Invalid toChainId")?;
    let raw = param_str(event, &["rawdata", "rawData"])?;
    let value = hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).context("Invalid rawdata hex")?;
    let tx_id = hex::decode(tx_id.strip_prefix("0x").unwrap_or(tx_id)).context("Invalid transaction id hex")?;

    Ok(CrossTransfer {
        tx_index: encode_big_int(&index),
        tx_id,
        value,
        to_chain,
        height,
    })
}

// ============================================================================
// SYNC MANAGER
// ============================================================================

pub struct ZilliqaSyncManager {
    settings: ZilSyncSettings,
    zil: Arc<dyn ZilliqaClient>,
    poly: Arc<dyn PolyClient>,
    store: Arc<RelayerStore>,
    shutdown: CancellationToken,
    /// Last scanned tx block
    current_height: u64,
    /// Last DS block placed in the header buffer
    current_ds_block_num: u64,
    header_buffer: Vec<Vec<u8>>,
}

impl ZilliqaSyncManager {
    /// Creates the manager and resolves its starting heights.
    ///
    /// Start height is the persisted cursor (capped at poly's synced height),
    /// else poly's synced height, overridden by a force height below it.
    /// Fails when poly has no synced header for this side chain.
    pub async fn new(
        config: &Config,
        zil: Arc<dyn ZilliqaClient>,
        poly: Arc<dyn PolyClient>,
        store: Arc<RelayerStore>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let mut manager = Self {
            settings: ZilSyncSettings::from_config(config),
            zil,
            poly,
            store,
            shutdown,
            current_height: 0,
            current_ds_block_num: 0,
            header_buffer: Vec::new(),
        };
        manager.init().await?;
        Ok(manager)
    }

    async fn init(&mut self) -> Result<()> {
        let remote = self.find_latest_synced_height().await?;
        if remote == 0 {
            return Err(RelayerError::GenesisMissing(self.settings.side_chain_id).into());
        }

        let persisted = self.store.zil_height().await?;
        let mut start = match persisted {
            Some(h) if h > 0 => h.min(remote),
            _ => remote,
        };
        let force = self.settings.force_height;
        if force > 0 && force < remote {
            start = force;
        }

        // Resuming exactly at the persisted cursor reuses the persisted DS cursor
        let persisted_ds = self.store.zil_ds_height().await?;
        self.current_ds_block_num = match persisted_ds {
            Some(ds) if persisted == Some(start) => ds,
            _ => self.fetch_ready_tx_block(start).await?.ds_block_num,
        };
        self.current_height = start;
        info!(
            "ZilliqaSyncManager - start height {} (persisted {:?}, poly synced {}), ds block {}",
            start, persisted, remote, self.current_ds_block_num
        );
        Ok(())
    }

    pub fn current_height(&self) -> u64 {
        self.current_height
    }

    pub fn current_ds_block_num(&self) -> u64 {
        self.current_ds_block_num
    }

    pub fn header_buffer_len(&self) -> usize {
        self.header_buffer.len()
    }

    /// Highest zilliqa tx block poly has synced for this side chain.
    async fn find_latest_synced_height(&self) -> Result<u64> {
        let raw = self
            .poly
            .get_storage(HEADER_SYNC_CONTRACT, &current_header_height_key(self.settings.side_chain_id))
            .await
            .context("Failed to query synced zilliqa height on poly")?;
        if raw.is_empty() {
            return Ok(0);
        }
        let bytes: [u8; 8] = raw
            .as_slice()
            .try_into()
            .with_context(|| format!("Unexpected synced height encoding: {}", hex::encode(&raw)))?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Runs the monitor loop until shutdown.
    pub async fn run(mut self) {
        info!(
            "ZilliqaSyncManager - start scan block at height {}",
            self.current_height
        );
        let mut ticker = tokio::time::interval(self.settings.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("ZilliqaSyncManager - shutting down at height {}", self.current_height);
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.monitor_tick().await {
                        error!("ZilliqaSyncManager - tick failed at height {}: {:#}", self.current_height, e);
                    }
                }
            }
        }
    }

    /// One monitor pass: scan every new tx block, flushing the header buffer
    /// when it exceeds the batch size and once more at the end.
    pub async fn monitor_tick(&mut self) -> Result<()> {
        let latest = self
            .zil
            .get_latest_tx_block_num()
            .await
            .context("Failed to get latest tx block")?;
        if self.current_height >= latest && self.header_buffer.is_empty() {
            debug!("ZilliqaSyncManager - no new block, current {}", self.current_height);
            return Ok(());
        }
        info!(
            "ZilliqaSyncManager - current height {}, latest {}",
            self.current_height, latest
        );

        while self.current_height < latest {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            let next = self.current_height + 1;
            self.handle_new_block(next)
                .await
                .with_context(|| format!("Failed to handle block {}", next))?;
            self.current_height = next;

            if self.header_buffer.len() > self.settings.headers_per_batch {
                self.commit_header().await?;
                self.mark_committed().await;
            }
        }

        if !self.header_buffer.is_empty() {
            self.commit_header().await?;
        }
        self.mark_committed().await;
        Ok(())
    }

    /// Persists the current cursors.
    async fn mark_committed(&self) {
        if let Err(e) = self.store.set_zil_height(self.current_height).await {
            error!("ZilliqaSyncManager - failed to save height {}: {}", self.current_height, e);
        }
        if let Err(e) = self.store.set_zil_ds_height(self.current_ds_block_num).await {
            error!(
                "ZilliqaSyncManager - failed to save ds height {}: {}",
                self.current_ds_block_num, e
            );
        }
    }

    /// Fetches a tx block, waiting while its DS block is not yet available.
    async fn fetch_ready_tx_block(&self, height: u64) -> Result<TxBlock> {
        loop {
            let block = self
                .zil
                .get_tx_block(height)
                .await
                .with_context(|| format!("Failed to get tx block {}", height))?;
            if block.ds_block_num != DS_BLOCK_NOT_READY {
                return Ok(block);
            }
            warn!("ZilliqaSyncManager - ds block of tx block {} not ready, waiting", height);
            tokio::select! {
                _ = self.shutdown.cancelled() => anyhow::bail!("shutdown requested"),
                _ = tokio::time::sleep(self.settings.ds_block_wait) => {}
            }
        }
    }

    /// Buffers the headers and queues the cross-chain events of block `height`.
    ///
    /// All remote reads happen before any state changes, so a failed block can
    /// be retried without buffering a header twice.
    pub async fn handle_new_block(&mut self, height: u64) -> Result<()> {
        let block = self.fetch_ready_tx_block(height).await?;

        let ds_header = if block.ds_block_num > self.current_ds_block_num {
            info!(
                "ZilliqaSyncManager - tx block {} starts ds block {}",
                height, block.ds_block_num
            );
            let ds = self
                .zil
                .get_ds_block(block.ds_block_num)
                .await
                .with_context(|| format!("Failed to get ds block {}", block.ds_block_num))?;
            Some(HeaderEnvelope::ds(ds.raw).to_bytes()?)
        } else {
            None
        };

        let stored = self
            .poly
            .get_storage(
                HEADER_SYNC_CONTRACT,
                &main_chain_key(self.settings.side_chain_id, height),
            )
            .await
            .with_context(|| format!("Failed to query synced header at {}", height))?;
        let tx_header = if stored.as_slice() == sha256(&block.header_bytes) {
            debug!("ZilliqaSyncManager - header {} already synced on poly", height);
            None
        } else {
            Some(HeaderEnvelope::tx(block.raw.clone()).to_bytes()?)
        };

        let records = self.fetch_lock_deposit_events(height).await?;

        if let Some(ds_header) = ds_header {
            self.header_buffer.push(ds_header);
            self.current_ds_block_num = block.ds_block_num;
        }
        if let Some(tx_header) = tx_header {
            self.header_buffer.push(tx_header);
        }
        for record in records {
            match self.store.put_pending(&record.serialize()).await {
                Ok(()) => info!(
                    "ZilliqaSyncManager - queued cross chain event: height {}, tx {}, index {}",
                    height,
                    hex::encode(&record.tx_id),
                    record.tx_index
                ),
                Err(e) => error!(
                    "ZilliqaSyncManager - failed to queue event of tx {} at {}: {}",
                    hex::encode(&record.tx_id),
                    height,
                    e
                ),
            }
        }
        Ok(())
    }

    /// Collects the cross-chain events of the successful transactions at `height`.
    async fn fetch_lock_deposit_events(&self, height: u64) -> Result<Vec<CrossTransfer>> {
        let txns = match self.zil.get_txn_bodies_for_tx_block(height).await {
            Ok(txns) => txns,
            Err(e) if is_empty_block_error(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.context(format!("Failed to get transactions of block {}", height))),
        };

        let mut records = Vec::new();
        for txn in &txns {
            if !txn.receipt.success {
                continue;
            }
            for event in &txn.receipt.event_logs {
                if event.event_name != CROSS_CHAIN_EVENT
                    || normalize_address(&event.address) != self.settings.cross_chain_manager
                {
                    continue;
                }
                match parse_cross_chain_event(event, &txn.id, height) {
                    Ok(record) => records.push(record),
                    Err(e) => error!(
                        "ZilliqaSyncManager - malformed cross chain event in tx {} at {}: {:#}",
                        txn.id, height, e
                    ),
                }
            }
        }
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // Header submission
    // ------------------------------------------------------------------------

    /// Submits the whole header buffer in one transaction.
    pub async fn commit_header(&mut self) -> Result<HeaderCommit> {
        info!(
            "ZilliqaSyncManager - committing {} headers up to height {}",
            self.header_buffer.len(),
            self.current_height
        );
        let tx_hash = match self
            .poly
            .sync_block_header(self.settings.side_chain_id, self.header_buffer.clone())
            .await
        {
            Ok(hash) => hash,
            Err(e) if SubmitErrorKind::classify(&e) == SubmitErrorKind::ParentMissing => {
                warn!(
                    "ZilliqaSyncManager - header batch does not connect, rolling back: {:#}",
                    e
                );
                self.rollback_to_common_ancestor().await?;
                return Ok(HeaderCommit::RolledBack);
            }
            Err(e) => return Err(e.context("Failed to sync zilliqa headers to poly")),
        };

        let confirmed = self.wait_for_poly_tx(&tx_hash).await;
        self.header_buffer.clear();
        if confirmed {
            info!(
                "ZilliqaSyncManager - header batch {} confirmed at height {}",
                tx_hash, self.current_height
            );
            if let Err(e) = self.handle_lock_deposit_events(self.current_height).await {
                error!("ZilliqaSyncManager - draining retry queue failed: {:#}", e);
            }
        } else {
            warn!("ZilliqaSyncManager - header batch {} not confirmed in time", tx_hash);
        }
        Ok(HeaderCommit::Committed { confirmed })
    }

    /// Polls poly until `tx_hash` is in a block below the chain head.
    async fn wait_for_poly_tx(&self, tx_hash: &str) -> bool {
        for _ in 0..self.settings.header_confirm_max_retries {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.settings.header_confirm_interval) => {}
            }
            let height = match self.poly.get_block_height_by_tx_hash(tx_hash).await {
                Ok(h) => h,
                Err(e) => {
                    if SubmitErrorKind::classify(&e) != SubmitErrorKind::TxPending {
                        warn!("ZilliqaSyncManager - tx {} lookup failed: {:#}", tx_hash, e);
                    }
                    continue;
                }
            };
            if height == 0 {
                continue;
            }
            match self.poly.get_current_block_height().await {
                Ok(current) if current > height => return true,
                Ok(_) => {}
                Err(e) => debug!("ZilliqaSyncManager - poly height lookup failed: {:#}", e),
            }
        }
        false
    }

    /// Walks down from the cursor to the highest height whose header hash poly
    /// also stores, then restarts the buffer from that block's DS block.
    async fn rollback_to_common_ancestor(&mut self) -> Result<()> {
        let mut height = self.current_height;
        let ancestor = loop {
            if self.shutdown.is_cancelled() {
                anyhow::bail!("shutdown requested during rollback");
            }
            let stored = self
                .poly
                .get_storage(
                    HEADER_SYNC_CONTRACT,
                    &main_chain_key(self.settings.side_chain_id, height),
                )
                .await
                .with_context(|| format!("Failed to query synced header at {}", height))?;
            if !stored.is_empty() {
                let block = self.fetch_ready_tx_block(height).await?;
                if stored.as_slice() == sha256(&block.header_bytes) {
                    break block;
                }
                debug!("ZilliqaSyncManager - header mismatch at {}", height);
            }
            height = height
                .checked_sub(1)
                .context("No common ancestor with poly found")?;
        };

        let ds = self
            .zil
            .get_ds_block(ancestor.ds_block_num)
            .await
            .with_context(|| format!("Failed to get ds block {}", ancestor.ds_block_num))?;
        self.header_buffer.clear();
        self.header_buffer.push(HeaderEnvelope::ds(ds.raw).to_bytes()?);
        self.current_ds_block_num = ancestor.ds_block_num;
        self.current_height = height;
        info!(
            "ZilliqaSyncManager - rolled back to height {}, ds block {}",
            height, self.current_ds_block_num
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Retry queue
    // ------------------------------------------------------------------------

    /// Imports queued events on poly using state proofs at `height`.
    ///
    /// Records stay queued when poly lacks capacity; every other outcome
    /// removes them. A missing proof stops the drain for this cycle.
    pub async fn handle_lock_deposit_events(&self, height: u64) -> Result<()> {
        let keys = self
            .store
            .list_pending(self.settings.retry_batch_limit)
            .await
            .context("Failed to list retry queue")?;
        if keys.is_empty() {
            return Ok(());
        }
        info!(
            "ZilliqaSyncManager - draining {} queued events at height {}",
            keys.len(),
            height
        );
        let proof_height = u32::try_from(height).context("Height does not fit in u32")?;
        let ccm = &self.settings.cross_chain_manager;

        for key in keys {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.retry_item_delay) => {}
            }

            let record = match CrossTransfer::deserialize(&key) {
                Ok(record) => record,
                Err(e) => {
                    error!("ZilliqaSyncManager - undecodable retry record {}: {}", hex::encode(&key), e);
                    continue;
                }
            };
            let tx_id = hex::encode(&record.tx_id);
            let index = match hex_index_to_decimal(&record.tx_index) {
                Ok(index) => index,
                Err(e) => {
                    error!("ZilliqaSyncManager - bad index in record of tx {}: {:#}", tx_id, e);
                    continue;
                }
            };

            let raw_key = scilla_storage_key(ccm, TX_HASH_MAP, &[index]);
            let hashed_key = hex::encode(sha256(&raw_key));
            let state_proof = self
                .zil
                .get_state_proof(ccm, &hashed_key, height)
                .await
                .with_context(|| format!("Failed to get state proof of tx {} at {}", tx_id, height))?;
            if state_proof.is_empty() {
                warn!(
                    "ZilliqaSyncManager - state proof of tx {} not available at {}",
                    tx_id, height
                );
                return Ok(());
            }

            let proof = ZilProof::new(state_proof, &raw_key, record.value.clone())
                .to_json_bytes()
                .context("Failed to serialize zilliqa proof")?;
            let request = ImportOuterTransfer {
                source_chain_id: self.settings.side_chain_id,
                value: record.value.clone(),
                height: proof_height,
                proof,
                relayer_address: self.poly.relayer_address(),
                extra: Vec::new(),
            };

            let checked_hash = match self.poly.import_outer_transfer(request).await {
                Ok(poly_tx) => {
                    info!(
                        "ZilliqaSyncManager - imported tx {} to poly: {}",
                        tx_id, poly_tx
                    );
                    poly_tx
                }
                Err(e) => match SubmitErrorKind::classify(&e) {
                    SubmitErrorKind::InsufficientCapacity => {
                        warn!(
                            "ZilliqaSyncManager - poly capacity exhausted, keeping tx {}: {:#}",
                            tx_id, e
                        );
                        continue;
                    }
                    SubmitErrorKind::AlreadyDone => {
                        debug!("ZilliqaSyncManager - tx {} already imported", tx_id);
                        tx_id.clone()
                    }
                    _ => {
                        error!(
                            "ZilliqaSyncManager - import of tx {} failed, dropping: {:#}",
                            tx_id, e
                        );
                        tx_id.clone()
                    }
                },
            };

            if let Err(e) = self.store.put_checked(&checked_hash, &key).await {
                warn!("ZilliqaSyncManager - failed to record checked tx {}: {}", checked_hash, e);
            }
            if let Err(e) = self.store.delete_pending(&key).await {
                error!("ZilliqaSyncManager - failed to remove tx {} from retry: {}", tx_id, e);
            }
        }
        Ok(())
    }
}
