//! Poly → Zilliqa Monitor
//!
//! Walks poly blocks in order, a configured number of blocks behind the head.
//! For every `makeProof` notification addressed to this side chain it recovers
//! the transfer from poly's cross-states proof and relays it into the zilliqa
//! cross-chain manager through a checked-out signer. Committee rotations with
//! no transfers are relayed as `changeBookKeeper` calls.
//!
//! A height is persisted only after every notification in it was dispatched,
//! so a failed height is retried on the next tick.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{PolyClient, PolyHeader, ZilliqaClient};
use crate::codec::{parse_audit_path, ToMerkleValue};
use crate::config::{normalize_address, Config, DispatchStrategy};
use crate::error::RelayerError;
use crate::sender::{DepositOutcome, DepositRelay, SenderPool};
use crate::storage::RelayerStore;

/// Notification method emitted by the poly entrance contract for outbound transfers.
const MAKE_PROOF: &str = "makeProof";
/// Cross-chain manager field holding the height of the latest committee rotation.
const CUR_EPOCH_START_HEIGHT: &str = "curEpochStartHeight";

// ============================================================================
// EPOCH ANCHOR SELECTION
// ============================================================================

/// Heights of the anchor header and of the merkle proof linking it to the
/// header being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorProof {
    pub anchor_height: u32,
    pub proof_block_height: u32,
    pub proof_root_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPlan {
    /// Whether the block is covered by the committee zilliqa currently trusts
    pub is_current: bool,
    pub anchor: Option<AnchorProof>,
}

/// Chooses the anchor header for a block at `height`.
///
/// `last_epoch_start` is the height of the latest committee rotation known to
/// zilliqa and `is_epoch_change` tells whether the header at `height + 1`
/// rotates the committee.
///
/// - Outside the current epoch the header after the last rotation anchors the proof.
/// - An epoch-change block inside the current epoch is anchored by the next header.
/// - Otherwise the header at `height + 1` is verified directly.
///
/// Heights at or past `last_epoch_start` are never current. Since the cursor
/// starts no lower than `last_epoch_start`, steady-state heights are always
/// anchored after the last rotation, and a rotation found there is not relayed
/// as a header-only `changeBookKeeper` call.
pub fn select_anchor(height: u32, last_epoch_start: u32, is_epoch_change: bool) -> AnchorPlan {
    let header_height = height.saturating_add(1);
    let is_current = header_height <= last_epoch_start;

    let anchor = if !is_current {
        let anchor_height = last_epoch_start.saturating_add(1);
        Some(AnchorProof {
            anchor_height,
            proof_block_height: header_height,
            proof_root_height: anchor_height,
        })
    } else if is_epoch_change {
        let anchor_height = height.saturating_add(2);
        Some(AnchorProof {
            anchor_height,
            proof_block_height: header_height,
            proof_root_height: anchor_height,
        })
    } else {
        None
    };

    AnchorPlan { is_current, anchor }
}

/// Returns the cross-states key of a `makeProof` notification bound for
/// `side_chain_id`, or `None` for any other notification.
///
/// States are positional: `[0]` method, `[2]` destination chain id, `[5]` key.
pub fn parse_make_proof_notify(states: &serde_json::Value, side_chain_id: u64) -> Option<String> {
    let states = states.as_array()?;
    if states.first()?.as_str()? != MAKE_PROOF {
        return None;
    }
    let to_chain = states.get(2)?;
    let to_chain = to_chain
        .as_u64()
        .or_else(|| to_chain.as_f64().map(|f| f as u64))?;
    if to_chain != side_chain_id {
        return None;
    }
    states.get(5)?.as_str().map(str::to_string)
}

// ============================================================================
// SYNC MANAGER
// ============================================================================

/// Header and proof material shared by every transfer of one poly height.
struct HeightContext {
    header: PolyHeader,
    plan: AnchorPlan,
    is_epoch_change: bool,
    anchor: Option<(PolyHeader, Vec<u8>)>,
}

pub struct PolySyncManager {
    config: Arc<Config>,
    zil: Arc<dyn ZilliqaClient>,
    poly: Arc<dyn PolyClient>,
    store: Arc<RelayerStore>,
    pool: Arc<SenderPool>,
    shutdown: CancellationToken,
    /// Next poly height to process
    current_height: u32,
}

impl PolySyncManager {
    /// Creates the manager and resolves its starting height.
    ///
    /// A configured start height wins. Otherwise the relayer resumes after the
    /// persisted height, but never before the latest committee rotation known
    /// to zilliqa. The rotation height is only required when nothing is persisted.
    pub async fn new(
        config: Arc<Config>,
        zil: Arc<dyn ZilliqaClient>,
        poly: Arc<dyn PolyClient>,
        store: Arc<RelayerStore>,
        pool: Arc<SenderPool>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let mut manager = Self {
            config,
            zil,
            poly,
            store,
            pool,
            shutdown,
            current_height: 0,
        };

        let configured = manager.config.poly.start_height;
        manager.current_height = if configured > 0 {
            configured
        } else {
            let persisted = manager.store.poly_height().await?;
            if persisted > 0 {
                let resume = persisted.saturating_add(1);
                match manager.current_epoch_start_height().await {
                    Ok(epoch_start) => resume.max(epoch_start),
                    Err(e) => {
                        warn!(
                            "PolySyncManager - epoch start query failed, resuming from stored height {}: {:#}",
                            resume, e
                        );
                        resume
                    }
                }
            } else {
                manager.current_epoch_start_height().await?
            }
        };
        if manager.current_height == 0 {
            return Err(RelayerError::PolyStartHeightMissing.into());
        }

        info!("PolySyncManager - start height {}", manager.current_height);
        Ok(manager)
    }

    pub fn current_height(&self) -> u32 {
        self.current_height
    }

    /// Height of the latest committee rotation recorded by the zilliqa cross-chain manager.
    async fn current_epoch_start_height(&self) -> Result<u32> {
        let state = self
            .zil
            .get_smart_contract_sub_state(&self.config.cross_chain_manager(), CUR_EPOCH_START_HEIGHT, &[])
            .await
            .context("Failed to query curEpochStartHeight")?;
        let Some(value) = state.get(CUR_EPOCH_START_HEIGHT) else {
            return Ok(0);
        };
        match value {
            serde_json::Value::String(s) => s
                .trim()
                .parse()
                .with_context(|| format!("Invalid curEpochStartHeight '{}'", s)),
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .with_context(|| format!("Invalid curEpochStartHeight {}", n)),
            other => anyhow::bail!("Unexpected curEpochStartHeight value {}", other),
        }
    }

    /// Runs the monitor loop until shutdown.
    pub async fn run(mut self) {
        info!("PolySyncManager - start scan block at height {}", self.current_height);
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.poly.monitor_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("PolySyncManager - shutting down at height {}", self.current_height);
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.monitor_tick().await {
                        error!("PolySyncManager - tick failed at height {}: {:#}", self.current_height, e);
                    }
                }
            }
        }
    }

    /// Processes every height that is at least `useful_block_num` blocks
    /// behind the latest poly block. Stops at the first failed height.
    pub async fn monitor_tick(&mut self) -> Result<()> {
        let latest = self
            .poly
            .get_current_block_height()
            .await
            .context("Failed to get current poly height")?
            .saturating_sub(1);
        let useful = self.config.relayer.useful_block_num;
        debug!(
            "PolySyncManager - current height {}, latest {}",
            self.current_height, latest
        );

        while self.current_height.saturating_add(useful) <= latest {
            if self.shutdown.is_cancelled() {
                break;
            }
            let height = self.current_height;
            self.handle_deposit_events(height)
                .await
                .with_context(|| format!("Failed to handle poly height {}", height))?;

            if let Err(e) = self.store.set_poly_height(height).await {
                error!("PolySyncManager - failed to save height {}: {}", height, e);
            }
            self.current_height = height + 1;
        }
        Ok(())
    }

    /// Relays every `makeProof` notification at `height`, or the committee
    /// rotation at `height + 1` when there is none.
    pub async fn handle_deposit_events(&self, height: u32) -> Result<()> {
        let last_epoch_start = self.current_epoch_start_height().await?;

        let header = self
            .poly
            .get_header_by_height(height + 1)
            .await
            .with_context(|| format!("Failed to get poly header {}", height + 1))?;
        let is_epoch_change = header.has_next_bookkeeper()
            && match header.block_info() {
                Ok(info) => info.new_chain_config.is_some(),
                Err(e) => {
                    error!(
                        "PolySyncManager - unparseable consensus payload at {}: {}",
                        height + 1,
                        e
                    );
                    false
                }
            };
        let plan = select_anchor(height, last_epoch_start, is_epoch_change);
        let mut ctx = HeightContext {
            header,
            plan,
            is_epoch_change,
            anchor: None,
        };

        let events = self
            .poly
            .get_smart_contract_events_by_block(height)
            .await
            .with_context(|| format!("Failed to get poly events at {}", height))?;

        let entrance = normalize_address(&self.config.poly.entrance_contract_address);
        let side_chain_id = self.config.zil.side_chain_id;
        let mut matched = 0usize;
        for event in &events {
            for notify in &event.notify {
                if normalize_address(&notify.contract_address) != entrance {
                    continue;
                }
                let Some(key) = parse_make_proof_notify(&notify.states, side_chain_id) else {
                    continue;
                };
                matched += 1;
                self.relay_transfer(height, &event.tx_hash, &key, &mut ctx).await?;
            }
        }

        if matched == 0 && ctx.is_epoch_change && ctx.plan.is_current {
            info!(
                "PolySyncManager - committee rotation at {} without transfers, relaying header",
                ctx.header.height
            );
            let sender = self.pool.checkout(self.config.relayer.dispatch).await?;
            sender.commit_header(&ctx.header).await?;
        }
        Ok(())
    }

    /// Recovers one transfer from its cross-states proof and dispatches it.
    ///
    /// Malformed proof data skips the transfer. Remote failures fail the height.
    async fn relay_transfer(
        &self,
        height: u32,
        poly_tx_hash: &str,
        key: &str,
        ctx: &mut HeightContext,
    ) -> Result<()> {
        let proof = self
            .poly
            .get_cross_states_proof(height.saturating_sub(1), key)
            .await
            .with_context(|| format!("Failed to get cross states proof for poly tx {}", poly_tx_hash))?;

        let raw_audit_path = match hex::decode(&proof.audit_path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("PolySyncManager - bad audit path hex in poly tx {}: {}", poly_tx_hash, e);
                return Ok(());
            }
        };
        let param = match parse_audit_path(&raw_audit_path)
            .and_then(|path| ToMerkleValue::deserialize(&path.value))
        {
            Ok(param) => param,
            Err(e) => {
                error!("PolySyncManager - malformed cross states proof in poly tx {}: {}", poly_tx_hash, e);
                return Ok(());
            }
        };

        let to_contract = hex::encode(&param.make_tx_param.to_contract_address);
        if !self.config.is_target_contract(&to_contract, param.from_chain_id) {
            info!(
                "PolySyncManager - skipping poly tx {}: target contract {} from chain {} not allowed",
                poly_tx_hash, to_contract, param.from_chain_id
            );
            return Ok(());
        }

        if ctx.anchor.is_none() {
            if let Some(proof) = ctx.plan.anchor {
                ctx.anchor = Some(self.fetch_anchor(proof).await?);
            }
        }
        let (anchor, header_proof) = match &ctx.anchor {
            Some((anchor, header_proof)) => (Some(anchor), header_proof.as_slice()),
            None => (None, &[][..]),
        };

        let relay = DepositRelay {
            header: &ctx.header,
            param: &param,
            header_proof,
            anchor,
            poly_tx_hash,
            raw_audit_path: &raw_audit_path,
        };
        self.dispatch(&relay).await
    }

    /// Fetches the anchor header and the merkle proof from the relayed header to it.
    async fn fetch_anchor(&self, proof: AnchorProof) -> Result<(PolyHeader, Vec<u8>)> {
        let anchor = self
            .poly
            .get_header_by_height(proof.anchor_height)
            .await
            .with_context(|| format!("Failed to get anchor header {}", proof.anchor_height))?;
        let merkle = self
            .poly
            .get_merkle_proof(proof.proof_block_height, proof.proof_root_height)
            .await
            .with_context(|| {
                format!(
                    "Failed to get merkle proof ({}, {})",
                    proof.proof_block_height, proof.proof_root_height
                )
            })?;
        let header_proof = hex::decode(&merkle.audit_path).with_context(|| {
            format!(
                "Invalid merkle proof hex ({}, {})",
                proof.proof_block_height, proof.proof_root_height
            )
        })?;
        Ok((anchor, header_proof))
    }

    async fn dispatch(&self, relay: &DepositRelay<'_>) -> Result<()> {
        let strategy: DispatchStrategy = self.config.relayer.dispatch;
        let sender = self.pool.checkout(strategy).await?;
        match sender.commit_deposit(relay).await? {
            DepositOutcome::Submitted(txn) => debug!(
                "PolySyncManager - poly tx {} relayed by {} as {}",
                relay.poly_tx_hash,
                sender.address(),
                txn.id
            ),
            DepositOutcome::AlreadyRelayed => warn!(
                "PolySyncManager - poly tx {} was already relayed",
                relay.poly_tx_hash
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_make_proof_notify() {
        let states = json!(["makeProof", "ignored", 18, 2, "", "abcd"]);
        assert_eq!(parse_make_proof_notify(&states, 18), Some("abcd".to_string()));
        assert_eq!(parse_make_proof_notify(&states, 19), None);

        let other = json!(["btcTxToRelay", "ignored", 18, 2, "", "abcd"]);
        assert_eq!(parse_make_proof_notify(&other, 18), None);

        let short = json!(["makeProof", "ignored", 18]);
        assert_eq!(parse_make_proof_notify(&short, 18), None);
        assert_eq!(parse_make_proof_notify(&json!("makeProof"), 18), None);
    }

    #[test]
    fn test_select_anchor_outside_epoch() {
        let plan = select_anchor(150, 100, false);
        assert!(!plan.is_current);
        assert_eq!(
            plan.anchor,
            Some(AnchorProof {
                anchor_height: 101,
                proof_block_height: 151,
                proof_root_height: 101,
            })
        );
    }

    #[test]
    fn test_select_anchor_no_anchor_inside_epoch() {
        let plan = select_anchor(50, 100, false);
        assert!(plan.is_current);
        assert_eq!(plan.anchor, None);
    }
}
