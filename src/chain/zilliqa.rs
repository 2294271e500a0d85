//! Chain A (Zilliqa) adapter interface.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// DS block number reported by a tx block whose DS block is not yet available.
pub const DS_BLOCK_NOT_READY: u64 = u64::MAX;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A zilliqa tx block as needed by the relayer.
#[derive(Debug, Clone, PartialEq)]
pub struct TxBlock {
    pub block_num: u64,
    /// DS block this tx block belongs to (`DS_BLOCK_NOT_READY` while pending)
    pub ds_block_num: u64,
    /// Canonical header serialization; its SHA-256 is what poly stores per height
    pub header_bytes: Vec<u8>,
    /// Full block in the JSON shape the poly header-sync contract decodes
    pub raw: serde_json::Value,
}

/// A zilliqa DS block.
#[derive(Debug, Clone, PartialEq)]
pub struct DsBlock {
    pub block_num: u64,
    /// Full block in the JSON shape the poly header-sync contract decodes
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventParam {
    pub vname: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    /// Emitting contract (base16)
    pub address: String,
    #[serde(rename = "_eventname")]
    pub event_name: String,
    pub params: Vec<EventParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub success: bool,
    #[serde(default)]
    pub event_logs: Vec<EventLog>,
}

/// One executed transaction of a tx block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxnBody {
    #[serde(rename = "ID")]
    pub id: String,
    pub receipt: TxReceipt,
}

/// Merkle proof of one contract state entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProof {
    #[serde(rename = "accountProof", default)]
    pub account_proof: Vec<String>,
    #[serde(rename = "stateProof", default)]
    pub state_proof: Vec<String>,
}

impl StateProof {
    /// A proof with no nodes means the state is not yet available at that height.
    pub fn is_empty(&self) -> bool {
        self.account_proof.is_empty() && self.state_proof.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceAndNonce {
    pub balance: String,
    pub nonce: u64,
}

/// A signed zilliqa transaction as submitted by the relayer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZilTransaction {
    /// Transaction hash (hex)
    pub id: String,
    pub nonce: u64,
    /// Signed payload accepted by `CreateTransaction`, resubmitted verbatim when stuck
    pub payload: serde_json::Value,
}

// ============================================================================
// CLIENT INTERFACE
// ============================================================================

/// Read and submit operations on chain A.
#[async_trait]
pub trait ZilliqaClient: Send + Sync {
    async fn get_latest_tx_block_num(&self) -> Result<u64>;

    async fn get_tx_block(&self, height: u64) -> Result<TxBlock>;

    async fn get_ds_block(&self, height: u64) -> Result<DsBlock>;

    /// Transactions of a tx block. Nodes report an empty block as an error
    /// containing "TxBlock has no transactions".
    async fn get_txn_bodies_for_tx_block(&self, height: u64) -> Result<Vec<TxnBody>>;

    /// Proof of `contract`'s state entry `hashed_key` (hex of SHA-256 of the raw key) at `height`.
    async fn get_state_proof(&self, contract: &str, hashed_key: &str, height: u64) -> Result<StateProof>;

    /// The `result` object of a contract sub-state query.
    async fn get_smart_contract_sub_state(
        &self,
        contract: &str,
        variable: &str,
        indices: &[String],
    ) -> Result<serde_json::Value>;

    async fn get_balance(&self, address: &str) -> Result<BalanceAndNonce>;

    /// Whether the transaction has been confirmed with a receipt.
    async fn is_transaction_confirmed(&self, tx_hash: &str) -> Result<bool>;

    /// Broadcasts a signed payload; returns the transaction hash.
    async fn create_transaction(&self, payload: &serde_json::Value) -> Result<String>;
}
