//! Chain B (Poly) adapter interface and header-sync storage layout.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Native header-sync contract holding synced side-chain headers.
pub const HEADER_SYNC_CONTRACT: &str = "0300000000000000000000000000000000000000";

const CURRENT_HEADER_HEIGHT: &[u8] = b"currentHeaderHeight";
const MAIN_CHAIN: &[u8] = b"mainChain";

/// Storage key of the latest synced tx-block height of a side chain.
pub fn current_header_height_key(side_chain_id: u64) -> Vec<u8> {
    let mut key = CURRENT_HEADER_HEIGHT.to_vec();
    key.extend_from_slice(&side_chain_id.to_le_bytes());
    key
}

/// Storage key of the synced header hash of a side chain at `height`.
pub fn main_chain_key(side_chain_id: u64, height: u64) -> Vec<u8> {
    let mut key = MAIN_CHAIN.to_vec();
    key.extend_from_slice(&side_chain_id.to_le_bytes());
    key.extend_from_slice(&height.to_le_bytes());
    key
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A poly block header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyHeader {
    pub height: u32,
    /// Unsigned header serialization, as verified by the zilliqa contract
    pub message: Vec<u8>,
    /// Committee signatures over the header
    pub sig_data: Vec<Vec<u8>>,
    pub next_bookkeeper: [u8; 20],
    /// JSON-encoded vbft block info
    pub consensus_payload: Vec<u8>,
}

impl PolyHeader {
    pub fn has_next_bookkeeper(&self) -> bool {
        self.next_bookkeeper != [0u8; 20]
    }

    pub fn block_info(&self) -> serde_json::Result<VbftBlockInfo> {
        serde_json::from_slice(&self.consensus_payload)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    #[serde(default)]
    pub index: u32,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// Consensus payload of a poly header. Only the committee rotation is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VbftBlockInfo {
    #[serde(default)]
    pub new_chain_config: Option<ChainConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notify {
    pub contract_address: String,
    /// Positional notification fields
    pub states: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartContractEvent {
    pub tx_hash: String,
    #[serde(default)]
    pub notify: Vec<Notify>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MerkleProof {
    /// Hex audit path
    pub audit_path: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossStatesProof {
    /// Hex audit path
    pub audit_path: String,
}

/// Arguments of the poly `importOuterTransfer` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOuterTransfer {
    pub source_chain_id: u64,
    pub value: Vec<u8>,
    pub height: u32,
    /// JSON-serialized zilliqa state proof
    pub proof: Vec<u8>,
    /// Relayer's poly account
    pub relayer_address: Vec<u8>,
    pub extra: Vec<u8>,
}

// ============================================================================
// CLIENT INTERFACE
// ============================================================================

/// Read and submit operations on chain B. Submissions are signed with the
/// relayer's poly wallet held by the implementation.
#[async_trait]
pub trait PolyClient: Send + Sync {
    async fn get_current_block_height(&self) -> Result<u32>;

    async fn get_header_by_height(&self, height: u32) -> Result<PolyHeader>;

    /// Proof that the header at `block_height` is committed by the header at `root_height`.
    async fn get_merkle_proof(&self, block_height: u32, root_height: u32) -> Result<MerkleProof>;

    async fn get_smart_contract_events_by_block(&self, height: u32) -> Result<Vec<SmartContractEvent>>;

    async fn get_cross_states_proof(&self, height: u32, key: &str) -> Result<CrossStatesProof>;

    /// Raw contract storage value; empty when the key is absent.
    async fn get_storage(&self, contract: &str, key: &[u8]) -> Result<Vec<u8>>;

    /// Height of the block containing `tx_hash`. Unknown transactions are
    /// reported as JSON-RPC error 42002.
    async fn get_block_height_by_tx_hash(&self, tx_hash: &str) -> Result<u32>;

    /// Submits serialized side-chain headers; returns the transaction hash.
    async fn sync_block_header(&self, side_chain_id: u64, headers: Vec<Vec<u8>>) -> Result<String>;

    /// Submits one outer transfer with its proof; returns the transaction hash.
    async fn import_outer_transfer(&self, request: ImportOuterTransfer) -> Result<String>;

    /// Address bytes of the relayer's poly account.
    fn relayer_address(&self) -> Vec<u8>;
}
