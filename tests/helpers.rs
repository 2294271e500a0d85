//! Shared test helpers for relayer tests
//!
//! Constants, a default configuration and in-memory chain adapters used by
//! the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zilliqa_relayer::chain::poly::{current_header_height_key, main_chain_key};
use zilliqa_relayer::chain::zilliqa::DS_BLOCK_NOT_READY;
use zilliqa_relayer::chain::{
    BalanceAndNonce, ChangeBookKeeperRequest, CrossChainProxy, CrossStatesProof, DsBlock, EventLog,
    EventParam, ImportOuterTransfer, MerkleProof, PolyClient, PolyHeader, SmartContractEvent,
    StateProof, TxBlock, TxReceipt, TxnBody, VerifyHeaderRequest, ZilTransaction, ZilliqaClient,
};
use zilliqa_relayer::config::{
    Config, PolyConfig, RelayerTuning, StorageConfig, ZilConfig,
};
use zilliqa_relayer::credentials::SigningAccount;
use zilliqa_relayer::crypto::sha256;

// ============================================================================
// CONSTANTS
// ============================================================================

// ------------------------------- CHAINS ---------------------------------

/// Dummy side chain id of the zilliqa chain on poly
pub const DUMMY_SIDE_CHAIN_ID: u64 = 111;

/// Dummy origin chain id of a poly → zilliqa transfer
pub const DUMMY_FROM_CHAIN_ID: u64 = 5;

// ----------------------------- CONTRACTS --------------------------------

/// Dummy cross-chain manager (base16, 40 hex characters)
pub const DUMMY_CCM_ADDR: &str = "0x000000000000000000000000000000000000000a";

/// Dummy cross-chain manager proxy (base16, 40 hex characters)
pub const DUMMY_CCM_PROXY_ADDR: &str = "0x000000000000000000000000000000000000000b";

/// Dummy poly entrance contract
pub const DUMMY_ENTRANCE_ADDR: &str = "0300000000000000000000000000000000000000";

/// Dummy destination contract on zilliqa
pub const DUMMY_TARGET_CONTRACT: &str = "000000000000000000000000000000000000000c";

// ------------------------------- SIGNERS --------------------------------

/// Dummy signer addresses (base16, 40 hex characters)
pub const DUMMY_SIGNER_ADDR_1: &str = "0000000000000000000000000000000000000001";
pub const DUMMY_SIGNER_ADDR_2: &str = "0000000000000000000000000000000000000002";

/// Dummy private key (64 hex characters)
pub const DUMMY_PRIVATE_KEY: &str =
    "0000000000000000000000000000000000000000000000000000000000000003";

// -------------------------------- OTHER ---------------------------------

/// Dummy zilliqa transaction hash (64 hex characters)
pub const DUMMY_ZIL_TX_HASH: &str =
    "00000000000000000000000000000000000000000000000000000000000000d1";

/// Dummy poly transaction hash (64 hex characters)
pub const DUMMY_POLY_TX_HASH: &str =
    "00000000000000000000000000000000000000000000000000000000000000e1";

/// Compressed secp256k1 generator point
pub const DUMMY_PEER_KEY_G: &str =
    "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

/// Compressed secp256k1 point 2G
pub const DUMMY_PEER_KEY_2G: &str =
    "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Create a default config with fast timings, storing the database at `db_path`.
/// This can be customized using Rust's struct update syntax.
pub fn build_test_config(db_path: &str) -> Config {
    Config {
        zil: ZilConfig {
            api_endpoint: "http://127.0.0.1:4201".to_string(),
            chain_id: 333,
            message_version: 1,
            monitor_interval_secs: 1,
            headers_per_batch: 50,
            force_height: 0,
            side_chain_id: DUMMY_SIDE_CHAIN_ID,
            cross_chain_manager_contract: DUMMY_CCM_ADDR.to_string(),
            cross_chain_manager_proxy_contract: DUMMY_CCM_PROXY_ADDR.to_string(),
            max_exist_tx_epoch: 3,
            keystore_path: "keystore".to_string(),
            keystore_passwords: HashMap::new(),
        },
        poly: PolyConfig {
            wallet_file: "wallet.dat".to_string(),
            wallet_password: String::new(),
            start_height: 0,
            monitor_interval_secs: 1,
            entrance_contract_address: DUMMY_ENTRANCE_ADDR.to_string(),
            rest_url: "http://127.0.0.1:40336".to_string(),
        },
        storage: StorageConfig {
            path: db_path.to_string(),
            remove_db: false,
        },
        target_contracts: HashMap::new(),
        relayer: RelayerTuning {
            sender_backoff_secs: 0,
            retry_item_delay_ms: 0,
            header_confirm_interval_ms: 1,
            header_confirm_max_retries: 5,
            ds_block_wait_ms: 1,
            audit_log_path: None,
            ..RelayerTuning::default()
        },
    }
}

pub fn signing_account(address: &str) -> SigningAccount {
    SigningAccount {
        address: address.to_string(),
        private_key: DUMMY_PRIVATE_KEY.to_string(),
    }
}

// ============================================================================
// ZILLIQA MOCK
// ============================================================================

/// Header serialization of a dummy tx block.
pub fn tx_header_bytes(height: u64) -> Vec<u8> {
    format!("tx-header-{}", height).into_bytes()
}

/// A ready tx block belonging to DS block `ds_block_num`.
pub fn create_tx_block(height: u64, ds_block_num: u64) -> TxBlock {
    TxBlock {
        block_num: height,
        ds_block_num,
        header_bytes: tx_header_bytes(height),
        raw: json!({"header": {"BlockNum": height, "DSBlockNum": ds_block_num}}),
    }
}

/// A successful transaction emitting one `CrossChainEvent` from the cross-chain manager.
pub fn create_cross_chain_txn(tx_id: &str, index_hex: &str, raw_data: &str) -> TxnBody {
    TxnBody {
        id: tx_id.to_string(),
        receipt: TxReceipt {
            success: true,
            event_logs: vec![EventLog {
                address: DUMMY_CCM_ADDR.to_string(),
                event_name: "CrossChainEvent".to_string(),
                params: vec![
                    EventParam {
                        vname: "txId".to_string(),
                        param_type: "Uint256".to_string(),
                        value: json!(index_hex),
                    },
                    EventParam {
                        vname: "toChainId".to_string(),
                        param_type: "Uint64".to_string(),
                        value: json!("2"),
                    },
                    EventParam {
                        vname: "rawdata".to_string(),
                        param_type: "ByStr".to_string(),
                        value: json!(raw_data),
                    },
                ],
            }],
        },
    }
}

#[derive(Default)]
pub struct ZilState {
    pub latest: u64,
    pub tx_blocks: HashMap<u64, TxBlock>,
    pub txns: HashMap<u64, Vec<TxnBody>>,
    /// height → number of upcoming fetches reporting the DS block as not ready
    pub ds_not_ready: HashMap<u64, usize>,
    /// Heights passed to `get_tx_block`, in call order
    pub tx_block_fetches: Vec<u64>,
    /// Returned by every state proof query; empty means not yet available
    pub state_proof: StateProof,
    pub state_proof_queries: Vec<(String, u64)>,
    /// variable → `result` object of sub-state queries
    pub sub_states: HashMap<String, Value>,
    pub nonces: HashMap<String, u64>,
    pub confirmed: HashSet<String>,
    /// Payloads passed to `create_transaction`
    pub broadcasts: Vec<Value>,
}

#[derive(Default)]
pub struct MockZilliqa {
    pub state: Mutex<ZilState>,
}

impl MockZilliqa {
    /// Chain with tx blocks `1..=latest`, every block in DS block 1.
    pub fn with_blocks(latest: u64) -> Self {
        let mock = Self::default();
        {
            let mut state = mock.state.lock().unwrap();
            state.latest = latest;
            for h in 1..=latest {
                state.tx_blocks.insert(h, create_tx_block(h, 1));
            }
        }
        mock
    }

    pub fn set_epoch_start(&self, height: u32) {
        self.state.lock().unwrap().sub_states.insert(
            "curEpochStartHeight".to_string(),
            json!({"curEpochStartHeight": height.to_string()}),
        );
    }
}

#[async_trait]
impl ZilliqaClient for MockZilliqa {
    async fn get_latest_tx_block_num(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().latest)
    }

    async fn get_tx_block(&self, height: u64) -> Result<TxBlock> {
        let mut state = self.state.lock().unwrap();
        state.tx_block_fetches.push(height);
        let mut block = state
            .tx_blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("tx block {} not found", height))?;
        if let Some(remaining) = state.ds_not_ready.get_mut(&height) {
            if *remaining > 0 {
                *remaining -= 1;
                block.ds_block_num = DS_BLOCK_NOT_READY;
            }
        }
        Ok(block)
    }

    async fn get_ds_block(&self, height: u64) -> Result<DsBlock> {
        Ok(DsBlock {
            block_num: height,
            raw: json!({"header": {"BlockNum": height}}),
        })
    }

    async fn get_txn_bodies_for_tx_block(&self, height: u64) -> Result<Vec<TxnBody>> {
        match self.state.lock().unwrap().txns.get(&height) {
            Some(txns) => Ok(txns.clone()),
            None => anyhow::bail!("TxBlock has no transactions"),
        }
    }

    async fn get_state_proof(&self, _contract: &str, hashed_key: &str, height: u64) -> Result<StateProof> {
        let mut state = self.state.lock().unwrap();
        state.state_proof_queries.push((hashed_key.to_string(), height));
        Ok(state.state_proof.clone())
    }

    async fn get_smart_contract_sub_state(
        &self,
        _contract: &str,
        variable: &str,
        _indices: &[String],
    ) -> Result<Value> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sub_states
            .get(variable)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn get_balance(&self, address: &str) -> Result<BalanceAndNonce> {
        let state = self.state.lock().unwrap();
        match state.nonces.get(address) {
            Some(nonce) => Ok(BalanceAndNonce {
                balance: "1000000000000".to_string(),
                nonce: *nonce,
            }),
            None => anyhow::bail!("Account is not created"),
        }
    }

    async fn is_transaction_confirmed(&self, tx_hash: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().confirmed.contains(tx_hash))
    }

    async fn create_transaction(&self, payload: &Value) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.broadcasts.push(payload.clone());
        Ok(payload["id"].as_str().unwrap_or_default().to_string())
    }
}

// ============================================================================
// POLY MOCK
// ============================================================================

#[derive(Default)]
pub struct PolyState {
    pub current_height: u32,
    pub headers: HashMap<u32, PolyHeader>,
    pub events: HashMap<u32, Vec<SmartContractEvent>>,
    /// cross-states key → hex audit path
    pub cross_states: HashMap<String, String>,
    pub storage: HashMap<Vec<u8>, Vec<u8>>,
    /// Header batches accepted by `sync_block_header`
    pub synced_batches: Vec<Vec<Vec<u8>>>,
    /// Returned once by the next `sync_block_header` call
    pub sync_error: Option<String>,
    pub imports: Vec<ImportOuterTransfer>,
    /// Returned by every `import_outer_transfer` call while set
    pub import_error: Option<String>,
    pub merkle_proofs: Vec<(u32, u32)>,
}

#[derive(Default)]
pub struct MockPoly {
    pub state: Mutex<PolyState>,
}

impl MockPoly {
    /// Records `synced_height` as the latest zilliqa header synced on poly.
    pub fn set_synced_height(&self, synced_height: u64) {
        self.state.lock().unwrap().storage.insert(
            current_header_height_key(DUMMY_SIDE_CHAIN_ID),
            synced_height.to_le_bytes().to_vec(),
        );
    }

    /// Stores the hash of the dummy zilliqa header at `height`, as poly does once synced.
    pub fn store_header_hash(&self, height: u64, header_bytes: &[u8]) {
        self.state.lock().unwrap().storage.insert(
            main_chain_key(DUMMY_SIDE_CHAIN_ID, height),
            sha256(header_bytes).to_vec(),
        );
    }
}

#[async_trait]
impl PolyClient for MockPoly {
    async fn get_current_block_height(&self) -> Result<u32> {
        Ok(self.state.lock().unwrap().current_height)
    }

    async fn get_header_by_height(&self, height: u32) -> Result<PolyHeader> {
        let state = self.state.lock().unwrap();
        Ok(state.headers.get(&height).cloned().unwrap_or_else(|| create_poly_header(height)))
    }

    async fn get_merkle_proof(&self, block_height: u32, root_height: u32) -> Result<MerkleProof> {
        self.state
            .lock()
            .unwrap()
            .merkle_proofs
            .push((block_height, root_height));
        Ok(MerkleProof {
            audit_path: "abcd".to_string(),
        })
    }

    async fn get_smart_contract_events_by_block(&self, height: u32) -> Result<Vec<SmartContractEvent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_cross_states_proof(&self, _height: u32, key: &str) -> Result<CrossStatesProof> {
        self.state
            .lock()
            .unwrap()
            .cross_states
            .get(key)
            .map(|audit_path| CrossStatesProof {
                audit_path: audit_path.clone(),
            })
            .ok_or_else(|| anyhow::anyhow!("no cross states proof for {}", key))
    }

    async fn get_storage(&self, _contract: &str, key: &[u8]) -> Result<Vec<u8>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .storage
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_block_height_by_tx_hash(&self, _tx_hash: &str) -> Result<u32> {
        Ok(1)
    }

    async fn sync_block_header(&self, _side_chain_id: u64, headers: Vec<Vec<u8>>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.sync_error.take() {
            anyhow::bail!(err);
        }
        state.synced_batches.push(headers);
        Ok(DUMMY_POLY_TX_HASH.to_string())
    }

    async fn import_outer_transfer(&self, request: ImportOuterTransfer) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.import_error {
            anyhow::bail!(err.clone());
        }
        state.imports.push(request);
        Ok(format!("{:064x}", state.imports.len()))
    }

    fn relayer_address(&self) -> Vec<u8> {
        vec![0xAA; 20]
    }
}

// ============================================================================
// POLY FIXTURES
// ============================================================================

/// A poly consensus signature: scheme byte, then `v‖r‖s`.
pub fn create_poly_signature(fill: u8) -> Vec<u8> {
    let mut sig = vec![0x01, 27];
    sig.extend_from_slice(&[fill; 64]);
    sig
}

/// A poly header without committee rotation.
pub fn create_poly_header(height: u32) -> PolyHeader {
    PolyHeader {
        height,
        message: format!("poly-header-{}", height).into_bytes(),
        sig_data: vec![create_poly_signature(height as u8)],
        next_bookkeeper: [0u8; 20],
        consensus_payload: br#"{"leader":1}"#.to_vec(),
    }
}

/// A poly header that rotates the committee to the keys G and 2G.
pub fn create_epoch_change_header(height: u32) -> PolyHeader {
    let payload = json!({
        "leader": 1,
        "new_chain_config": {
            "peers": [
                {"index": 1, "id": format!("1205{}", DUMMY_PEER_KEY_2G)},
                {"index": 2, "id": format!("1205{}", DUMMY_PEER_KEY_G)},
            ]
        }
    });
    PolyHeader {
        next_bookkeeper: [1u8; 20],
        consensus_payload: serde_json::to_vec(&payload).unwrap(),
        ..create_poly_header(height)
    }
}

/// A `makeProof` event of the entrance contract for `side_chain_id`.
pub fn create_make_proof_event(tx_hash: &str, side_chain_id: u64, key: &str) -> SmartContractEvent {
    SmartContractEvent {
        tx_hash: tx_hash.to_string(),
        notify: vec![zilliqa_relayer::chain::Notify {
            contract_address: DUMMY_ENTRANCE_ADDR.to_string(),
            states: json!(["makeProof", "ethereum", side_chain_id, 1, "", key]),
        }],
    }
}

// ============================================================================
// PROXY MOCK
// ============================================================================

#[derive(Default)]
pub struct ProxyState {
    /// (signer, request, nonce)
    pub verify_calls: Vec<(String, VerifyHeaderRequest, u64)>,
    pub change_calls: Vec<(String, ChangeBookKeeperRequest, u64)>,
    /// Returned by every call while set
    pub error: Option<String>,
}

#[derive(Default)]
pub struct MockProxy {
    pub state: Mutex<ProxyState>,
    /// Simulated broadcast latency
    pub delay: Duration,
    counter: AtomicU64,
}

impl MockProxy {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn transaction(&self, nonce: u64) -> ZilTransaction {
        let id = format!("{:064x}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        ZilTransaction {
            id: id.clone(),
            nonce,
            payload: json!({"id": id, "nonce": nonce}),
        }
    }
}

#[async_trait]
impl CrossChainProxy for MockProxy {
    async fn verify_header_and_execute_tx(
        &self,
        signer: &SigningAccount,
        request: &VerifyHeaderRequest,
        nonce: u64,
    ) -> Result<ZilTransaction> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.error {
            anyhow::bail!(err.clone());
        }
        state
            .verify_calls
            .push((signer.address.clone(), request.clone(), nonce));
        Ok(self.transaction(nonce))
    }

    async fn change_book_keeper(
        &self,
        signer: &SigningAccount,
        request: &ChangeBookKeeperRequest,
        nonce: u64,
    ) -> Result<ZilTransaction> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.error {
            anyhow::bail!(err.clone());
        }
        state
            .change_calls
            .push((signer.address.clone(), request.clone(), nonce));
        Ok(self.transaction(nonce))
    }
}

/// Shared mocks as trait objects.
pub fn adapters(
    zil: &Arc<MockZilliqa>,
    poly: &Arc<MockPoly>,
    proxy: &Arc<MockProxy>,
) -> zilliqa_relayer::ChainAdapters {
    zilliqa_relayer::ChainAdapters {
        zil: Arc::clone(zil) as Arc<dyn ZilliqaClient>,
        poly: Arc::clone(poly) as Arc<dyn PolyClient>,
        proxy: Arc::clone(proxy) as Arc<dyn CrossChainProxy>,
    }
}
