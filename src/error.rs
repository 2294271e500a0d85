//! Error Taxonomy Module
//!
//! Typed errors for the relayer and the classification of remote submission
//! failures. Remote chains report failures as free-form text, so the
//! classification works on the rendered error chain.

use thiserror::Error;

// ============================================================================
// FATAL / TYPED ERRORS
// ============================================================================

/// Errors that stop the relayer from starting.
///
/// Everything else is logged by the monitors and retried on the next tick.
#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("no usable signer: none of the configured keystores could be decrypted")]
    NoSigners,
    #[error("genesis header for side chain {0} is not synced on poly")]
    GenesisMissing(u64),
    #[error("cannot determine poly start height: no persisted height and curEpochStartHeight is 0")]
    PolyStartHeightMissing,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// SUBMISSION ERROR CLASSIFICATION
// ============================================================================

/// Marker text reported by poly when the header batch does not connect to its chain.
const PARENT_MISSING_MARKERS: [&str; 2] = ["get the parent block failed", "missing required field"];
/// Marker text reported by poly when the transfer was already imported.
const ALREADY_DONE_MARKER: &str = "tx already done";
/// Marker text reported by poly when the relayer account cannot pay for the transaction.
const CAPACITY_MARKER: &str = "current utxo is not enough";
/// JSON-RPC code returned while a transaction is not yet known to poly.
const TX_PENDING_MARKER: &str = "JsonRpcResponse error code:42002";
/// Zilliqa reports an empty tx block as an error.
const NO_TRANSACTIONS_MARKER: &str = "TxBlock has no transactions";

/// How a failed remote submission must be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// Header batch does not connect; roll back to the common ancestor.
    ParentMissing,
    /// The effect is already applied on the remote chain; treat as success.
    AlreadyDone,
    /// Transient lack of balance/resources; keep the work item queued.
    InsufficientCapacity,
    /// Transaction not yet visible on the remote chain.
    TxPending,
    /// Anything else.
    Other,
}

impl SubmitErrorKind {
    /// Classify an error by inspecting every message in its chain.
    pub fn classify(err: &anyhow::Error) -> Self {
        Self::classify_message(&format!("{:#}", err))
    }

    /// Classify a raw error message.
    pub fn classify_message(msg: &str) -> Self {
        if PARENT_MISSING_MARKERS.iter().any(|m| msg.contains(m)) {
            SubmitErrorKind::ParentMissing
        } else if msg.contains(ALREADY_DONE_MARKER) {
            SubmitErrorKind::AlreadyDone
        } else if msg.contains(CAPACITY_MARKER) {
            SubmitErrorKind::InsufficientCapacity
        } else if msg.contains(TX_PENDING_MARKER) {
            SubmitErrorKind::TxPending
        } else {
            SubmitErrorKind::Other
        }
    }
}

/// Returns true when a chain-A read failed only because the block holds no transactions.
pub fn is_empty_block_error(err: &anyhow::Error) -> bool {
    format!("{:#}", err).contains(NO_TRANSACTIONS_MARKER)
}
