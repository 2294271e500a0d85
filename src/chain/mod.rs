//! Chain Adapter Module
//!
//! Interfaces the relayer core consumes from each chain, plus the plain data
//! types exchanged across them. RPC transport, transaction signing and wire
//! formats of the nodes live behind these traits.

pub mod poly;
pub mod proxy;
pub mod zilliqa;

pub use poly::{
    CrossStatesProof, ImportOuterTransfer, MerkleProof, Notify, PolyClient, PolyHeader,
    SmartContractEvent, VbftBlockInfo,
};
pub use proxy::{ChangeBookKeeperRequest, CrossChainProxy, VerifyHeaderRequest};
pub use zilliqa::{
    BalanceAndNonce, DsBlock, EventLog, EventParam, StateProof, TxBlock, TxReceipt, TxnBody,
    ZilTransaction, ZilliqaClient,
};
