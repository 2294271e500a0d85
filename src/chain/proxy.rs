//! Cross-chain manager proxy on chain A.
//!
//! Builds, signs and broadcasts the two relay calls the poly → zilliqa
//! direction makes. Nonces are chosen by the caller.

use anyhow::Result;
use async_trait::async_trait;

use super::ZilTransaction;
use crate::credentials::SigningAccount;

/// Arguments of `verifyHeaderAndExecuteTx`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyHeaderRequest {
    /// Cross-states audit path of the transfer
    pub audit_path: Vec<u8>,
    /// Unsigned poly header containing the transfer
    pub raw_header: Vec<u8>,
    /// Merkle proof from `raw_header` to `raw_anchor`; empty without an anchor
    pub header_proof: Vec<u8>,
    /// Unsigned anchor header; empty without an anchor
    pub raw_anchor: Vec<u8>,
    /// 65-byte `r‖s‖v` signatures of the verified header
    pub signatures: Vec<Vec<u8>>,
}

/// Arguments of `changeBookKeeper`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBookKeeperRequest {
    pub raw_header: Vec<u8>,
    /// Sorted uncompressed committee keys
    pub pub_keys: Vec<Vec<u8>>,
    pub signatures: Vec<Vec<u8>>,
}

#[async_trait]
pub trait CrossChainProxy: Send + Sync {
    async fn verify_header_and_execute_tx(
        &self,
        signer: &SigningAccount,
        request: &VerifyHeaderRequest,
        nonce: u64,
    ) -> Result<ZilTransaction>;

    async fn change_book_keeper(
        &self,
        signer: &SigningAccount,
        request: &ChangeBookKeeperRequest,
        nonce: u64,
    ) -> Result<ZilTransaction>;
}
