//! JSON proof document accepted by poly's zilliqa handler.
//!
//! Byte fields are base64 encoded, matching how the poly side decodes them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chain::StateProof;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    pub proof: Vec<String>,
}

/// `{accountProof, storageProof: [one entry]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZilProof {
    #[serde(rename = "accountProof")]
    pub account_proof: Vec<String>,
    #[serde(rename = "storageProof")]
    pub storage_proofs: Vec<StorageProof>,
}

impl ZilProof {
    /// Wraps a state proof of `raw_key` proving `value`.
    ///
    /// The storage-proof key is the hex text of the raw Scilla key.
    pub fn new(state_proof: StateProof, raw_key: &[u8], value: Vec<u8>) -> Self {
        Self {
            account_proof: state_proof.account_proof,
            storage_proofs: vec![StorageProof {
                key: hex::encode(raw_key).into_bytes(),
                value,
                proof: state_proof.state_proof,
            }],
        }
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
