//! Binary Codec Module
//!
//! Fixed-layout encoders and decoders shared by both relay directions:
//! - Poly zero-copy sink/source primitives (var-uint length prefixes, little-endian integers)
//! - The `CrossTransfer` record persisted in the retry queue
//! - `ToMerkleValue` payloads recovered from poly state proofs
//! - Audit path parsing and big-integer / storage-key helpers
//! - The JSON state-proof document submitted with outer transfers
//!
//! Layouts here are a compatibility contract with records written by older
//! relayer builds, so fields are written explicitly in a fixed order.

pub mod audit_path;
pub mod bigint;
pub mod cross_transfer;
pub mod merkle_value;
pub mod sink;
pub mod source;
pub mod zil_proof;

pub use audit_path::{parse_audit_path, AuditPath};
pub use bigint::{encode_big_int, hex_index_to_decimal, scilla_storage_key};
pub use cross_transfer::CrossTransfer;
pub use merkle_value::{MakeTxParam, ToMerkleValue};
pub use sink::ZeroCopySink;
pub use source::{CodecError, ZeroCopySource};
pub use zil_proof::{StorageProof, ZilProof};
