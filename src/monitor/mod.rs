//! Chain Monitor Module
//!
//! The two long-running sync loops of the relayer:
//! - [`ZilliqaSyncManager`]: zilliqa → poly. Forwards tx/ds block headers to
//!   poly's header-sync contract, queues cross-chain events, and imports them
//!   on poly with state proofs once their headers are synced.
//! - [`PolySyncManager`]: poly → zilliqa. Picks up `makeProof` notifications,
//!   recovers the transfer from poly's cross-states proof and relays it
//!   through a chain-A signer.
//!
//! Each loop processes heights strictly in order on its own task and only
//! checks for shutdown between ticks and inside waits.

pub mod poly_to_zil;
pub mod zil_to_poly;

pub use poly_to_zil::{parse_make_proof_notify, select_anchor, AnchorPlan, AnchorProof, PolySyncManager};
pub use zil_to_poly::{parse_cross_chain_event, HeaderCommit, HeaderEnvelope, ZilliqaSyncManager};
