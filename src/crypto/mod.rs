//! Cryptographic Helpers Module
//!
//! Pure conversions between poly's consensus key/signature encodings and the
//! shapes the zilliqa cross-chain manager contract verifies.
//!
//! - Poly signatures: scheme byte, then a 65-byte recoverable `v‖r‖s` with `v ≥ 27`.
//!   The contract expects `r‖s‖v` with `v ∈ {0, 1}`.
//! - Poly public keys: `0x12 ‖ curve label ‖ compressed point`. The contract expects
//!   the same prefix followed by the uncompressed point, with the committee sorted.

use anyhow::{Context, Result};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

/// Key type marker of an ECDSA public key in poly's serialization.
const ECDSA_KEY_TYPE: u8 = 0x12;
/// Curve label of secp256k1 in poly's serialization.
const SECP256K1_CURVE_LABEL: u8 = 0x05;
/// Length of a recoverable signature body.
const RECOVERABLE_SIG_LEN: usize = 65;

// ============================================================================
// HASHING
// ============================================================================

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

// ============================================================================
// SIGNATURES
// ============================================================================

/// Converts one poly consensus signature into the 65-byte `r‖s‖v` form.
///
/// # Arguments
///
/// * `sig` - scheme byte followed by `v‖r‖s`
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - 65 bytes, recovery id in the last byte (0 or 1)
/// * `Err(anyhow::Error)` - wrong length or recovery byte below 27
pub fn to_eth_compatible_signature(sig: &[u8]) -> Result<Vec<u8>> {
    if sig.len() != RECOVERABLE_SIG_LEN + 1 {
        anyhow::bail!(
            "Invalid signature length: expected {} bytes, got {}",
            RECOVERABLE_SIG_LEN + 1,
            sig.len()
        );
    }
    let body = &sig[1..];
    let v = body[0]
        .checked_sub(27)
        .with_context(|| format!("Invalid recovery byte {}", body[0]))?;

    let mut out = Vec::with_capacity(RECOVERABLE_SIG_LEN);
    out.extend_from_slice(&body[1..]);
    out.push(v);
    Ok(out)
}

/// Converts every signature of a header, failing on the first malformed one.
pub fn convert_signatures(sig_data: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
    sig_data
        .iter()
        .enumerate()
        .map(|(i, sig)| {
            to_eth_compatible_signature(sig).with_context(|| format!("Signature #{} is malformed", i))
        })
        .collect()
}

// ============================================================================
// PUBLIC KEYS
// ============================================================================

/// Re-serializes a poly secp256k1 public key with an uncompressed point.
pub fn uncompressed_public_key(serialized: &[u8]) -> Result<Vec<u8>> {
    if serialized.len() < 3 || serialized[0] != ECDSA_KEY_TYPE || serialized[1] != SECP256K1_CURVE_LABEL {
        anyhow::bail!("Unsupported public key encoding: {}", hex::encode(serialized));
    }
    let point = k256::PublicKey::from_sec1_bytes(&serialized[2..])
        .map_err(|e| anyhow::anyhow!("Invalid secp256k1 point: {}", e))?;

    let mut out = vec![ECDSA_KEY_TYPE, SECP256K1_CURVE_LABEL];
    out.extend_from_slice(point.to_encoded_point(false).as_bytes());
    Ok(out)
}

/// Decodes hex peer ids of a new committee into sorted uncompressed keys.
///
/// Sorting the fixed-width uncompressed form bytewise orders keys by X, then Y.
pub fn sorted_bookkeeper_keys(peer_ids: &[String]) -> Result<Vec<Vec<u8>>> {
    let mut keys = peer_ids
        .iter()
        .map(|id| {
            let raw = hex::decode(id).with_context(|| format!("Invalid peer id hex: {}", id))?;
            uncompressed_public_key(&raw)
        })
        .collect::<Result<Vec<_>>>()?;
    keys.sort();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly_key(seed: u8) -> Vec<u8> {
        let secret = k256::SecretKey::from_slice(&[seed; 32]).unwrap();
        let mut out = vec![ECDSA_KEY_TYPE, SECP256K1_CURVE_LABEL];
        out.extend_from_slice(secret.public_key().to_encoded_point(true).as_bytes());
        out
    }

    #[test]
    fn test_eth_compatible_signature() {
        let mut sig = vec![0x01, 28];
        sig.extend_from_slice(&[0xAB; 64]);
        let out = to_eth_compatible_signature(&sig).unwrap();
        assert_eq!(out.len(), 65);
        assert_eq!(&out[..64], &[0xAB; 64]);
        assert_eq!(out[64], 1);
    }

    #[test]
    fn test_eth_compatible_signature_rejects_bad_input() {
        assert!(to_eth_compatible_signature(&[0u8; 10]).is_err());
        let mut sig = vec![0x01, 3];
        sig.extend_from_slice(&[0u8; 64]);
        assert!(to_eth_compatible_signature(&sig).is_err());
    }

    #[test]
    fn test_uncompressed_public_key() {
        let out = uncompressed_public_key(&poly_key(7)).unwrap();
        assert_eq!(out.len(), 67);
        assert_eq!(&out[..3], &[ECDSA_KEY_TYPE, SECP256K1_CURVE_LABEL, 0x04]);
    }

    #[test]
    fn test_sorted_bookkeeper_keys() {
        let ids: Vec<String> = [3u8, 1, 2].iter().map(|s| hex::encode(poly_key(*s))).collect();
        let keys = sorted_bookkeeper_keys(&ids).unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }
}
