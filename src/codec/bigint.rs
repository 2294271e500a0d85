//! Big-integer and Scilla storage-key helpers.

use anyhow::{Context, Result};
use num_bigint::BigUint;

/// Separator Scilla places between the components of a storage key.
const SCILLA_INDEX_SEPARATOR: u8 = 0x16;

/// Parse hex text (with or without `0x`) into an unsigned big integer.
pub fn parse_hex_big_int(s: &str) -> Result<BigUint> {
    let clean = s.strip_prefix("0x").unwrap_or(s);
    if clean.is_empty() {
        return Ok(BigUint::default());
    }
    BigUint::parse_bytes(clean.as_bytes(), 16)
        .with_context(|| format!("Invalid hex big integer: {}", s))
}

/// Minimal big-endian hex of `n`; zero is encoded as `"00"`.
pub fn encode_big_int(n: &BigUint) -> String {
    if n == &BigUint::default() {
        return "00".to_string();
    }
    hex::encode(n.to_bytes_be())
}

/// Convert a stored hex index back to the decimal text Scilla uses in map keys.
pub fn hex_index_to_decimal(index: &str) -> Result<String> {
    Ok(parse_hex_big_int(index)?.to_str_radix(10))
}

/// Build the raw state key of `vname[indices...]` inside contract `addr`.
///
/// `addr` is expected lowercase base16 without `0x`.
pub fn scilla_storage_key(addr: &str, vname: &str, indices: &[String]) -> Vec<u8> {
    let mut key = Vec::with_capacity(addr.len() + vname.len() + 2);
    key.extend_from_slice(addr.as_bytes());
    key.push(SCILLA_INDEX_SEPARATOR);
    key.extend_from_slice(vname.as_bytes());
    key.push(SCILLA_INDEX_SEPARATOR);
    for index in indices {
        key.extend_from_slice(index.as_bytes());
        key.push(SCILLA_INDEX_SEPARATOR);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_big_int() {
        assert_eq!(encode_big_int(&BigUint::default()), "00");
        assert_eq!(encode_big_int(&parse_hex_big_int("0x0a").unwrap()), "0a");
        assert_eq!(encode_big_int(&parse_hex_big_int("1234").unwrap()), "1234");
    }

    #[test]
    fn test_hex_index_to_decimal() {
        assert_eq!(hex_index_to_decimal("00").unwrap(), "0");
        assert_eq!(hex_index_to_decimal("ff").unwrap(), "255");
        assert!(hex_index_to_decimal("zz").is_err());
    }

    #[test]
    fn test_scilla_storage_key() {
        let key = scilla_storage_key("abcd", "zilToPolyTxHashMap", &["7".to_string()]);
        let mut expected = b"abcd\x16zilToPolyTxHashMap\x16".to_vec();
        expected.extend_from_slice(b"7\x16");
        assert_eq!(key, expected);
    }
}
