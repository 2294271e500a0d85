//! Poly Merkle audit path parsing.

use super::{CodecError, ZeroCopySource};

/// Size of one `(position, sibling hash)` step.
const STEP_SIZE: usize = 1 + 32;

/// Decoded audit path: the leaf value plus the sibling hashes leading to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPath {
    pub value: Vec<u8>,
    pub positions: Vec<u8>,
    pub hashes: Vec<[u8; 32]>,
}

/// Parse `varbytes(value) ‖ (pos:u8 ‖ hash:[32])*`.
///
/// A trailing partial step is rejected as malformed.
pub fn parse_audit_path(path: &[u8]) -> Result<AuditPath, CodecError> {
    let mut source = ZeroCopySource::new(path);
    let value = source.next_var_bytes()?.to_vec();

    let steps = source.remaining() / STEP_SIZE;
    let mut positions = Vec::with_capacity(steps);
    let mut hashes = Vec::with_capacity(steps);
    for _ in 0..steps {
        positions.push(source.next_u8()?);
        hashes.push(source.next_hash()?);
    }
    source.finish()?;

    Ok(AuditPath {
        value,
        positions,
        hashes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ZeroCopySink;

    #[test]
    fn test_parse_value_and_steps() {
        let mut sink = ZeroCopySink::new();
        sink.write_var_bytes(b"leaf");
        sink.write_u8(0);
        sink.write_bytes(&[1u8; 32]);
        sink.write_u8(1);
        sink.write_bytes(&[2u8; 32]);
        let path = parse_audit_path(&sink.into_bytes()).unwrap();

        assert_eq!(path.value, b"leaf");
        assert_eq!(path.positions, vec![0, 1]);
        assert_eq!(path.hashes, vec![[1u8; 32], [2u8; 32]]);
    }

    #[test]
    fn test_partial_step_is_malformed() {
        let mut sink = ZeroCopySink::new();
        sink.write_var_bytes(b"leaf");
        sink.write_bytes(&[0u8; 10]);
        assert_eq!(
            parse_audit_path(&sink.into_bytes()),
            Err(CodecError::TrailingBytes(10))
        );
    }
}
