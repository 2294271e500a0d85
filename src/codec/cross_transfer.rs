//! Retry-queue record for a chain-A lock event awaiting import on poly.

use serde::{Deserialize, Serialize};

use super::{CodecError, ZeroCopySink, ZeroCopySource};

/// One observed cross-chain event, persisted as the retry-queue key.
///
/// Wire layout, in this exact order:
/// `string tx_index | varbytes tx_id | varbytes value | u32 to_chain | u64 height`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTransfer {
    /// Event sequence index as minimal big-endian hex (`"00"` for zero)
    pub tx_index: String,
    /// Origin transaction id bytes
    pub tx_id: Vec<u8>,
    /// Raw transfer payload destined for poly
    pub value: Vec<u8>,
    /// Destination chain id
    pub to_chain: u32,
    /// Chain-A block height of the event
    pub height: u64,
}

impl CrossTransfer {
    pub fn serialize(&self) -> Vec<u8> {
        let mut sink = ZeroCopySink::new();
        sink.write_string(&self.tx_index);
        sink.write_var_bytes(&self.tx_id);
        sink.write_var_bytes(&self.value);
        sink.write_u32(self.to_chain);
        sink.write_u64(self.height);
        sink.into_bytes()
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, CodecError> {
        let mut source = ZeroCopySource::new(data);
        let tx_index = source.next_string()?;
        let tx_id = source.next_var_bytes()?.to_vec();
        let value = source.next_var_bytes()?.to_vec();
        let to_chain = source.next_u32()?;
        let height = source.next_u64()?;
        source.finish()?;
        Ok(Self {
            tx_index,
            tx_id,
            value,
            to_chain,
            height,
        })
    }
}
