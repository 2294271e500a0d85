//! Cross-chain payload recovered from a poly cross-states proof.

use super::{CodecError, ZeroCopySink, ZeroCopySource};

/// Parameters of the original `makeProof` call on the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MakeTxParam {
    pub tx_hash: Vec<u8>,
    pub cross_chain_id: Vec<u8>,
    pub from_contract_address: Vec<u8>,
    pub to_chain_id: u64,
    pub to_contract_address: Vec<u8>,
    pub method: String,
    pub args: Vec<u8>,
}

/// Value committed in poly's cross-chain state tree for one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToMerkleValue {
    /// Poly transaction hash
    pub tx_hash: Vec<u8>,
    pub from_chain_id: u64,
    pub make_tx_param: MakeTxParam,
}

impl MakeTxParam {
    fn read(source: &mut ZeroCopySource<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            tx_hash: source.next_var_bytes()?.to_vec(),
            cross_chain_id: source.next_var_bytes()?.to_vec(),
            from_contract_address: source.next_var_bytes()?.to_vec(),
            to_chain_id: source.next_u64()?,
            to_contract_address: source.next_var_bytes()?.to_vec(),
            method: source.next_string()?,
            args: source.next_var_bytes()?.to_vec(),
        })
    }

    fn write(&self, sink: &mut ZeroCopySink) {
        sink.write_var_bytes(&self.tx_hash);
        sink.write_var_bytes(&self.cross_chain_id);
        sink.write_var_bytes(&self.from_contract_address);
        sink.write_u64(self.to_chain_id);
        sink.write_var_bytes(&self.to_contract_address);
        sink.write_string(&self.method);
        sink.write_var_bytes(&self.args);
    }
}

impl ToMerkleValue {
    pub fn deserialize(data: &[u8]) -> Result<Self, CodecError> {
        let mut source = ZeroCopySource::new(data);
        let tx_hash = source.next_var_bytes()?.to_vec();
        let from_chain_id = source.next_u64()?;
        let make_tx_param = MakeTxParam::read(&mut source)?;
        Ok(Self {
            tx_hash,
            from_chain_id,
            make_tx_param,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut sink = ZeroCopySink::new();
        sink.write_var_bytes(&self.tx_hash);
        sink.write_u64(self.from_chain_id);
        self.make_tx_param.write(&mut sink);
        sink.into_bytes()
    }
}
