//! Cursor-based reader matching [`ZeroCopySink`](super::ZeroCopySink).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input reading {0}")]
    UnexpectedEof(&'static str),
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

/// Borrowing reader over a serialized buffer.
#[derive(Debug, Clone)]
pub struct ZeroCopySource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ZeroCopySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof(what));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn next_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn next_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array("u16")?))
    }

    pub fn next_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array("u32")?))
    }

    pub fn next_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take_array("u64")?))
    }

    pub fn next_hash(&mut self) -> Result<[u8; 32], CodecError> {
        self.take_array("hash")
    }

    pub fn next_var_uint(&mut self) -> Result<u64, CodecError> {
        match self.next_u8()? {
            0xFD => self.next_u16().map(u64::from),
            0xFE => self.next_u32().map(u64::from),
            0xFF => self.next_u64(),
            b => Ok(u64::from(b)),
        }
    }

    pub fn next_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.next_var_uint()?;
        let len = usize::try_from(len).map_err(|_| CodecError::UnexpectedEof("var bytes"))?;
        self.take(len, "var bytes")
    }

    pub fn next_string(&mut self) -> Result<String, CodecError> {
        let raw = self.next_var_bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Fails when bytes remain after a fully decoded record.
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}
