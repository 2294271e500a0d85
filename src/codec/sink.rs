//! Append-only byte writer using the Poly serialization conventions.

/// Byte writer for Poly-style encodings.
///
/// Integers are little-endian. Variable-length fields carry a var-uint prefix:
/// one byte below `0xFD`, otherwise a marker byte (`0xFD`/`0xFE`/`0xFF`)
/// followed by a u16/u32/u64.
#[derive(Debug, Default, Clone)]
pub struct ZeroCopySink {
    buf: Vec<u8>,
}

impl ZeroCopySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn write_var_uint(&mut self, v: u64) {
        if v < 0xFD {
            self.write_u8(v as u8);
        } else if v <= 0xFFFF {
            self.write_u8(0xFD);
            self.write_u16(v as u16);
        } else if v <= 0xFFFF_FFFF {
            self.write_u8(0xFE);
            self.write_u32(v as u32);
        } else {
            self.write_u8(0xFF);
            self.write_u64(v);
        }
    }

    /// Length-prefixed byte string.
    pub fn write_var_bytes(&mut self, v: &[u8]) {
        self.write_var_uint(v.len() as u64);
        self.write_bytes(v);
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, v: &str) {
        self.write_var_bytes(v.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
