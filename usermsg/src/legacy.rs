//! Legacy bit-packed user message buffers.
//!
//! Message types that were never migrated to protobuf carry a raw bit
//! stream. Bits are packed least-significant first; every write advances the
//! cursor implicitly. The writer refuses to grow past its capacity instead
//! of silently truncating.

/// Largest legacy user message payload the engine accepts.
pub const MAX_LEGACY_PAYLOAD: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LegacyError {
    #[error("bit buffer overflow: {needed} bits needed, {left} bits left")]
    Overflow { needed: usize, left: usize },

    #[error("bit buffer underflow: {needed} bits needed, {left} bits left")]
    Underflow { needed: usize, left: usize },

    #[error("invalid bit count {0}, expected 1..=32")]
    InvalidBitCount(u32),

    #[error("string contains an interior NUL byte")]
    InteriorNul,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Write cursor over a bit-packed legacy payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitBuffer {
    data: Vec<u8>,
    bits: usize,
    max_bytes: usize,
}

impl Default for BitBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BitBuffer {
    /// Empty buffer limited to [`MAX_LEGACY_PAYLOAD`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(MAX_LEGACY_PAYLOAD)
    }

    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            data: Vec::new(),
            bits: 0,
            max_bytes,
        }
    }

    pub fn bits_written(&self) -> usize {
        self.bits
    }

    pub fn bytes_written(&self) -> usize {
        self.data.len()
    }

    pub fn bits_left(&self) -> usize {
        self.max_bytes * 8 - self.bits
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn reserve(&self, needed: usize) -> Result<(), LegacyError> {
        let left = self.bits_left();
        if needed > left {
            return Err(LegacyError::Overflow { needed, left });
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        let byte = self.bits / 8;
        if byte == self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[byte] |= 1 << (self.bits % 8);
        }
        self.bits += 1;
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), LegacyError> {
        self.reserve(1)?;
        self.push_bit(bit);
        Ok(())
    }

    /// Write the low `nbits` bits of `value`.
    pub fn write_ubits(&mut self, value: u32, nbits: u32) -> Result<(), LegacyError> {
        if !(1..=32).contains(&nbits) {
            return Err(LegacyError::InvalidBitCount(nbits));
        }
        self.reserve(nbits as usize)?;
        for i in 0..nbits {
            self.push_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Write `value` as a two's complement number of `nbits` bits.
    pub fn write_sbits(&mut self, value: i32, nbits: u32) -> Result<(), LegacyError> {
        self.write_ubits(value as u32, nbits)
    }

    pub fn write_char(&mut self, value: i8) -> Result<(), LegacyError> {
        self.write_sbits(value.into(), 8)
    }

    pub fn write_byte(&mut self, value: u8) -> Result<(), LegacyError> {
        self.write_ubits(value.into(), 8)
    }

    pub fn write_short(&mut self, value: i16) -> Result<(), LegacyError> {
        self.write_sbits(value.into(), 16)
    }

    pub fn write_word(&mut self, value: u16) -> Result<(), LegacyError> {
        self.write_ubits(value.into(), 16)
    }

    pub fn write_long(&mut self, value: i32) -> Result<(), LegacyError> {
        self.write_sbits(value, 32)
    }

    pub fn write_float(&mut self, value: f32) -> Result<(), LegacyError> {
        self.write_ubits(value.to_bits(), 32)
    }

    /// Write the string followed by a NUL terminator.
    pub fn write_string(&mut self, value: &str) -> Result<(), LegacyError> {
        if value.as_bytes().contains(&0) {
            return Err(LegacyError::InteriorNul);
        }
        self.reserve((value.len() + 1) * 8)?;
        for &b in value.as_bytes() {
            self.write_byte(b)?;
        }
        self.write_byte(0)
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), LegacyError> {
        self.reserve(value.len() * 8)?;
        for &b in value {
            self.write_byte(b)?;
        }
        Ok(())
    }
}

/// Read cursor matching [`BitBuffer`]'s layout, for receivers.
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    pub fn bits_left(&self) -> usize {
        self.data.len() * 8 - self.bit
    }

    fn take(&self, needed: usize) -> Result<(), LegacyError> {
        let left = self.bits_left();
        if needed > left {
            return Err(LegacyError::Underflow { needed, left });
        }
        Ok(())
    }

    fn next_bit(&mut self) -> bool {
        let bit = (self.data[self.bit / 8] >> (self.bit % 8)) & 1 == 1;
        self.bit += 1;
        bit
    }

    pub fn read_bit(&mut self) -> Result<bool, LegacyError> {
        self.take(1)?;
        Ok(self.next_bit())
    }

    pub fn read_ubits(&mut self, nbits: u32) -> Result<u32, LegacyError> {
        if !(1..=32).contains(&nbits) {
            return Err(LegacyError::InvalidBitCount(nbits));
        }
        self.take(nbits as usize)?;
        let mut value = 0u32;
        for i in 0..nbits {
            if self.next_bit() {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    /// Read `nbits` bits and sign-extend.
    pub fn read_sbits(&mut self, nbits: u32) -> Result<i32, LegacyError> {
        let raw = self.read_ubits(nbits)?;
        let shift = 32 - nbits;
        Ok(((raw << shift) as i32) >> shift)
    }

    pub fn read_char(&mut self) -> Result<i8, LegacyError> {
        Ok(self.read_sbits(8)? as i8)
    }

    pub fn read_byte(&mut self) -> Result<u8, LegacyError> {
        Ok(self.read_ubits(8)? as u8)
    }

    pub fn read_short(&mut self) -> Result<i16, LegacyError> {
        Ok(self.read_sbits(16)? as i16)
    }

    pub fn read_word(&mut self) -> Result<u16, LegacyError> {
        Ok(self.read_ubits(16)? as u16)
    }

    pub fn read_long(&mut self) -> Result<i32, LegacyError> {
        self.read_sbits(32)
    }

    pub fn read_float(&mut self) -> Result<f32, LegacyError> {
        Ok(f32::from_bits(self.read_ubits(32)?))
    }

    /// Read up to and including the NUL terminator.
    pub fn read_string(&mut self) -> Result<String, LegacyError> {
        let mut bytes = Vec::new();
        loop {
            match self.read_byte()? {
                0 => break,
                b => bytes.push(b),
            }
        }
        String::from_utf8(bytes).map_err(|_| LegacyError::InvalidUtf8)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, LegacyError> {
        self.take(len * 8)?;
        (0..len).map(|_| self.read_byte()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_pack_lsb_first() {
        let mut buf = BitBuffer::new();
        buf.write_bit(true).unwrap();
        buf.write_bit(false).unwrap();
        buf.write_ubits(0b11, 2).unwrap();
        assert_eq!(buf.bits_written(), 4);
        assert_eq!(buf.as_bytes(), &[0b0000_1101]);
    }

    #[test]
    fn test_unaligned_mixed_writes_read_back() {
        let mut buf = BitBuffer::new();
        buf.write_bit(true).unwrap();
        buf.write_short(-1234).unwrap();
        buf.write_float(0.25).unwrap();
        buf.write_string("hint").unwrap();
        buf.write_sbits(-3, 5).unwrap();

        let mut reader = BitReader::new(buf.as_bytes());
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_short().unwrap(), -1234);
        assert_eq!(reader.read_float().unwrap(), 0.25);
        assert_eq!(reader.read_string().unwrap(), "hint");
        assert_eq!(reader.read_sbits(5).unwrap(), -3);
    }

    #[test]
    fn test_overflow_is_rejected_without_partial_write() {
        let mut buf = BitBuffer::with_capacity(2);
        buf.write_byte(0xAB).unwrap();
        let err = buf.write_string("xy").unwrap_err();
        assert_eq!(err, LegacyError::Overflow { needed: 24, left: 8 });
        assert_eq!(buf.bytes_written(), 1);
        buf.write_byte(0xCD).unwrap();
        assert!(matches!(buf.write_bit(true), Err(LegacyError::Overflow { .. })));
    }

    #[test]
    fn test_invalid_inputs() {
        let mut buf = BitBuffer::new();
        assert_eq!(buf.write_ubits(1, 0), Err(LegacyError::InvalidBitCount(0)));
        assert_eq!(buf.write_ubits(1, 33), Err(LegacyError::InvalidBitCount(33)));
        assert_eq!(buf.write_string("a\0b"), Err(LegacyError::InteriorNul));

        let mut reader = BitReader::new(&[0x01]);
        assert!(matches!(reader.read_word(), Err(LegacyError::Underflow { needed: 16, left: 8 })));
    }
}
