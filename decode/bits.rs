//! Bit-level reader over a byte slice.
//!
//! Values are pulled out one bit at a time in a fixed [`BitOrder`]. With the
//! default most-significant-bit-first order the first bit read becomes the
//! highest-order bit of the result, so byte-aligned reads of whole bytes are
//! big-endian. The least-significant-bit-first order mirrors that exactly:
//! the first bit read is bit 0 of the result and aligned reads are little-endian.
//!
//! The reader only moves forward. A failed read leaves the cursor untouched.

use crate::types::BitOrder;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitReaderError {
    #[error("end of bitstream: requested {requested} bits, {available} remain")]
    EndOfData { requested: u64, available: u64 },
    #[error("cannot read an integer of {0} bits; width must be within 1..=64")]
    InvalidWidth(u32),
}

#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    byte_pos: usize,
    /// Bits already consumed from `bytes[byte_pos]`, always 0..8.
    bit_pos: u32,
    order: BitOrder,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_order(bytes, BitOrder::MsbFirst)
    }

    pub fn with_order(bytes: &'a [u8], order: BitOrder) -> Self {
        Self {
            bytes,
            byte_pos: 0,
            bit_pos: 0,
            order,
        }
    }

    #[inline]
    pub fn bits_remaining(&self) -> u64 {
        (self.bytes.len() - self.byte_pos) as u64 * 8 - u64::from(self.bit_pos)
    }

    #[inline]
    pub fn bits_consumed(&self) -> u64 {
        self.byte_pos as u64 * 8 + u64::from(self.bit_pos)
    }

    /// True once nothing but padding inside the current byte is left.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.bits_remaining() < 8
    }

    #[inline]
    fn ensure(&self, nbits: u64) -> Result<(), BitReaderError> {
        let available = self.bits_remaining();
        if nbits > available {
            return Err(BitReaderError::EndOfData {
                requested: nbits,
                available,
            });
        }
        Ok(())
    }

    #[inline]
    fn take_bit(&mut self) -> u64 {
        let byte = self.bytes[self.byte_pos];
        let shift = match self.order {
            BitOrder::MsbFirst => 7 - self.bit_pos,
            BitOrder::LsbFirst => self.bit_pos,
        };
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        u64::from((byte >> shift) & 1)
    }

    pub fn read_bit(&mut self) -> Result<bool, BitReaderError> {
        self.ensure(1)?;
        Ok(self.take_bit() == 1)
    }

    /// Reads an unsigned integer of `nbits` bits (1..=64).
    pub fn read_uint(&mut self, nbits: u32) -> Result<u64, BitReaderError> {
        if nbits == 0 || nbits > 64 {
            return Err(BitReaderError::InvalidWidth(nbits));
        }
        self.ensure(u64::from(nbits))?;

        if self.bit_pos == 0 && nbits % 8 == 0 {
            let nbytes = (nbits / 8) as usize;
            let chunk = &self.bytes[self.byte_pos..self.byte_pos + nbytes];
            self.byte_pos += nbytes;
            let value = match self.order {
                BitOrder::MsbFirst => chunk
                    .iter()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
                BitOrder::LsbFirst => chunk
                    .iter()
                    .rev()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            };
            return Ok(value);
        }

        let mut value = 0u64;
        match self.order {
            BitOrder::MsbFirst => {
                for _ in 0..nbits {
                    value = (value << 1) | self.take_bit();
                }
            }
            BitOrder::LsbFirst => {
                for i in 0..nbits {
                    value |= self.take_bit() << i;
                }
            }
        }
        Ok(value)
    }

    /// Advances past `nbits` bits without interpreting them.
    pub fn skip(&mut self, nbits: u64) -> Result<(), BitReaderError> {
        self.ensure(nbits)?;
        let absolute = self.bits_consumed() + nbits;
        self.byte_pos = (absolute / 8) as usize;
        self.bit_pos = (absolute % 8) as u32;
        Ok(())
    }
}

/// Packs `(value, width)` pairs most-significant-bit first, zero-padding the
/// final byte.
#[cfg(test)]
pub(crate) fn pack_msb(fields: &[(u64, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut bit = 0usize;
    for &(value, width) in fields {
        for i in (0..width).rev() {
            if bit % 8 == 0 {
                out.push(0);
            }
            if (value >> i) & 1 == 1 {
                let last = out.len() - 1;
                out[last] |= 1 << (7 - bit % 8);
            }
            bit += 1;
        }
    }
    out
}
