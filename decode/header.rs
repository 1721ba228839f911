// ========================================================================================
//
//                                  File header
//
// ========================================================================================
//
// Byte map of the fixed prefix (all little-endian):
//
//   0   u32  variant block offset, relative to byte 4
//   4   u32  header length L, counted from byte 4
//   8   u32  number of variant records
//   12  u32  number of samples
//   16  [4]  magic "bgen"
//   20  ..   free data, up to the flags word
//   L   u32  flags
//
// The sample identifier block, when present, starts at L + 4.

use crate::error::{BgenError, Result};
use crate::shared::files::ByteRangeSource;
use crate::types::{Compression, Layout};
use log::debug;

pub const MAGIC: [u8; 4] = *b"bgen";

const FIXED_PREFIX_LEN: u64 = 20;
const MIN_FILE_LEN: u64 = 24;

const FLAG_COMPRESSION_MASK: u32 = 0b11;
const FLAG_LAYOUT_SHIFT: u32 = 2;
const FLAG_LAYOUT_MASK: u32 = 0b1111;
const FLAG_SAMPLE_IDENTIFIERS: u32 = 1 << 31;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Raw value of the first word; see [`Header::first_variant_offset`].
    pub variant_block_offset: u32,
    pub header_length: u32,
    pub n_variants: u32,
    pub n_samples: u32,
    pub free_data: Vec<u8>,
    pub flags: u32,
    pub layout: Layout,
    pub compression: Compression,
    pub has_sample_identifiers: bool,
}

impl Header {
    /// Parses and validates the header. Nothing past the flags word is read.
    pub fn read(source: &dyn ByteRangeSource) -> Result<Self> {
        if source.len() < MIN_FILE_LEN {
            return Err(BgenError::format(format!(
                "file is {} bytes; a BGEN header needs at least {MIN_FILE_LEN}",
                source.len()
            )));
        }
        let mut prefix = [0u8; FIXED_PREFIX_LEN as usize];
        source.read_at(0, &mut prefix)?;
        let word = |i: usize| {
            u32::from_le_bytes([prefix[i], prefix[i + 1], prefix[i + 2], prefix[i + 3]])
        };

        let variant_block_offset = word(0);
        let header_length = word(4);
        let n_variants = word(8);
        let n_samples = word(12);

        let mut found = [0u8; 4];
        found.copy_from_slice(&prefix[16..20]);
        if found != MAGIC {
            return Err(BgenError::InvalidMagic { found });
        }

        if u64::from(header_length) < FIXED_PREFIX_LEN {
            return Err(BgenError::format(format!(
                "header length {header_length} is smaller than the {FIXED_PREFIX_LEN}-byte fixed header"
            )));
        }
        if variant_block_offset < header_length {
            return Err(BgenError::format(format!(
                "variant block offset {variant_block_offset} falls inside the {header_length}-byte header"
            )));
        }

        let flags_end = u64::from(header_length) + 4;
        if flags_end > source.len() {
            return Err(BgenError::UnexpectedEof {
                offset: u64::from(header_length),
                requested: 4,
                available: source.len().saturating_sub(u64::from(header_length)),
            });
        }

        let mut free_data = vec![0u8; (u64::from(header_length) - FIXED_PREFIX_LEN) as usize];
        source.read_at(FIXED_PREFIX_LEN, &mut free_data)?;
        let flags = crate::shared::files::read_le_u32(source, u64::from(header_length))?;

        let compression_code = flags & FLAG_COMPRESSION_MASK;
        let compression = Compression::from_code(compression_code)
            .ok_or(BgenError::UnsupportedCompression(compression_code))?;
        let layout_code = (flags >> FLAG_LAYOUT_SHIFT) & FLAG_LAYOUT_MASK;
        let layout =
            Layout::from_code(layout_code).ok_or(BgenError::UnsupportedLayout(layout_code))?;
        if layout == Layout::One && compression == Compression::Zstd {
            return Err(BgenError::IncompatibleCompression {
                layout,
                compression,
            });
        }

        let header = Self {
            variant_block_offset,
            header_length,
            n_variants,
            n_samples,
            free_data,
            flags,
            layout,
            compression,
            has_sample_identifiers: flags & FLAG_SAMPLE_IDENTIFIERS != 0,
        };
        debug!(
            "BGEN header: {} variants, {} samples, {}, compression {}, sample identifiers: {}",
            header.n_variants,
            header.n_samples,
            header.layout,
            header.compression,
            header.has_sample_identifiers
        );
        Ok(header)
    }

    /// Byte offset of the first variant record.
    pub fn first_variant_offset(&self) -> u64 {
        u64::from(self.variant_block_offset) + 4
    }

    /// Byte offset of the sample identifier block.
    pub fn sample_block_offset(&self) -> u64 {
        u64::from(self.header_length) + 4
    }
}
