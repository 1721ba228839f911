// ========================================================================================
//                                   Error taxonomy
// ========================================================================================

use crate::bits::BitReaderError;
use crate::compression::DecompressError;
use crate::types::{Compression, Layout};
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BgenError>;

#[derive(Debug, Error)]
pub enum BgenError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(
        "unexpected end of data at byte {offset}: requested {requested} bytes, {available} available"
    )]
    UnexpectedEof {
        offset: u64,
        requested: u64,
        available: u64,
    },

    #[error("file ends partway through a variant record ({0})")]
    TruncatedRecord(Box<BgenError>),

    #[error("invalid BGEN magic number: expected \"bgen\", found {found:?}")]
    InvalidMagic { found: [u8; 4] },

    #[error("layout {0} is not supported; only layouts 1 and 2 are readable")]
    UnsupportedLayout(u32),

    #[error("compression code {0} is not supported; expected 0, 1, or 2")]
    UnsupportedCompression(u32),

    #[error("compression {compression} cannot be used with {layout}")]
    IncompatibleCompression {
        layout: Layout,
        compression: Compression,
    },

    #[error("phased flag must be 0 or 1, found {0}")]
    InvalidPhasedFlag(u8),

    #[error("probability bit width must be within 1..=32, found {0}")]
    InvalidBitWidth(u8),

    #[error(
        "allele count in the probability block ({block}) differs from the variant metadata ({metadata})"
    )]
    AlleleCountMismatch { metadata: u16, block: u16 },

    #[error("malformed BGEN data: {0}")]
    Format(String),

    #[error("probability bitstream has {remaining_bits} unread bits after the last sample")]
    TrailingBits { remaining_bits: u64 },

    #[error("bitstream error: {0}")]
    BitStream(#[from] BitReaderError),

    #[error("genotype block decompression failed: {0}")]
    Decompress(#[from] DecompressError),

    #[error("the file does not carry sample identifiers")]
    NoSampleIdentifiers,

    #[error("variant at byte {offset}: {source}")]
    AtOffset {
        offset: u64,
        #[source]
        source: Box<BgenError>,
    },

    #[error("variant #{ordinal} at byte {offset}: {source}")]
    InVariant {
        ordinal: u64,
        offset: u64,
        #[source]
        source: Box<BgenError>,
    },
}

impl BgenError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub(crate) fn in_variant(self, ordinal: u64, offset: u64) -> Self {
        Self::InVariant {
            ordinal,
            offset,
            source: Box::new(self),
        }
    }

    pub(crate) fn at_offset(self, offset: u64) -> Self {
        Self::AtOffset {
            offset,
            source: Box::new(self),
        }
    }

    /// True when the failure is a read past the end of the underlying bytes.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}
