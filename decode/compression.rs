// ========================================================================================
//
//                         Genotype block decompression
//
// ========================================================================================
//
// Every codec is a pure function from compressed bytes to exactly `expected_len`
// bytes. A length mismatch in either direction is treated like a failed checksum:
// the stream is corrupt or the framing was misread, and nothing is returned.

use crate::types::Compression;
use flate2::read::ZlibDecoder;
use std::io::{self, Read};
use thiserror::Error;

/// Upper bound on scratch space reserved before any output exists. Declared
/// lengths come from the file; larger blocks grow the buffer as bytes arrive.
const MAX_UPFRONT_RESERVE: usize = 1 << 24;

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("{codec} stream is malformed: {source}")]
    Malformed {
        codec: Compression,
        #[source]
        source: io::Error,
    },
    #[error("{codec} block produced {actual} bytes, expected exactly {expected}")]
    LengthMismatch {
        codec: Compression,
        expected: usize,
        actual: usize,
    },
}

/// Decompresses `input` and returns a view of exactly `expected_len` bytes.
///
/// Uncompressed input is validated and handed back as-is; the other codecs
/// decode into `scratch`, which is cleared first and reused across calls.
pub fn decompress_into<'a>(
    codec: Compression,
    input: &'a [u8],
    expected_len: usize,
    scratch: &'a mut Vec<u8>,
) -> Result<&'a [u8], DecompressError> {
    match codec {
        Compression::None => {
            if input.len() != expected_len {
                return Err(DecompressError::LengthMismatch {
                    codec,
                    expected: expected_len,
                    actual: input.len(),
                });
            }
            Ok(input)
        }
        Compression::Zlib => {
            read_bounded(codec, ZlibDecoder::new(input), expected_len, scratch)?;
            Ok(scratch.as_slice())
        }
        Compression::Zstd => {
            let decoder = zstd::stream::read::Decoder::with_buffer(input)
                .map_err(|source| DecompressError::Malformed { codec, source })?;
            read_bounded(codec, decoder, expected_len, scratch)?;
            Ok(scratch.as_slice())
        }
    }
}

/// Owned convenience wrapper around [`decompress_into`].
pub fn decompress(
    codec: Compression,
    input: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>, DecompressError> {
    let mut scratch = Vec::new();
    let out = decompress_into(codec, input, expected_len, &mut scratch)?;
    Ok(out.to_vec())
}

/// Drains `decoder` into `scratch`, reading at most one byte beyond the expected
/// length so oversized output is detected without inflating the whole stream.
fn read_bounded<R: Read>(
    codec: Compression,
    decoder: R,
    expected_len: usize,
    scratch: &mut Vec<u8>,
) -> Result<(), DecompressError> {
    scratch.clear();
    scratch.reserve(expected_len.min(MAX_UPFRONT_RESERVE) + 1);
    decoder
        .take((expected_len as u64).saturating_add(1))
        .read_to_end(scratch)
        .map_err(|source| DecompressError::Malformed { codec, source })?;
    if scratch.len() != expected_len {
        return Err(DecompressError::LengthMismatch {
            codec,
            expected: expected_len,
            actual: scratch.len(),
        });
    }
    Ok(())
}
