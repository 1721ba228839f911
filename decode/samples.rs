//! Sample identifier block.
//!
//! Layout at the sample block offset: `u32` block length (including itself),
//! `u32` sample count, then one `u16`-length-prefixed identifier per sample.

use crate::error::{BgenError, Result};
use crate::header::Header;
use crate::shared::files::ByteRangeSource;
use log::debug;

/// Read-only access to the ordered sample names of a file.
pub trait SampleNames {
    fn sample_names(&self) -> &[String];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIdentifiers {
    names: Vec<String>,
}

impl SampleIdentifiers {
    pub fn read(source: &dyn ByteRangeSource, header: &Header) -> Result<Self> {
        if !header.has_sample_identifiers {
            return Err(BgenError::NoSampleIdentifiers);
        }
        let start = header.sample_block_offset();
        let mut prefix = [0u8; 8];
        source.read_at(start, &mut prefix)?;
        let block_len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let count = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);

        if count != header.n_samples {
            return Err(BgenError::format(format!(
                "sample block lists {count} samples but the header declares {}",
                header.n_samples
            )));
        }
        if block_len < 8 {
            return Err(BgenError::format(format!(
                "sample block length {block_len} is shorter than its own 8-byte prefix"
            )));
        }
        if start + u64::from(block_len) > header.first_variant_offset() {
            return Err(BgenError::format(format!(
                "sample block of {block_len} bytes overlaps the first variant at byte {}",
                header.first_variant_offset()
            )));
        }

        let block_end = start + u64::from(block_len);
        if block_end > source.len() {
            return Err(BgenError::UnexpectedEof {
                offset: start,
                requested: u64::from(block_len),
                available: source.len().saturating_sub(start),
            });
        }

        let mut body = vec![0u8; block_len as usize - 8];
        source.read_at(start + 8, &mut body)?;

        // Every identifier takes at least its two length bytes.
        let mut names = Vec::with_capacity((count as usize).min(body.len() / 2));
        let mut pos = 0usize;
        for i in 0..count {
            let len_bytes = body.get(pos..pos + 2).ok_or_else(|| overrun(i, block_len))?;
            let len = usize::from(u16::from_le_bytes([len_bytes[0], len_bytes[1]]));
            pos += 2;
            let raw = body.get(pos..pos + len).ok_or_else(|| overrun(i, block_len))?;
            pos += len;
            let name = std::str::from_utf8(raw).map_err(|e| {
                BgenError::format(format!("sample identifier #{i} is not valid UTF-8: {e}"))
            })?;
            names.push(name.to_owned());
        }
        if pos != body.len() {
            debug!(
                "Sample block declares {block_len} bytes; identifiers used {}",
                pos + 8
            );
        }
        Ok(Self { names })
    }

    /// Placeholder names `sample_0 .. sample_{n-1}` for files without identifiers.
    pub fn synthesize(n_samples: u32) -> Self {
        Self {
            names: (0..n_samples).map(|i| format!("sample_{i}")).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

impl SampleNames for SampleIdentifiers {
    fn sample_names(&self) -> &[String] {
        &self.names
    }
}

fn overrun(index: u32, block_len: u32) -> BgenError {
    BgenError::format(format!(
        "sample identifier #{index} runs past the end of the {block_len}-byte sample block"
    ))
}
