// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types shared between the header, decoder, and probability modules.

use std::fmt;

/// The variant-record framing named by bits 2..=5 of the header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    One,
    Two,
}

impl Layout {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layout {}", self.code())
    }
}

/// Genotype block compression named by bits 0..=1 of the header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Zlib,
    Zstd,
}

impl Compression {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Zlib),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Zlib => "zlib",
            Self::Zstd => "zstd",
        };
        f.write_str(label)
    }
}

/// Order in which packed probability bits are pulled out of each byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// The first bit read is the highest-order bit of the byte and of the result.
    #[default]
    MsbFirst,
    /// The first bit read is the lowest-order bit of the byte and of the result,
    /// matching the packing produced by the reference BGEN writer.
    LsbFirst,
}

/// Knobs that change how a probability block is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject a record whose bitstream still holds a whole unread byte after the
    /// last sample. Padding bits inside the final byte are always permitted.
    pub strict_end_of_stream: bool,
    pub bit_order: BitOrder,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict_end_of_stream: true,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

/// Probabilities for one sample at one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleProbability {
    pub missing: bool,
    /// Number of genome copies, 0..=63.
    pub ploidy: u8,
    /// Explicit values followed by the implied final value. Empty when `missing`.
    pub probabilities: Vec<f64>,
}

impl SampleProbability {
    /// Expected count of the second allele for an unphased biallelic sample,
    /// computed as `sum(i * P(genotype with i copies))`.
    ///
    /// Returns `None` for missing samples.
    pub fn expected_dosage(&self) -> Option<f64> {
        if self.missing || self.probabilities.is_empty() {
            return None;
        }
        Some(
            self.probabilities
                .iter()
                .enumerate()
                .map(|(copies, p)| copies as f64 * p)
                .sum(),
        )
    }
}

/// One fully decoded variant record. Owns all of its data; holds nothing that
/// refers back to the reader that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// Byte offset of the first byte of this record.
    pub offset: u64,
    pub id: String,
    pub rsid: String,
    pub chromosome: String,
    pub position: u32,
    /// Sample count carried by the record (layout 1 prefix or layout 2 block).
    pub n_samples: u32,
    pub n_alleles: u16,
    pub alleles: Vec<String>,
    pub min_ploidy: u8,
    pub max_ploidy: u8,
    pub phased: bool,
    /// Bits used to quantize each stored probability.
    pub bits: u8,
    pub samples: Vec<SampleProbability>,
}

impl Variant {
    /// Number of probability slots the widest sample of this variant can need:
    /// `choose(alleles + max_ploidy - 1, alleles - 1)`. Phased samples carry
    /// `ploidy x (alleles - 1) + 1` values, which never exceeds this.
    pub fn max_combinations(&self) -> usize {
        let alleles = u32::from(self.n_alleles.max(1));
        let max_ploidy = u32::from(self.max_ploidy);
        crate::choose::choose(alleles + max_ploidy - 1, alleles - 1)
            .map(|n| n as usize)
            .unwrap_or(usize::MAX)
    }

    /// Lays the probabilities out as a row-major `n_samples x stride` matrix,
    /// left-aligned per sample. Unused slots of a called sample hold 0.0 so each
    /// row still sums to one; missing samples are all NaN.
    pub fn to_dense(&self) -> DenseProbabilities {
        let stride = self
            .samples
            .iter()
            .map(|s| s.probabilities.len())
            .max()
            .unwrap_or(0)
            .max(self.max_combinations().min(u16::MAX as usize));
        let mut values = vec![0.0; stride * self.samples.len()];
        for (row, sample) in values.chunks_mut(stride.max(1)).zip(&self.samples) {
            if sample.missing {
                row.fill(f64::NAN);
            } else {
                row[..sample.probabilities.len()].copy_from_slice(&sample.probabilities);
            }
        }
        DenseProbabilities { stride, values }
    }
}

/// Fixed-stride probability matrix produced by [`Variant::to_dense`].
#[derive(Debug, Clone, PartialEq)]
pub struct DenseProbabilities {
    pub stride: usize,
    pub values: Vec<f64>,
}

impl DenseProbabilities {
    pub fn row(&self, sample: usize) -> &[f64] {
        &self.values[sample * self.stride..(sample + 1) * self.stride]
    }
}
