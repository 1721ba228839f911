// ========================================================================================
//
//                        Genotype probability reconstruction
//
// ========================================================================================
//
// Both functions take the decompressed genotype block of one variant and return
// owned per-sample probabilities. Neither touches the file.

use crate::bits::{BitReader, BitReaderError};
use crate::choose::CombinationTable;
use crate::error::{BgenError, Result};
use crate::types::{DecodeOptions, SampleProbability};

/// Layout 1 stores three unsigned 16-bit values per sample over this denominator.
pub const LAYOUT1_DENOMINATOR: f64 = 32768.0;
const LAYOUT1_BYTES_PER_SAMPLE: usize = 6;

/// Fixed layout 2 prefix: sample count, allele count, ploidy bounds.
const LAYOUT2_PREFIX_LEN: usize = 8;

const MISSING_BIT: u8 = 0x80;
const PLOIDY_MASK: u8 = 0x3f;

/// Everything recovered from one genotype block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityBlock {
    pub n_samples: u32,
    pub min_ploidy: u8,
    pub max_ploidy: u8,
    pub phased: bool,
    pub bits: u8,
    pub samples: Vec<SampleProbability>,
}

/// Size in bytes of a decompressed layout 1 block holding `n_samples` samples.
pub fn layout1_block_len(n_samples: u32) -> Result<usize> {
    (n_samples as usize)
        .checked_mul(LAYOUT1_BYTES_PER_SAMPLE)
        .ok_or_else(|| {
            BgenError::format(format!("layout 1 block for {n_samples} samples is too large"))
        })
}

/// Decodes a layout 1 block: diploid, unphased, biallelic, 16 bits per value.
pub fn decode_layout1(payload: &[u8], n_samples: u32) -> Result<ProbabilityBlock> {
    let expected = layout1_block_len(n_samples)?;
    if payload.len() != expected {
        return Err(BgenError::format(format!(
            "layout 1 block holds {} bytes; {n_samples} samples need {expected}",
            payload.len()
        )));
    }

    let samples = payload
        .chunks_exact(LAYOUT1_BYTES_PER_SAMPLE)
        .map(|group| SampleProbability {
            missing: false,
            ploidy: 2,
            probabilities: group
                .chunks_exact(2)
                .map(|pair| {
                    f64::from(u16::from_le_bytes([pair[0], pair[1]])) / LAYOUT1_DENOMINATOR
                })
                .collect(),
        })
        .collect();

    Ok(ProbabilityBlock {
        n_samples,
        min_ploidy: 2,
        max_ploidy: 2,
        phased: false,
        bits: 16,
        samples,
    })
}

/// Decodes a layout 2 block.
///
/// `n_alleles` comes from the variant metadata and must match the count the
/// block repeats. Each non-missing sample gets its explicit values followed by
/// one implied value that brings the sample's total to exactly one in the
/// integer domain. Missing samples consume the same bits and come back empty.
pub fn decode_layout2(
    payload: &[u8],
    n_alleles: u16,
    options: &DecodeOptions,
) -> Result<ProbabilityBlock> {
    if payload.len() < LAYOUT2_PREFIX_LEN {
        return Err(short_block(payload.len(), LAYOUT2_PREFIX_LEN));
    }
    let n_samples = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let block_alleles = u16::from_le_bytes([payload[4], payload[5]]);
    let min_ploidy = payload[6];
    let max_ploidy = payload[7];

    if block_alleles != n_alleles {
        return Err(BgenError::AlleleCountMismatch {
            metadata: n_alleles,
            block: block_alleles,
        });
    }
    if n_alleles == 0 {
        return Err(BgenError::format("variant declares zero alleles"));
    }

    let info_end = LAYOUT2_PREFIX_LEN + n_samples as usize;
    let stream_start = info_end + 2;
    if payload.len() < stream_start {
        return Err(short_block(payload.len(), stream_start));
    }
    let sample_info = &payload[LAYOUT2_PREFIX_LEN..info_end];

    let phased = match payload[info_end] {
        0 => false,
        1 => true,
        other => return Err(BgenError::InvalidPhasedFlag(other)),
    };
    let bits = payload[info_end + 1];
    if !(1..=32).contains(&bits) {
        return Err(BgenError::InvalidBitWidth(bits));
    }

    let mut reader = BitReader::with_order(&payload[stream_start..], options.bit_order);
    let mut sampler = SampleDecoder::new(n_alleles, phased, bits);
    let samples = sample_info
        .iter()
        .map(|&info| sampler.read(&mut reader, info))
        .collect::<Result<Vec<_>>>()?;

    if options.strict_end_of_stream && !reader.is_exhausted() {
        return Err(BgenError::TrailingBits {
            remaining_bits: reader.bits_remaining(),
        });
    }

    Ok(ProbabilityBlock {
        n_samples,
        min_ploidy,
        max_ploidy,
        phased,
        bits,
        samples,
    })
}

fn short_block(actual: usize, needed: usize) -> BgenError {
    BgenError::format(format!(
        "layout 2 probability block is {actual} bytes; its fixed fields alone need {needed}"
    ))
}

////////////////////////////////////////////////////////////////////////////////////////////
// Per-sample decoding
////////////////////////////////////////////////////////////////////////////////////////////

struct SampleDecoder {
    alleles: u16,
    phased: bool,
    width: u32,
    denominator: u64,
    genotypes: CombinationTable,
}

impl SampleDecoder {
    fn new(alleles: u16, phased: bool, bits: u8) -> Self {
        let width = u32::from(bits);
        Self {
            alleles,
            phased,
            width,
            denominator: (1u64 << width) - 1,
            genotypes: CombinationTable::new(alleles),
        }
    }

    /// Number of values stored in the bitstream for a sample of this ploidy.
    fn explicit_count(&mut self, ploidy: u8) -> Result<u64> {
        if self.phased {
            return Ok(u64::from(ploidy) * u64::from(self.alleles - 1));
        }
        let genotypes = self.genotypes.genotypes(ploidy).ok_or_else(|| {
            BgenError::format(format!(
                "genotype count for {} alleles at ploidy {ploidy} overflows",
                self.alleles
            ))
        })?;
        Ok(genotypes - 1)
    }

    fn read(&mut self, reader: &mut BitReader<'_>, info: u8) -> Result<SampleProbability> {
        let missing = info & MISSING_BIT != 0;
        let ploidy = info & PLOIDY_MASK;
        let count = self.explicit_count(ploidy)?;
        let total_bits = count
            .checked_mul(u64::from(self.width))
            .ok_or_else(|| BgenError::format("sample bit count overflows"))?;

        if missing {
            reader.skip(total_bits)?;
            return Ok(SampleProbability {
                missing,
                ploidy,
                probabilities: Vec::new(),
            });
        }

        // Bounds the allocation below by what the stream can actually hold.
        let available = reader.bits_remaining();
        if total_bits > available {
            return Err(BitReaderError::EndOfData {
                requested: total_bits,
                available,
            }
            .into());
        }

        let denominator = self.denominator as f64;
        let mut probabilities = Vec::with_capacity(count as usize + 1);
        let mut raw_sum: u128 = 0;
        for _ in 0..count {
            let raw = reader.read_uint(self.width)?;
            raw_sum += u128::from(raw);
            probabilities.push(raw as f64 / denominator);
        }
        let implied = i128::from(self.denominator) - raw_sum as i128;
        probabilities.push(implied as f64 / denominator);

        Ok(SampleProbability {
            missing,
            ploidy,
            probabilities,
        })
    }
}
