//! Synthetic BGEN files for integration tests. Records and headers come from the
//! same builder the unit tests use; this module adds bit packing from raw
//! per-sample integers and writing to disk.

pub use bgen_decode::{BitOrder, Compression, Layout};
use std::path::{Path, PathBuf};

#[path = "../../decode/testing.rs"]
mod fixture;

pub(crate) use fixture::{FileBuilder, RecordFixture, layout1_payload, layout2_payload};

/// Packs `(value, width)` fields into a bitstream in the given order.
pub fn pack(fields: &[(u64, u32)], order: BitOrder) -> Vec<u8> {
    let total: u32 = fields.iter().map(|(_, width)| width).sum();
    let mut out = vec![0u8; total.div_ceil(8) as usize];
    let mut position = 0usize;
    for &(value, width) in fields {
        for i in 0..width {
            let bit = match order {
                BitOrder::MsbFirst => (value >> (width - 1 - i)) & 1,
                BitOrder::LsbFirst => (value >> i) & 1,
            };
            if bit == 1 {
                let shift = match order {
                    BitOrder::MsbFirst => 7 - position % 8,
                    BitOrder::LsbFirst => position % 8,
                };
                out[position / 8] |= 1 << shift;
            }
            position += 1;
        }
    }
    out
}

/// Raw stored integers for one sample of a layout 2 block.
#[derive(Clone)]
pub struct SampleRaw {
    pub ploidy: u8,
    pub missing: bool,
    pub values: Vec<u64>,
}

impl SampleRaw {
    pub fn called(ploidy: u8, values: &[u64]) -> Self {
        Self {
            ploidy,
            missing: false,
            values: values.to_vec(),
        }
    }

    pub fn missing(ploidy: u8, width: usize) -> Self {
        Self {
            ploidy,
            missing: true,
            values: vec![0; width],
        }
    }
}

/// Encodes an uncompressed layout 2 probability block.
pub fn layout2_block(
    alleles: u16,
    phased: bool,
    bits: u8,
    samples: &[SampleRaw],
    order: BitOrder,
) -> Vec<u8> {
    let info: Vec<u8> = samples
        .iter()
        .map(|s| s.ploidy | if s.missing { 0x80 } else { 0 })
        .collect();
    let fields: Vec<(u64, u32)> = samples
        .iter()
        .flat_map(|s| s.values.iter().map(|&v| (v, u32::from(bits))))
        .collect();
    layout2_payload(alleles, u8::from(phased), bits, &info, &pack(&fields, order))
}

/// Writes `bytes` into `dir` and returns the path.
pub fn write_file(bytes: &[u8], dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write bgen file");
    path
}
