//! In-memory BGEN writer shared by the unit tests and, through `tests/common`,
//! the integration tests.

use super::{Compression, Layout};
use flate2::write::ZlibEncoder;
use std::io::Write;

/// Builds a layout 2 probability block from raw per-sample info bytes and an
/// already packed bitstream.
pub(crate) fn layout2_payload(
    alleles: u16,
    phased: u8,
    bits: u8,
    info: &[u8],
    stream: &[u8],
) -> Vec<u8> {
    let ploidy = info.iter().map(|i| i & 0x3f);
    let mut out = Vec::new();
    out.extend_from_slice(&(info.len() as u32).to_le_bytes());
    out.extend_from_slice(&alleles.to_le_bytes());
    out.push(ploidy.clone().min().unwrap_or(0));
    out.push(ploidy.max().unwrap_or(0));
    out.extend_from_slice(info);
    out.push(phased);
    out.push(bits);
    out.extend_from_slice(stream);
    out
}

/// Builds a layout 1 probability block, one `[u16; 3]` per sample.
pub(crate) fn layout1_payload(samples: &[[u16; 3]]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|triple| triple.iter().flat_map(|v| v.to_le_bytes()))
        .collect()
}

pub(crate) struct RecordFixture {
    id: String,
    rsid: String,
    chromosome: String,
    position: u32,
    alleles: Vec<String>,
    payload: Vec<u8>,
}

impl RecordFixture {
    pub(crate) fn new(id: &str, position: u32, alleles: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            rsid: format!("rs{position}"),
            chromosome: "01".to_string(),
            position,
            alleles: alleles.iter().map(|a| a.to_string()).collect(),
            payload: Vec::new(),
        }
    }

    pub(crate) fn chromosome(mut self, chromosome: &str) -> Self {
        self.chromosome = chromosome.to_string();
        self
    }

    pub(crate) fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Bytes between the record start and its genotype block.
    pub(crate) fn metadata_len(&self, layout: Layout) -> usize {
        let prefix = if layout == Layout::One { 4 } else { 2 };
        prefix
            + 6
            + self.id.len()
            + self.rsid.len()
            + self.chromosome.len()
            + 4
            + self.alleles.iter().map(|a| 4 + a.len()).sum::<usize>()
    }

    fn encode(&self, layout: Layout, compression: Compression, out: &mut Vec<u8>) {
        if layout == Layout::One {
            out.extend_from_slice(&((self.payload.len() / 6) as u32).to_le_bytes());
        }
        for text in [&self.id, &self.rsid, &self.chromosome] {
            out.extend_from_slice(&(text.len() as u16).to_le_bytes());
            out.extend_from_slice(text.as_bytes());
        }
        out.extend_from_slice(&self.position.to_le_bytes());
        if layout == Layout::Two {
            out.extend_from_slice(&(self.alleles.len() as u16).to_le_bytes());
        }
        for allele in &self.alleles {
            out.extend_from_slice(&(allele.len() as u32).to_le_bytes());
            out.extend_from_slice(allele.as_bytes());
        }

        let stored = compress(compression, &self.payload);
        match (layout, compression) {
            (Layout::One, Compression::None) => out.extend_from_slice(&stored),
            (Layout::One, _) => {
                out.extend_from_slice(&(stored.len() as u32).to_le_bytes());
                out.extend_from_slice(&stored);
            }
            (Layout::Two, Compression::None) => {
                out.extend_from_slice(&(stored.len() as u32).to_le_bytes());
                out.extend_from_slice(&stored);
            }
            (Layout::Two, _) => {
                out.extend_from_slice(&(stored.len() as u32 + 4).to_le_bytes());
                out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
                out.extend_from_slice(&stored);
            }
        }
    }
}

fn compress(compression: Compression, payload: &[u8]) -> Vec<u8> {
    match compression {
        Compression::None => payload.to_vec(),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(payload).unwrap();
            encoder.finish().unwrap()
        }
        Compression::Zstd => zstd::encode_all(payload, 0).unwrap(),
    }
}

fn compression_code(compression: Compression) -> u32 {
    match compression {
        Compression::None => 0,
        Compression::Zlib => 1,
        Compression::Zstd => 2,
    }
}

pub(crate) struct FileBuilder {
    layout: Layout,
    compression: Compression,
    n_samples: u32,
    sample_ids: Option<Vec<String>>,
    free_data: Vec<u8>,
    declared_variants: Option<u32>,
    records: Vec<RecordFixture>,
}

impl FileBuilder {
    pub(crate) fn new(layout: Layout, compression: Compression, n_samples: u32) -> Self {
        Self {
            layout,
            compression,
            n_samples,
            sample_ids: None,
            free_data: Vec::new(),
            declared_variants: None,
            records: Vec::new(),
        }
    }

    pub(crate) fn sample_ids(mut self, ids: &[&str]) -> Self {
        self.sample_ids = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub(crate) fn free_data(mut self, free_data: &[u8]) -> Self {
        self.free_data = free_data.to_vec();
        self
    }

    /// Overrides the header variant count, which otherwise matches the records.
    pub(crate) fn declared_variants(mut self, count: u32) -> Self {
        self.declared_variants = Some(count);
        self
    }

    pub(crate) fn record(mut self, record: RecordFixture) -> Self {
        self.records.push(record);
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut sample_block = Vec::new();
        if let Some(ids) = &self.sample_ids {
            let body: Vec<u8> = ids
                .iter()
                .flat_map(|id| {
                    let mut entry = (id.len() as u16).to_le_bytes().to_vec();
                    entry.extend_from_slice(id.as_bytes());
                    entry
                })
                .collect();
            sample_block.extend_from_slice(&(body.len() as u32 + 8).to_le_bytes());
            sample_block.extend_from_slice(&(ids.len() as u32).to_le_bytes());
            sample_block.extend_from_slice(&body);
        }

        let header_length = 20 + self.free_data.len() as u32;
        let declared = self
            .declared_variants
            .unwrap_or(self.records.len() as u32);
        let flags = compression_code(self.compression)
            | (self.layout.code() << 2)
            | if self.sample_ids.is_some() { 1 << 31 } else { 0 };

        let mut out = Vec::new();
        out.extend_from_slice(&(header_length + sample_block.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_length.to_le_bytes());
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(&self.n_samples.to_le_bytes());
        out.extend_from_slice(b"bgen");
        out.extend_from_slice(&self.free_data);
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&sample_block);
        for record in &self.records {
            record.encode(self.layout, self.compression, &mut out);
        }
        out
    }
}
