// ========================================================================================
//
//                              Variant record decoder
//
// ========================================================================================
//
// A record is parsed strictly in order:
//
//   [layout 1: u32 N] id(u16) rsid(u16) chrom(u16) u32 position
//   [layout 2: u16 K] K x allele(u32) genotype block
//
// `VariantDecoder` parses one record at a caller-chosen offset and reports where
// the next one begins. It keeps no position between calls; the sequential cursor
// lives in `reader.rs`.

use crate::compression::decompress_into;
use crate::error::{BgenError, Result};
use crate::header::Header;
use crate::probability::{ProbabilityBlock, decode_layout1, decode_layout2, layout1_block_len};
use crate::shared::files::ByteRangeSource;
use crate::types::{Compression, DecodeOptions, Layout, Variant};
use std::sync::Arc;

/// A fully decoded record and the offset of the record after it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVariant {
    pub variant: Variant,
    pub next_offset: u64,
}

/// Identifying fields of a record whose genotype block was stepped over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSummary {
    pub offset: u64,
    pub next_offset: u64,
    pub id: String,
    pub rsid: String,
    pub chromosome: String,
    pub position: u32,
    pub alleles: Vec<String>,
}

impl VariantSummary {
    /// Bytes occupied by the record, genotype block included.
    pub fn size(&self) -> u64 {
        self.next_offset - self.offset
    }
}

struct Metadata {
    layout1_samples: Option<u32>,
    id: String,
    rsid: String,
    chromosome: String,
    position: u32,
    alleles: Vec<String>,
}

/// Where the stored genotype bytes sit and how large they are once inflated.
struct BlockFrame {
    stored_len: u64,
    codec: Compression,
    decompressed_len: usize,
}

/// Stateless record decoder bound to one byte source.
///
/// Owns two scratch buffers that are reused across calls. Nothing returned from
/// this type borrows from them. One instance must not be shared between
/// threads; give each worker its own.
pub struct VariantDecoder {
    source: Arc<dyn ByteRangeSource>,
    layout: Layout,
    compression: Compression,
    options: DecodeOptions,
    stored: Vec<u8>,
    inflated: Vec<u8>,
}

impl VariantDecoder {
    pub fn new(source: Arc<dyn ByteRangeSource>, header: &Header, options: DecodeOptions) -> Self {
        Self {
            source,
            layout: header.layout,
            compression: header.compression,
            options,
            stored: Vec::new(),
            inflated: Vec::new(),
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decodes the record starting at `offset`.
    ///
    /// Returns `Ok(None)` when `offset` is at or beyond the end of the data. A
    /// record that starts but cannot be completed is a [`BgenError::TruncatedRecord`].
    pub fn decode_at(&mut self, offset: u64) -> Result<Option<DecodedVariant>> {
        if offset >= self.source.len() {
            return Ok(None);
        }
        self.decode_record(offset).map(Some).map_err(mark_truncation)
    }

    /// Reads only the identifying fields of the record at `offset` and steps
    /// over its genotype block without reading or decompressing it.
    pub fn skip_at(&mut self, offset: u64) -> Result<Option<VariantSummary>> {
        if offset >= self.source.len() {
            return Ok(None);
        }
        self.skip_record(offset).map(Some).map_err(mark_truncation)
    }

    fn decode_record(&mut self, offset: u64) -> Result<DecodedVariant> {
        let mut cursor = RecordCursor::new(self.source.as_ref(), offset);
        let meta = read_metadata(&mut cursor, self.layout)?;
        let frame = read_block_frame(&mut cursor, self.layout, self.compression, &meta)?;
        cursor.read_into(frame.stored_len, &mut self.stored)?;
        let next_offset = cursor.offset;

        let payload = decompress_into(
            frame.codec,
            &self.stored,
            frame.decompressed_len,
            &mut self.inflated,
        )?;
        let block = match self.layout {
            Layout::One => decode_layout1(payload, meta.layout1_samples.unwrap_or(0))?,
            Layout::Two => decode_layout2(payload, meta.alleles.len() as u16, &self.options)?,
        };

        Ok(DecodedVariant {
            variant: assemble(offset, meta, block),
            next_offset,
        })
    }

    fn skip_record(&mut self, offset: u64) -> Result<VariantSummary> {
        let mut cursor = RecordCursor::new(self.source.as_ref(), offset);
        let meta = read_metadata(&mut cursor, self.layout)?;
        let frame = read_block_frame(&mut cursor, self.layout, self.compression, &meta)?;
        cursor.skip(frame.stored_len)?;
        Ok(VariantSummary {
            offset,
            next_offset: cursor.offset,
            id: meta.id,
            rsid: meta.rsid,
            chromosome: meta.chromosome,
            position: meta.position,
            alleles: meta.alleles,
        })
    }
}

fn mark_truncation(err: BgenError) -> BgenError {
    if err.is_unexpected_eof() {
        BgenError::TruncatedRecord(Box::new(err))
    } else {
        err
    }
}

fn assemble(offset: u64, meta: Metadata, block: ProbabilityBlock) -> Variant {
    Variant {
        offset,
        id: meta.id,
        rsid: meta.rsid,
        chromosome: meta.chromosome,
        position: meta.position,
        n_samples: block.n_samples,
        n_alleles: meta.alleles.len() as u16,
        alleles: meta.alleles,
        min_ploidy: block.min_ploidy,
        max_ploidy: block.max_ploidy,
        phased: block.phased,
        bits: block.bits,
        samples: block.samples,
    }
}

fn read_metadata(cursor: &mut RecordCursor<'_>, layout: Layout) -> Result<Metadata> {
    let layout1_samples = match layout {
        Layout::One => Some(cursor.u32()?),
        Layout::Two => None,
    };

    let id_len = cursor.u16()?;
    let id = cursor.string(u64::from(id_len), "variant id")?;
    let rsid_len = cursor.u16()?;
    let rsid = cursor.string(u64::from(rsid_len), "rsid")?;
    let chromosome_len = cursor.u16()?;
    let chromosome = cursor.string(u64::from(chromosome_len), "chromosome")?;
    let position = cursor.u32()?;

    let n_alleles = match layout {
        Layout::One => 2,
        Layout::Two => cursor.u16()?,
    };
    let mut alleles = Vec::with_capacity(usize::from(n_alleles));
    for _ in 0..n_alleles {
        let len = cursor.u32()?;
        alleles.push(cursor.string(u64::from(len), "allele")?);
    }

    Ok(Metadata {
        layout1_samples,
        id,
        rsid,
        chromosome,
        position,
        alleles,
    })
}

fn read_block_frame(
    cursor: &mut RecordCursor<'_>,
    layout: Layout,
    compression: Compression,
    meta: &Metadata,
) -> Result<BlockFrame> {
    match layout {
        Layout::One => {
            let decompressed_len = layout1_block_len(meta.layout1_samples.unwrap_or(0))?;
            let stored_len = match compression {
                Compression::None => decompressed_len as u64,
                _ => u64::from(cursor.u32()?),
            };
            Ok(BlockFrame {
                stored_len,
                codec: compression,
                decompressed_len,
            })
        }
        Layout::Two => {
            let block_len = cursor.u32()?;
            if !compression.is_compressed() {
                return Ok(BlockFrame {
                    stored_len: u64::from(block_len),
                    codec: compression,
                    decompressed_len: block_len as usize,
                });
            }
            if block_len < 4 {
                return Err(BgenError::format(format!(
                    "compressed genotype block length {block_len} cannot hold its 4-byte decompressed length"
                )));
            }
            let decompressed_len = cursor.u32()?;
            Ok(BlockFrame {
                stored_len: u64::from(block_len - 4),
                codec: compression,
                decompressed_len: decompressed_len as usize,
            })
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////
// Field cursor
////////////////////////////////////////////////////////////////////////////////////////////

/// Forward-only reader of little-endian fields starting at a record offset.
struct RecordCursor<'a> {
    source: &'a dyn ByteRangeSource,
    offset: u64,
    text: Vec<u8>,
}

impl<'a> RecordCursor<'a> {
    fn new(source: &'a dyn ByteRangeSource, offset: u64) -> Self {
        Self {
            source,
            offset,
            text: Vec::new(),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.source.read_at(self.offset, &mut buf)?;
        self.offset += N as u64;
        Ok(buf)
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    /// Fails before allocating when fewer than `len` bytes remain.
    fn ensure(&self, len: u64) -> Result<()> {
        let available = self.source.len().saturating_sub(self.offset);
        if len > available {
            return Err(BgenError::UnexpectedEof {
                offset: self.offset,
                requested: len,
                available,
            });
        }
        Ok(())
    }

    fn read_into(&mut self, len: u64, buf: &mut Vec<u8>) -> Result<()> {
        self.ensure(len)?;
        buf.clear();
        buf.resize(len as usize, 0);
        self.source.read_at(self.offset, buf)?;
        self.offset += len;
        Ok(())
    }

    fn string(&mut self, len: u64, field: &str) -> Result<String> {
        let mut text = std::mem::take(&mut self.text);
        self.read_into(len, &mut text)?;
        let value = std::str::from_utf8(&text)
            .map(str::to_owned)
            .map_err(|e| BgenError::format(format!("{field} is not valid UTF-8: {e}")));
        self.text = text;
        value
    }

    fn skip(&mut self, len: u64) -> Result<()> {
        self.ensure(len)?;
        self.offset += len;
        Ok(())
    }
}
