// ========================================================================================
//
//                               Variant offset index
//
// ========================================================================================
//
// Random access needs record boundaries. `VariantOffsets` is the narrow contract
// the decoders consume; `ScanIndex` is one implementation, built by walking the
// file once with metadata-only reads and persisted as tab-separated text.

use crate::error::{BgenError, Result};
use crate::reader::Bgen;
use crate::variant::VariantSummary;
use log::{debug, info};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Resolves the n-th variant of a file to the byte offset of its record.
pub trait VariantOffsets {
    fn variant_count(&self) -> usize;
    fn offset_for_variant(&self, index: usize) -> Option<u64>;
}

const TSV_HEADER: &str = "#offset\tsize\tid\trsid\tchromosome\tposition\talleles";
const ALLELE_SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    /// Record length in bytes, genotype block included.
    pub size: u64,
    pub id: String,
    pub rsid: String,
    pub chromosome: String,
    pub position: u32,
    pub alleles: Vec<String>,
}

impl From<VariantSummary> for IndexEntry {
    fn from(summary: VariantSummary) -> Self {
        Self {
            offset: summary.offset,
            size: summary.size(),
            id: summary.id,
            rsid: summary.rsid,
            chromosome: summary.chromosome,
            position: summary.position,
            alleles: summary.alleles,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanIndex {
    entries: Vec<IndexEntry>,
    by_name: HashMap<String, usize>,
}

impl ScanIndex {
    /// Walks every record of `bgen`, stepping over genotype blocks.
    pub fn build(bgen: &Bgen) -> Result<Self> {
        let entries = bgen
            .summaries()
            .map(|summary| summary.map(IndexEntry::from))
            .collect::<Result<Vec<_>>>()?;
        let declared = bgen.header().n_variants;
        info!(
            "Indexed {} variant records (header declares {declared})",
            entries.len()
        );
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<IndexEntry>) -> Self {
        let mut by_name = HashMap::with_capacity(entries.len() * 2);
        for (i, entry) in entries.iter().enumerate() {
            by_name.entry(entry.id.clone()).or_insert(i);
            if !entry.rsid.is_empty() {
                by_name.entry(entry.rsid.clone()).or_insert(i);
            }
        }
        Self { entries, by_name }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset of the first record whose variant id or rsid equals `name`.
    pub fn offset_for_id(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).map(|&i| self.entries[i].offset)
    }

    pub fn offsets(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.offset).collect()
    }

    pub fn write_tsv<W: Write>(&self, out: W) -> Result<()> {
        let mut out = BufWriter::new(out);
        writeln!(out, "{TSV_HEADER}")?;
        for entry in &self.entries {
            for field in [&entry.id, &entry.rsid, &entry.chromosome] {
                check_tsv_field(field)?;
            }
            for allele in &entry.alleles {
                check_tsv_field(allele)?;
                if allele.contains(ALLELE_SEPARATOR) {
                    return Err(BgenError::format(format!(
                        "allele {allele:?} contains '{ALLELE_SEPARATOR}' and cannot be indexed"
                    )));
                }
            }
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                entry.offset,
                entry.size,
                entry.id,
                entry.rsid,
                entry.chromosome,
                entry.position,
                entry.alleles.join(",")
            )?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn read_tsv<R: BufRead>(input: R) -> Result<Self> {
        let mut entries = Vec::new();
        for (line_no, line) in input.lines().enumerate() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.push(parse_tsv_line(&line).map_err(|msg| {
                BgenError::format(format!("index line {}: {msg}", line_no + 1))
            })?);
        }
        debug!("Loaded {} index entries", entries.len());
        Ok(Self::from_entries(entries))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.write_tsv(File::create(path)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::read_tsv(BufReader::new(File::open(path)?))
    }
}

impl VariantOffsets for ScanIndex {
    fn variant_count(&self) -> usize {
        self.entries.len()
    }

    fn offset_for_variant(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|e| e.offset)
    }
}

fn check_tsv_field(field: &str) -> Result<()> {
    if field.contains(['\t', '\n', '\r']) {
        return Err(BgenError::format(format!(
            "field {field:?} contains a tab or line break and cannot be indexed"
        )));
    }
    Ok(())
}

fn parse_tsv_line(line: &str) -> std::result::Result<IndexEntry, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    let &[offset, size, id, rsid, chromosome, position, alleles] = fields.as_slice() else {
        return Err(format!("expected 7 tab-separated fields, found {}", fields.len()));
    };
    let number = |name: &str, value: &str| {
        value
            .parse::<u64>()
            .map_err(|e| format!("{name} {value:?} is not a number: {e}"))
    };
    let position = u32::try_from(number("position", position)?)
        .map_err(|_| format!("position {position} does not fit in 32 bits"))?;
    Ok(IndexEntry {
        offset: number("offset", offset)?,
        size: number("size", size)?,
        id: id.to_string(),
        rsid: rsid.to_string(),
        chromosome: chromosome.to_string(),
        position,
        alleles: if alleles.is_empty() {
            Vec::new()
        } else {
            alleles.split(ALLELE_SEPARATOR).map(str::to_string).collect()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::files::InMemorySource;
    use crate::testing::{FileBuilder, RecordFixture, layout2_payload};
    use crate::types::{Compression, Layout};
    use std::sync::Arc;

    fn indexed_file() -> Result<(Bgen, ScanIndex)> {
        let bytes = FileBuilder::new(Layout::Two, Compression::Zstd, 1)
            .record(
                RecordFixture::new("first", 11, &["A", "T"])
                    .payload(layout2_payload(2, 0, 8, &[2], &[1, 1])),
            )
            .record(
                RecordFixture::new("second", 22, &["G", "GA", "C"])
                    .payload(layout2_payload(3, 0, 8, &[1], &[9, 9])),
            )
            .build();
        let bgen = Bgen::from_source(Arc::new(InMemorySource::new(bytes)))?;
        let index = ScanIndex::build(&bgen)?;
        Ok((bgen, index))
    }

    #[test]
    fn index_offsets_land_on_record_boundaries() -> Result<()> {
        let (bgen, index) = indexed_file()?;
        assert_eq!(index.variant_count(), 2);
        assert_eq!(
            index.offset_for_variant(0),
            Some(bgen.header().first_variant_offset())
        );
        assert_eq!(index.offset_for_variant(2), None);

        let mut reader = bgen.variant_reader();
        for entry in index.entries() {
            let variant = reader.read_at(entry.offset)?.expect("indexed record");
            assert_eq!(variant.id, entry.id);
            assert_eq!(variant.alleles, entry.alleles);
        }
        let first = &index.entries()[0];
        assert_eq!(first.offset + first.size, index.entries()[1].offset);
        Ok(())
    }

    #[test]
    fn lookup_by_id_or_rsid() -> Result<()> {
        let (_, index) = indexed_file()?;
        assert_eq!(index.offset_for_id("second"), index.offset_for_variant(1));
        assert_eq!(index.offset_for_id("rs11"), index.offset_for_variant(0));
        assert_eq!(index.offset_for_id("absent"), None);
        Ok(())
    }

    #[test]
    fn tsv_persistence_preserves_entries() -> Result<()> {
        let (_, index) = indexed_file()?;
        let mut text = Vec::new();
        index.write_tsv(&mut text)?;
        let reloaded = ScanIndex::read_tsv(text.as_slice())?;
        assert_eq!(reloaded.entries(), index.entries());
        assert_eq!(reloaded.offset_for_id("first"), index.offset_for_id("first"));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("variants.tsv");
        index.save(&path)?;
        assert_eq!(ScanIndex::load(&path)?.len(), 2);
        Ok(())
    }

    #[test]
    fn malformed_tsv_lines_name_the_line() {
        let text = format!("{TSV_HEADER}\n10\t5\tid\trs\t01\tnot-a-number\tA,C\n");
        let err = ScanIndex::read_tsv(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("index line 2"), "{err}");

        let short = "10\t5\tid\n";
        assert!(ScanIndex::read_tsv(short.as_bytes()).is_err());
    }

    #[test]
    fn fields_with_tabs_cannot_be_written() {
        let index = ScanIndex::from_entries(vec![IndexEntry {
            offset: 0,
            size: 1,
            id: "a\tb".into(),
            rsid: String::new(),
            chromosome: "01".into(),
            position: 1,
            alleles: vec!["A".into()],
        }]);
        assert!(index.write_tsv(Vec::new()).is_err());
        assert!(!index.is_empty());
    }
}
