// ========================================================================================
//
//                          File context and sequential cursor
//
// ========================================================================================

use crate::error::{BgenError, Result};
use crate::header::Header;
use crate::samples::SampleIdentifiers;
use crate::shared::files::{ByteRangeSource, SourceMode, open_byte_source};
use crate::types::{DecodeOptions, Variant};
use crate::variant::{VariantDecoder, VariantSummary};
use log::{debug, warn};
use std::path::Path;
use std::sync::Arc;

/// An open BGEN file: its bytes and its parsed header.
///
/// Cheap to clone. Each clone shares the same byte source; decoders created
/// from it own their own scratch space.
#[derive(Clone)]
pub struct Bgen {
    source: Arc<dyn ByteRangeSource>,
    header: Header,
    options: DecodeOptions,
}

impl Bgen {
    /// Memory-maps `path` and parses its header.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, SourceMode::Mmap, DecodeOptions::default())
    }

    pub fn open_with(path: &Path, mode: SourceMode, options: DecodeOptions) -> Result<Self> {
        let source = open_byte_source(path, mode)?;
        Ok(Self::from_source(source)?.with_options(options))
    }

    pub fn from_source(source: Arc<dyn ByteRangeSource>) -> Result<Self> {
        let header = Header::read(source.as_ref())?;
        Ok(Self {
            source,
            header,
            options: DecodeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn source(&self) -> Arc<dyn ByteRangeSource> {
        Arc::clone(&self.source)
    }

    /// Sample identifiers stored in the file.
    pub fn samples(&self) -> Result<SampleIdentifiers> {
        SampleIdentifiers::read(self.source.as_ref(), &self.header)
    }

    /// Stored identifiers when present, numbered placeholders otherwise.
    pub fn samples_or_placeholders(&self) -> Result<SampleIdentifiers> {
        if self.header.has_sample_identifiers {
            self.samples()
        } else {
            Ok(SampleIdentifiers::synthesize(self.header.n_samples))
        }
    }

    pub fn decoder(&self) -> VariantDecoder {
        VariantDecoder::new(self.source(), &self.header, self.options)
    }

    /// A cursor positioned at the first variant record.
    pub fn variant_reader(&self) -> VariantReader {
        VariantReader {
            decoder: self.decoder(),
            offset: self.header.first_variant_offset(),
            declared_variants: self.header.n_variants,
            variants_seen: 0,
            last_error: None,
            end_reported: false,
        }
    }

    /// Walks every record without decoding probabilities.
    pub fn summaries(&self) -> Summaries {
        Summaries {
            decoder: self.decoder(),
            offset: self.header.first_variant_offset(),
            ordinal: 0,
            done: false,
        }
    }
}

impl std::fmt::Debug for Bgen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bgen")
            .field("len", &self.source.len())
            .field("header", &self.header)
            .field("options", &self.options)
            .finish()
    }
}

/// Sequential reader over the variant records of one file.
///
/// Not meant to be shared between threads. For parallel work, hand each worker
/// its own [`Bgen`] clone and use [`VariantReader::read_at`] or a fresh reader.
pub struct VariantReader {
    decoder: VariantDecoder,
    offset: u64,
    declared_variants: u32,
    variants_seen: u64,
    last_error: Option<BgenError>,
    end_reported: bool,
}

impl VariantReader {
    /// Decodes the record at the cursor and advances past it.
    ///
    /// `Ok(None)` marks a clean end of the file. On error the cursor stays where
    /// it was; resume from a known offset with [`VariantReader::seek`].
    pub fn next_variant(&mut self) -> Result<Option<Variant>> {
        let ordinal = self.variants_seen;
        match self.decoder.decode_at(self.offset) {
            Ok(Some(decoded)) => {
                self.offset = decoded.next_offset;
                self.variants_seen += 1;
                Ok(Some(decoded.variant))
            }
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(err) => Err(err.in_variant(ordinal, self.offset)),
        }
    }

    /// Decodes the record at an arbitrary offset without moving the cursor.
    pub fn read_at(&mut self, offset: u64) -> Result<Option<Variant>> {
        self.decoder
            .decode_at(offset)
            .map(|decoded| decoded.map(|d| d.variant))
            .map_err(|err| err.at_offset(offset))
    }

    /// Moves the cursor to a record boundary obtained elsewhere, such as an index.
    pub fn seek(&mut self, offset: u64) {
        self.offset = offset;
        self.last_error = None;
        self.end_reported = false;
    }

    /// Byte offset of the next record the cursor will decode.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Records decoded so far through the cursor.
    pub fn variants_seen(&self) -> u64 {
        self.variants_seen
    }

    /// The error that stopped iteration, if any.
    pub fn last_error(&self) -> Option<&BgenError> {
        self.last_error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<BgenError> {
        self.last_error.take()
    }

    /// Logs the end of the scan once per position. Returns whether it logged.
    fn finish(&mut self) -> bool {
        if self.end_reported {
            return false;
        }
        self.end_reported = true;
        if self.variants_seen != u64::from(self.declared_variants) {
            warn!(
                "Reached end of file after {} variants; the header declares {}",
                self.variants_seen, self.declared_variants
            );
        } else {
            debug!("Reached end of file after {} variants", self.variants_seen);
        }
        true
    }
}

impl Iterator for VariantReader {
    type Item = Variant;

    /// Yields variants until the end of the file or the first error, which is
    /// then available from [`VariantReader::last_error`].
    fn next(&mut self) -> Option<Variant> {
        if self.last_error.is_some() {
            return None;
        }
        match self.next_variant() {
            Ok(variant) => variant,
            Err(err) => {
                self.last_error = Some(err);
                None
            }
        }
    }
}

/// Metadata-only walk over every record, produced by [`Bgen::summaries`].
pub struct Summaries {
    decoder: VariantDecoder,
    offset: u64,
    ordinal: u64,
    done: bool,
}

impl Iterator for Summaries {
    type Item = Result<VariantSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decoder.skip_at(self.offset) {
            Ok(Some(summary)) => {
                self.offset = summary.next_offset;
                self.ordinal += 1;
                Some(Ok(summary))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err.in_variant(self.ordinal, self.offset)))
            }
        }
    }
}
