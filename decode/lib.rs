#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
//! Read-only decoding of BGEN genotype probability files.
//!
//! Open a file with [`Bgen::open`], then walk it with a [`VariantReader`] or
//! jump to known record offsets with [`VariantReader::read_at`].

pub mod bits;
pub mod choose;
pub mod compression;
pub mod error;
pub mod header;
pub mod index;
pub mod parallel;
pub mod probability;
pub mod reader;
pub mod samples;
#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod types;
pub mod variant;
pub mod shared {
    pub use super::shared_files as files;
}

#[cfg(test)]
mod testing;

pub use error::{BgenError, Result};
pub use header::Header;
pub use index::{IndexEntry, ScanIndex, VariantOffsets};
pub use parallel::{decode_offsets, default_workers};
pub use reader::{Bgen, Summaries, VariantReader};
pub use samples::{SampleIdentifiers, SampleNames};
pub use shared::files::{ByteRangeSource, SourceMode};
pub use types::{
    BitOrder, Compression, DecodeOptions, DenseProbabilities, Layout, SampleProbability, Variant,
};
pub use variant::{DecodedVariant, VariantDecoder, VariantSummary};
