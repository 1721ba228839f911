#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use bgen_decode::{
    Bgen, BitOrder, DecodeOptions, ScanIndex, SampleNames, SourceMode, Variant, decode_offsets,
    default_workers,
};
use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "bgen-decode",
    about = "Read-only decoder for BGEN genotype probability files",
    long_about = "Inspects, indexes and summarises BGEN files (layouts 1 and 2, \
                 uncompressed, zlib or zstd genotype blocks)."
)]
struct Cli {
    #[command(flatten)]
    decode: DecodeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags shared by every subcommand.
#[derive(Args)]
struct DecodeArgs {
    /// Accept records whose bitstream has whole unread bytes after the last sample
    #[arg(long, global = true)]
    lenient: bool,

    /// Read packed probabilities least-significant bit first
    #[arg(long = "lsb-first", global = true)]
    lsb_first: bool,

    /// Read through buffered file I/O instead of a memory map
    #[arg(long, global = true)]
    buffered: bool,
}

impl DecodeArgs {
    fn options(&self) -> DecodeOptions {
        DecodeOptions {
            strict_end_of_stream: !self.lenient,
            bit_order: if self.lsb_first {
                BitOrder::LsbFirst
            } else {
                BitOrder::MsbFirst
            },
        }
    }

    fn mode(&self) -> SourceMode {
        if self.buffered {
            SourceMode::Buffered
        } else {
            SourceMode::Mmap
        }
    }

    fn open(&self, path: &Path) -> bgen_decode::Result<Bgen> {
        Bgen::open_with(path, self.mode(), self.options())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header, the first sample names and the first decoded variants
    #[command(about = "Show header, samples and leading variants")]
    Inspect {
        #[arg(value_name = "BGEN")]
        path: PathBuf,

        /// Number of variants to decode and print
        #[arg(long, value_name = "N", default_value = "5")]
        variants: usize,

        /// Number of samples to print per variant
        #[arg(long, value_name = "N", default_value = "5")]
        samples: usize,
    },

    /// Scan every record once and write the offset index as TSV
    #[command(about = "Build a variant offset index (outputs: <BGEN>.idx.tsv)")]
    Index {
        #[arg(value_name = "BGEN")]
        path: PathBuf,

        /// Destination of the index; defaults to the BGEN path with `.idx.tsv` appended
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Sum expected allele counts over all biallelic unphased variants
    #[command(about = "Total expected dosage per alternate allele")]
    Count {
        #[arg(value_name = "BGEN")]
        path: PathBuf,

        /// Offset index written by `index`; the file is scanned when omitted
        #[arg(long, value_name = "PATH")]
        index: Option<PathBuf>,

        /// Worker threads; defaults to the number of logical CPUs
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
}

type CliResult = Result<(), Box<dyn Error>>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { decode, command } = Cli::parse();
    let result = match command {
        Some(Commands::Inspect {
            path,
            variants,
            samples,
        }) => run_inspect(&decode, &path, variants, samples),
        Some(Commands::Index { path, out }) => run_index(&decode, &path, out),
        Some(Commands::Count {
            path,
            index,
            workers,
        }) => run_count(&decode, &path, index.as_deref(), workers),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let mut cause = e.source();
        while let Some(inner) = cause {
            eprintln!("  caused by: {inner}");
            cause = inner.source();
        }
        process::exit(1);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////
// inspect
////////////////////////////////////////////////////////////////////////////////////////////

fn run_inspect(decode: &DecodeArgs, path: &Path, variants: usize, samples: usize) -> CliResult {
    let bgen = decode.open(path)?;
    let header = bgen.header();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "file\t{}", path.display())?;
    writeln!(out, "layout\t{}", header.layout)?;
    writeln!(out, "compression\t{}", header.compression)?;
    writeln!(out, "variants\t{}", header.n_variants)?;
    writeln!(out, "samples\t{}", header.n_samples)?;
    writeln!(out, "first_variant_offset\t{}", header.first_variant_offset())?;
    writeln!(out, "free_data_bytes\t{}", header.free_data.len())?;

    let names = bgen.samples_or_placeholders()?;
    let shown: Vec<&str> = names
        .sample_names()
        .iter()
        .take(samples)
        .map(String::as_str)
        .collect();
    let source = if header.has_sample_identifiers {
        "stored"
    } else {
        "numbered"
    };
    writeln!(out, "sample_names ({source})\t{}", shown.join(","))?;

    let mut reader = bgen.variant_reader();
    for _ in 0..variants {
        let Some(variant) = reader.next_variant()? else {
            break;
        };
        write_variant(&mut out, &variant, &shown)?;
    }
    Ok(())
}

fn write_variant(out: &mut impl Write, variant: &Variant, names: &[&str]) -> io::Result<()> {
    writeln!(
        out,
        "\n{}\t{}\t{}:{}\t{}\toffset={} ploidy={}..={} phased={} bits={}",
        variant.id,
        variant.rsid,
        variant.chromosome,
        variant.position,
        variant.alleles.join("/"),
        variant.offset,
        variant.min_ploidy,
        variant.max_ploidy,
        variant.phased,
        variant.bits,
    )?;
    for (name, sample) in names.iter().zip(&variant.samples) {
        if sample.missing {
            writeln!(out, "  {name}\tmissing")?;
            continue;
        }
        let values: Vec<String> = sample
            .probabilities
            .iter()
            .map(|p| format!("{p:.4}"))
            .collect();
        writeln!(out, "  {name}\t{}", values.join(" "))?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////
// index
////////////////////////////////////////////////////////////////////////////////////////////

fn default_index_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".idx.tsv");
    PathBuf::from(name)
}

fn run_index(decode: &DecodeArgs, path: &Path, out: Option<PathBuf>) -> CliResult {
    let bgen = decode.open(path)?;
    let index = ScanIndex::build(&bgen)?;
    let out = out.unwrap_or_else(|| default_index_path(path));
    index.save(&out)?;
    info!("Wrote {} index entries to {}", index.len(), out.display());
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////
// count
////////////////////////////////////////////////////////////////////////////////////////////

/// Running totals for one alternate allele.
#[derive(Default)]
struct AlleleTotal {
    variants: u64,
    called: u64,
    dosage: f64,
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    let style = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|style| style.progress_chars("█▉▊▋▌▍▎▏  "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Expected alternate-allele count summed over called samples, or `None` for
/// variants that are not biallelic and unphased.
fn variant_dosage(variant: Variant) -> Option<(String, u64, f64)> {
    if variant.n_alleles != 2 || variant.phased {
        return None;
    }
    let (called, dosage) = variant
        .samples
        .iter()
        .filter_map(|s| s.expected_dosage())
        .fold((0u64, 0.0), |(n, sum), d| (n + 1, sum + d));
    let alt = variant.alleles.into_iter().nth(1)?;
    Some((alt, called, dosage))
}

fn run_count(
    decode: &DecodeArgs,
    path: &Path,
    index: Option<&Path>,
    workers: Option<usize>,
) -> CliResult {
    let bgen = decode.open(path)?;
    let index = match index {
        Some(index_path) => ScanIndex::load(index_path)?,
        None => ScanIndex::build(&bgen)?,
    };
    let offsets = index.offsets();
    let workers = workers.unwrap_or_else(default_workers);

    let pb = create_progress_bar(offsets.len() as u64, "decoding variants");
    let totals = decode_offsets(
        || Ok(bgen.clone()),
        &offsets,
        workers,
        variant_dosage,
        BTreeMap::<String, AlleleTotal>::new(),
        |totals, result| {
            pb.inc(1);
            if let Some((allele, called, dosage)) = result {
                let total = totals.entry(allele).or_default();
                total.variants += 1;
                total.called += called;
                total.dosage += dosage;
            }
        },
    );
    pb.finish_and_clear();
    let totals = totals?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "allele\tvariants\tcalled_samples\texpected_count")?;
    for (allele, total) in &totals {
        writeln!(
            out,
            "{allele}\t{}\t{}\t{:.6}",
            total.variants, total.called, total.dosage
        )?;
    }
    Ok(())
}
