// ========================================================================================
//
//                         Parallel decoding by record offset
//
// ========================================================================================
//
// One producer feeds record offsets into a bounded channel. Each worker owns its
// own `Bgen` and `VariantDecoder`, decodes whatever offsets it receives, and sends
// the mapped result to the calling thread, which is the only writer of the
// accumulator. Results arrive in completion order, not offset order.

use crate::error::{BgenError, Result};
use crate::reader::Bgen;
use crate::types::Variant;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Offsets buffered per worker before the producer blocks.
const JOBS_PER_WORKER: usize = 4;

/// Default worker count: one per logical CPU.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Decodes the records at `offsets` on `workers` threads and folds the mapped
/// results on the calling thread.
///
/// `open` is called once per worker so each has an independent handle. `fold`
/// sees results in arbitrary order. The first error stops the producer; offsets
/// already handed out still finish, and that error is returned.
pub fn decode_offsets<O, M, T, A, F>(
    open: O,
    offsets: &[u64],
    workers: usize,
    map: M,
    init: A,
    mut fold: F,
) -> Result<A>
where
    O: Fn() -> Result<Bgen> + Sync,
    M: Fn(Variant) -> T + Sync,
    T: Send,
    F: FnMut(&mut A, T),
{
    let workers = workers.max(1).min(offsets.len().max(1));
    let bound = workers * JOBS_PER_WORKER;
    let (job_tx, job_rx) = bounded::<(u64, u64)>(bound);
    let (result_tx, result_rx) = bounded::<Result<T>>(bound);
    let stop = AtomicBool::new(false);
    debug!("Decoding {} records on {workers} workers", offsets.len());

    thread::scope(|s| {
        let stop = &stop;
        let open = &open;
        let map = &map;

        s.spawn(move || {
            for (ordinal, &offset) in offsets.iter().enumerate() {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                if job_tx.send((ordinal as u64, offset)).is_err() {
                    break;
                }
            }
        });

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move || worker_loop(open, map, stop, job_rx, result_tx));
        }
        drop(job_rx);
        drop(result_tx);

        let mut acc = init;
        let mut first_error = None;
        let mut decoded = 0u64;
        for result in result_rx.iter() {
            match result {
                Ok(value) if first_error.is_none() => {
                    fold(&mut acc, value);
                    decoded += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    if first_error.is_none() {
                        stop.store(true, Ordering::Relaxed);
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("Decoded {decoded} records on {workers} workers");
                Ok(acc)
            }
        }
    })
}

fn worker_loop<O, M, T>(
    open: &O,
    map: &M,
    stop: &AtomicBool,
    jobs: Receiver<(u64, u64)>,
    results: Sender<Result<T>>,
) where
    O: Fn() -> Result<Bgen>,
    M: Fn(Variant) -> T,
{
    let mut decoder = match open() {
        Ok(bgen) => bgen.decoder(),
        Err(err) => {
            let _ = results.send(Err(err));
            return;
        }
    };
    for (ordinal, offset) in jobs.iter() {
        if stop.load(Ordering::Relaxed) {
            continue;
        }
        let outcome = match decoder.decode_at(offset) {
            Ok(Some(decoded)) => Ok(map(decoded.variant)),
            Ok(None) => Err(BgenError::format("offset lies at or past the end of the file")
                .in_variant(ordinal, offset)),
            Err(err) => Err(err.in_variant(ordinal, offset)),
        };
        if results.send(outcome).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ScanIndex;
    use crate::shared::files::InMemorySource;
    use crate::testing::{FileBuilder, RecordFixture, layout2_payload};
    use crate::types::{Compression, Layout};
    use std::sync::Arc;

    fn many_variants(n: u32) -> Result<Bgen> {
        let mut builder = FileBuilder::new(Layout::Two, Compression::Zlib, 2);
        for i in 0..n {
            let raw = (i % 200) as u8;
            builder = builder.record(
                RecordFixture::new(&format!("v{i}"), i, &["A", "G"])
                    .payload(layout2_payload(2, 0, 8, &[2, 2], &[raw, 0, 0, raw])),
            );
        }
        Bgen::from_source(Arc::new(InMemorySource::new(builder.build())))
    }

    #[test]
    fn parallel_totals_match_a_sequential_scan() -> Result<()> {
        let bgen = many_variants(97)?;
        let offsets = ScanIndex::build(&bgen)?.offsets();

        let sequential: u64 = bgen.variant_reader().map(|v| u64::from(v.position)).sum();
        let (count, total) = decode_offsets(
            || Ok(bgen.clone()),
            &offsets,
            4,
            |v| u64::from(v.position),
            (0usize, 0u64),
            |acc, position| {
                acc.0 += 1;
                acc.1 += position;
            },
        )?;
        assert_eq!(count, 97);
        assert_eq!(total, sequential);
        Ok(())
    }

    #[test]
    fn first_error_is_returned_with_its_ordinal() -> Result<()> {
        let bgen = many_variants(10)?;
        let mut offsets = ScanIndex::build(&bgen)?.offsets();
        let past_end = bgen.source().len() + 100;
        offsets.insert(3, past_end);

        let result = decode_offsets(
            || Ok(bgen.clone()),
            &offsets,
            3,
            |v| v.id,
            0,
            |n, _| *n += 1,
        );
        match result {
            Err(BgenError::InVariant {
                ordinal, offset, ..
            }) => {
                assert_eq!(ordinal, 3);
                assert_eq!(offset, past_end);
            }
            other => panic!("expected a wrapped error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn open_failures_surface() {
        let result = decode_offsets(
            || Err(BgenError::NoSampleIdentifiers),
            &[1, 2, 3],
            2,
            |v| v.position,
            (),
            |_, _| {},
        );
        assert!(matches!(result, Err(BgenError::NoSampleIdentifiers)));
    }

    #[test]
    fn empty_offset_list_returns_the_initial_value() -> Result<()> {
        let bgen = many_variants(1)?;
        let total = decode_offsets(
            || Ok(bgen.clone()),
            &[],
            8,
            |v| v.position,
            7u32,
            |a, p| *a += p,
        )?;
        assert_eq!(total, 7);
        assert!(default_workers() >= 1);
        Ok(())
    }
}
