use anyhow::{Context, Result};
use rayon::prelude::*;
use rust_htslib::bam::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::decision::PairDecider;
use crate::fastq::PairedFastqWriter;
use crate::kmer::reverse_complement;
use crate::pair::{Mate, PairTable, ReadPair, ReadRecord};

const ALIGNMENTS_AT_ONCE: usize = 10_000;
const PRINT_AT_ONCE: usize = 1_000;

/// One contiguous stretch of a reference sequence, both ends inclusive.
pub struct Region {
    pub name: String,
    pub tid: u32,
    pub first: i64,
    pub last: i64,
}

/// Everything the workers serialize on: the two output streams and the
/// table for pairs whose mates fell into different regions.
struct SharedSink {
    writer: PairedFastqWriter,
    global: PairTable,
}

/// One region per reference sequence of the indexed container.
pub fn enumerate_regions(path: &str) -> Result<Vec<Region>> {
    let reader = bam::IndexedReader::from_path(path)
        .with_context(|| format!("{} does not seem to be indexed - please provide an indexed alignment file", path))?;
    let header = reader.header().clone();

    let mut regions = Vec::new();
    for tid in 0..header.target_count() {
        let name = String::from_utf8_lossy(header.tid2name(tid)).into_owned();
        let length = header
            .target_len(tid)
            .with_context(|| format!("{}: no length for reference {}", path, name))?
            as i64;
        regions.push(Region {
            name,
            tid,
            first: 0,
            last: length - 1,
        });
    }
    Ok(regions)
}

/// Region-parallel mode: workers claim regions under a dynamic schedule,
/// assemble pairs locally, and spill region leftovers into the global table.
/// Returns (pairs seen, pairs kept).
pub fn run(
    path: &str,
    threads: usize,
    decider: &PairDecider,
    writer: PairedFastqWriter,
) -> Result<(u64, u64)> {
    let regions = enumerate_regions(path)?;
    println!("Filtering {} regions from {}", regions.len(), path);

    let shared = Mutex::new(SharedSink {
        writer,
        global: PairTable::default(),
    });
    let pairs_seen = AtomicU64::new(0);
    let pairs_kept = AtomicU64::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("could not build worker pool with the requested thread count")?;

    pool.install(|| {
        regions.par_iter().try_for_each(|region| {
            process_region(path, region, decider, &shared, &pairs_seen, &pairs_kept)
        })
    })?;

    let mut shared = shared.into_inner().expect("sink lock poisoned");
    if !shared.global.is_empty() {
        eprintln!(
            "Warning: {} dangling reads left after processing {}",
            shared.global.len(),
            path
        );
    }
    shared.writer.flush()?;

    Ok((
        pairs_seen.load(Ordering::Relaxed),
        pairs_kept.load(Ordering::Relaxed),
    ))
}

fn process_region(
    path: &str,
    region: &Region,
    decider: &PairDecider,
    shared: &Mutex<SharedSink>,
    pairs_seen: &AtomicU64,
    pairs_kept: &AtomicU64,
) -> Result<()> {
    // every worker opens its own reader; records never cross threads
    let mut reader = bam::IndexedReader::from_path(path)
        .with_context(|| format!("{} does not seem to be indexed - please provide an indexed alignment file", path))?;
    reader
        .fetch((region.tid as i32, region.first, region.last + 1))
        .with_context(|| {
            format!(
                "cannot seek to {}:{}-{}",
                region.name, region.first, region.last
            )
        })?;

    println!(
        "\tread {} from {} to {}",
        region.name,
        region.first,
        region.last + 1
    );

    let mut local = PairTable::default();
    let mut print_buffer: Vec<ReadPair> = Vec::new();
    let mut batch: Vec<(String, Mate, ReadRecord)> = Vec::with_capacity(ALIGNMENTS_AT_ONCE);
    let mut record = bam::Record::new();

    let mut finished = false;
    while !finished {
        while batch.len() < ALIGNMENTS_AT_ONCE {
            match reader.read(&mut record) {
                Some(Ok(())) => batch.push(ingest_alignment(&record)),
                Some(Err(e)) => {
                    return Err(e)
                        .with_context(|| format!("error reading {} from {}", region.name, path))
                }
                None => {
                    finished = true;
                    break;
                }
            }
        }

        for (key, mate, read) in batch.drain(..) {
            if let Some(pair) = local.take(key, mate, read) {
                pairs_seen.fetch_add(1, Ordering::Relaxed);
                if decider.decide(&pair) {
                    pairs_kept.fetch_add(1, Ordering::Relaxed);
                    print_buffer.push(pair);
                    if print_buffer.len() > PRINT_AT_ONCE {
                        flush_pairs(&mut print_buffer, shared)?;
                    }
                }
            }
        }
    }

    flush_pairs(&mut print_buffer, shared)?;

    // region done: spill half pairs into the global table, delivering any
    // pairs the merge completes
    let mut shared = shared.lock().expect("sink lock poisoned");
    let SharedSink { writer, global } = &mut *shared;
    for pair in global.merge_leftovers(local) {
        pairs_seen.fetch_add(1, Ordering::Relaxed);
        if decider.decide(&pair) {
            pairs_kept.fetch_add(1, Ordering::Relaxed);
            writer.write_pair(&pair)?;
        }
    }

    Ok(())
}

fn flush_pairs(print_buffer: &mut Vec<ReadPair>, shared: &Mutex<SharedSink>) -> Result<()> {
    if print_buffer.is_empty() {
        return Ok(());
    }
    let mut shared = shared.lock().expect("sink lock poisoned");
    for pair in print_buffer.drain(..) {
        shared.writer.write_pair(&pair)?;
    }
    Ok(())
}

/// Rebuilds the original read from one alignment: reverse-strand records
/// are flipped back, and qualities become printable phred+33.
fn ingest_alignment(record: &bam::Record) -> (String, Mate, ReadRecord) {
    let name = String::from_utf8_lossy(record.qname()).into_owned();
    assert!(
        record.is_paired(),
        "unpaired alignment {} cannot be pair-filtered",
        name
    );
    let mate = if record.is_first_in_template() {
        Mate::One
    } else {
        Mate::Two
    };

    let mut seq = record.seq().as_bytes();
    let mut qual: Vec<u8> = record.qual().iter().map(|q| q + 33).collect();
    if record.is_reverse() {
        seq = reverse_complement(&seq);
        qual.reverse();
    }

    let id = format!("{}/{}", name, mate);
    (name, mate, ReadRecord { id, seq, qual })
}
