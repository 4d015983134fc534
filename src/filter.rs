use anyhow::{bail, Result};
use clap::Parser;
use std::time::Instant;

use crate::bam;
use crate::cortex::{CortexGraph, GRAPH_K};
use crate::decision::PairDecider;
use crate::fastq::{PairedFastqReader, PairedFastqWriter};
use crate::kmer_set::KmerSet;
use crate::pair::{Mate, ReadPair};

/// Configuration for one filtering run.
#[derive(Parser, Debug)]
#[command(version, about = "Filters paired reads by k-mer content", long_about = None)]
pub struct Args {
    /// Text file of positive-filter k-mers, one per line
    #[arg(long)]
    pub positive_filter: Option<String>,

    /// Binary de Bruijn k-mer index used as the negative filter
    #[arg(long)]
    pub negative_filter: Option<String>,

    /// Indexed alignment container to read pairs from
    #[arg(long)]
    pub input_bam: Option<String>,

    /// Base path of paired text input (<base>_1 and <base>_2)
    #[arg(long)]
    pub input_fastq: Option<String>,

    /// Base path of paired text output (<out>_1 and <out>_2)
    #[arg(long)]
    pub output_fastq: String,

    /// K-mer size
    #[arg(long, default_value_t = GRAPH_K)]
    pub k: usize,

    /// Minimum positive k-mer fraction for a pair to pass
    #[arg(long, default_value_t = 0.0)]
    pub positive_threshold: f64,

    /// Maximum negative k-mer fraction for a pair to pass
    #[arg(long, default_value_t = 1.0)]
    pub negative_threshold: f64,

    /// Also pass pairs with enough unique k-mer hits
    #[arg(long)]
    pub positive_unique: bool,

    /// Preserve negatively-filtered pairs with enough unique k-mer hits
    #[arg(long)]
    pub negative_preserve_unique: bool,

    #[arg(long, default_value_t = 10)]
    pub positive_unique_threshold: u32,

    #[arg(long, default_value_t = 10)]
    pub negative_preserve_unique_threshold: u32,

    /// Compare the reverse unique count against the integer threshold
    /// instead of the fractional positive threshold
    #[arg(long)]
    pub positive_unique_symmetric: bool,

    /// Text file the uniqueness set is built from
    #[arg(long)]
    pub uniqueness_base: Option<String>,

    /// Binary index whose k-mers are removed from the uniqueness set
    #[arg(long)]
    pub uniqueness_subtract: Option<String>,

    /// Worker threads for aligned-container input
    #[arg(long, default_value_t = 10)]
    pub threads: usize,
}

pub fn run(args: Args) -> Result<()> {
    let start_time = Instant::now();

    if args.positive_filter.is_none() && args.negative_filter.is_none() {
        bail!("please specify either a positive filter or a negative filter");
    }
    match (&args.input_bam, &args.input_fastq) {
        (None, None) => bail!("please specify either --input-bam or --input-fastq"),
        (Some(_), Some(_)) => {
            bail!("both --input-bam and --input-fastq set - can't deal with that")
        }
        _ => {}
    }
    if args.k == 0 {
        bail!("k-mer size must be positive");
    }
    if !(0.0..=1.0).contains(&args.positive_threshold) {
        bail!("positive threshold must lie within [0, 1]");
    }
    if !(0.0..=1.0).contains(&args.negative_threshold) {
        bail!("negative threshold must lie within [0, 1]");
    }

    let use_unique = args.positive_unique || args.negative_preserve_unique;
    if use_unique {
        if args.uniqueness_base.is_none() {
            bail!("unique filtering needs --uniqueness-base <file>");
        }
        if args.uniqueness_subtract.is_none() {
            bail!("unique filtering needs --uniqueness-subtract <file>");
        }
    }
    if args.negative_filter.is_some() && args.k != GRAPH_K {
        bail!("binary k-mer indexes are built at k = {}", GRAPH_K);
    }

    println!("kmersieve filter run");
    println!(
        "\tpositive filter: {}",
        args.positive_filter.as_deref().unwrap_or("-")
    );
    println!(
        "\tnegative filter: {}",
        args.negative_filter.as_deref().unwrap_or("-")
    );
    match (&args.input_bam, &args.input_fastq) {
        (Some(path), _) => println!("\tinput alignments: {}", path),
        (_, Some(base)) => println!("\tinput reads: {}_1 / {}_2", base, base),
        _ => unreachable!(),
    }
    println!("\toutput reads: {}_1 / {}_2", args.output_fastq, args.output_fastq);
    println!(
        "\tpositive unique: {} / negative preserve unique: {}",
        args.positive_unique, args.negative_preserve_unique
    );
    if use_unique {
        println!(
            "\tuniqueness base: {} / subtract: {}",
            args.uniqueness_base.as_deref().unwrap_or("-"),
            args.uniqueness_subtract.as_deref().unwrap_or("-")
        );
    }

    let k = args.k;

    let positive = match &args.positive_filter {
        Some(path) => {
            println!("Loading positive k-mers from {}", path);
            let set = KmerSet::from_file(path, k)?;
            println!("\t{} k-mers", set.len());
            Some(set)
        }
        None => None,
    };

    let unique = if use_unique {
        let base = args.uniqueness_base.as_deref().expect("checked above");
        let subtract = args.uniqueness_subtract.as_deref().expect("checked above");
        println!("Loading uniqueness k-mers from {}", base);
        let mut set = KmerSet::from_file(base, k)?;
        println!("Loading subtract index from {}", subtract);
        let graph = CortexGraph::load(subtract, k)?;
        let before = set.len();
        set.subtract(&graph);
        println!("\t{} of {} k-mers kept after subtraction", set.len(), before);
        Some(set)
    } else {
        None
    };

    let negative = match &args.negative_filter {
        Some(path) => {
            println!("Loading negative k-mer index from {}", path);
            let graph = CortexGraph::load(path, k)?;
            println!(
                "\t{} k-mers, total coverage {}",
                graph.len(),
                graph.total_coverage()
            );
            Some(graph)
        }
        None => None,
    };

    println!(
        "Indexing time:\t{:.3} seconds\n",
        start_time.elapsed().as_secs_f32()
    );

    let decider = PairDecider {
        k,
        positive,
        negative,
        unique,
        positive_threshold: args.positive_threshold,
        negative_threshold: args.negative_threshold,
        positive_unique: args.positive_unique,
        positive_unique_threshold: args.positive_unique_threshold,
        positive_unique_symmetric: args.positive_unique_symmetric,
        negative_preserve_unique: args.negative_preserve_unique,
        negative_preserve_unique_threshold: args.negative_preserve_unique_threshold,
    };

    let writer = PairedFastqWriter::create(&args.output_fastq)?;

    let (pairs_seen, pairs_kept) = if let Some(bam_path) = &args.input_bam {
        let threads = args.threads.min(num_cpus::get()).max(1);
        println!("Filtering alignments with {} threads", threads);
        bam::run(bam_path, threads, &decider, writer)?
    } else {
        let base = args.input_fastq.as_deref().expect("checked above");
        println!("Filtering read pairs from {}_1 / {}_2", base, base);
        run_fastq(base, &decider, writer)?
    };

    let elapsed = start_time.elapsed().as_secs_f32();
    let kept_percent = if pairs_seen == 0 {
        0.0
    } else {
        pairs_kept as f32 / pairs_seen as f32 * 100.0
    };
    println!("\nPairs:\t\t{}", pairs_seen);
    println!("Kept:\t\t{} ({:.2}%)", pairs_kept, kept_percent);
    println!("Time:\t\t{:.3} seconds", elapsed);

    Ok(())
}

/// Sequential text-paired mode: the two streams advance in lockstep and
/// every record index is one pair. Returns (pairs seen, pairs kept).
pub fn run_fastq(
    base: &str,
    decider: &PairDecider,
    mut writer: PairedFastqWriter,
) -> Result<(u64, u64)> {
    let mut reader = PairedFastqReader::open(base)?;
    let mut pairs_seen = 0u64;
    let mut pairs_kept = 0u64;

    while let Some((record_1, record_2)) = reader.next_pair()? {
        let mut pair = ReadPair::default();
        let placed = pair.take_read(record_1, Mate::One).is_ok()
            && pair.take_read(record_2, Mate::Two).is_ok();
        assert!(
            placed && pair.is_complete(),
            "text records at the same index must form one pair"
        );

        pairs_seen += 1;
        if decider.decide(&pair) {
            pairs_kept += 1;
            writer.write_pair(&pair)?;
        }
    }

    writer.flush()?;
    Ok((pairs_seen, pairs_kept))
}
