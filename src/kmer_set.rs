use ahash::AHashSet;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::cortex::CortexGraph;

/// Exact-membership set of fixed-length k-mers, loaded from a text file of
/// one k-mer per line. Duplicates collapse; blank lines are skipped.
#[derive(Debug)]
pub struct KmerSet {
    k: usize,
    kmers: AHashSet<Vec<u8>>,
}

impl KmerSet {
    pub fn from_file<P: AsRef<Path>>(path: P, k: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open k-mer file {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut kmers = AHashSet::new();
        for (idx, line) in reader.lines().enumerate() {
            let line =
                line.with_context(|| format!("cannot read {}", path.display()))?;
            let kmer = line.trim_end_matches('\r');
            if kmer.is_empty() {
                continue;
            }
            if kmer.len() != k {
                bail!(
                    "expect k-mers of length {}, but {} contains one of length {} (line {})",
                    k,
                    path.display(),
                    kmer.len(),
                    idx + 1
                );
            }
            kmers.insert(kmer.as_bytes().to_vec());
        }

        Ok(KmerSet { k, kmers })
    }

    pub fn from_kmers<I>(kmers: I, k: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut set = AHashSet::new();
        for kmer in kmers {
            if kmer.len() != k {
                bail!("expect k-mers of length {}, got one of length {}", k, kmer.len());
            }
            set.insert(kmer);
        }
        Ok(KmerSet { k, kmers: set })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }

    pub fn contains(&self, kmer: &[u8]) -> bool {
        self.kmers.contains(kmer)
    }

    /// Removes every member that is also present in the subtract index,
    /// leaving a set disjoint from it.
    pub fn subtract(&mut self, graph: &CortexGraph) {
        self.kmers.retain(|kmer| !graph.contains(kmer));
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.kmers.iter().map(|kmer| kmer.as_slice())
    }
}
