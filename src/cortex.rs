use anyhow::{bail, Context, Result};
use rustc_hash::FxHasher;
use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, Read};
use std::path::Path;

/// k-mer size every binary index consumed by this tool is built at.
pub const GRAPH_K: usize = 25;

const MAX_PROBE_ATTEMPTS: u64 = 64;

/// Membership index over the k-mers of a multi-colour de Bruijn graph,
/// loaded from its binary representation.
///
/// The table is open-addressed: 2^height buckets of `width` slots each. A
/// key probes bucket H(key, attempt) for attempt = 0, 1, ... scanning the
/// bucket's slots in order; a full bucket advances the attempt. Queries are
/// read-only after load.
#[derive(Debug)]
pub struct CortexGraph {
    k: usize,
    colours: usize,
    buckets: u64,
    width: u32,
    keys: Vec<u64>,
    used: Vec<bool>,
    entries: u64,
    total_coverage: u64,
}

impl CortexGraph {
    pub fn load<P: AsRef<Path>>(path: P, k: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open binary k-mer index {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let kmer_size = read_u32(&mut reader, path, "kmer size")?;
        let colours = read_u32(&mut reader, path, "colour count")?;
        let height = read_u32(&mut reader, path, "table height")?;
        let width = read_u32(&mut reader, path, "table width")?;

        if kmer_size as usize != k {
            bail!(
                "{}: index built for k = {}, expected k = {}",
                path.display(),
                kmer_size,
                k
            );
        }
        if k > 32 {
            bail!("{}: packed keys wider than one word are not supported", path.display());
        }
        if colours == 0 || width == 0 || height == 0 || height > 40 {
            bail!(
                "{}: implausible table geometry ({} colours, height {}, width {})",
                path.display(),
                colours,
                height,
                width
            );
        }

        let buckets = 1u64 << height;
        let capacity = (buckets * width as u64) as usize;
        let mut graph = CortexGraph {
            k,
            colours: colours as usize,
            buckets,
            width,
            keys: vec![0; capacity],
            used: vec![false; capacity],
            entries: 0,
            total_coverage: 0,
        };

        // One packed key word (k <= 32), then per-colour coverage counters,
        // edge bitfields and status bytes. Entries run to end of file.
        let colours = colours as usize;
        let mut entry = vec![0u8; 8 + colours * 6];
        loop {
            let first = reader
                .read(&mut entry[..1])
                .with_context(|| format!("cannot read {}", path.display()))?;
            if first == 0 {
                break;
            }
            reader.read_exact(&mut entry[1..]).with_context(|| {
                format!(
                    "{}: truncated entry after {} k-mers",
                    path.display(),
                    graph.entries
                )
            })?;

            let key = u64::from_le_bytes(entry[..8].try_into().unwrap());
            let mut coverage = 0u64;
            for colour in 0..colours {
                let at = 8 + colour * 4;
                coverage += u32::from_le_bytes(entry[at..at + 4].try_into().unwrap()) as u64;
            }

            graph.insert(key).with_context(|| {
                format!("{}: hash table too small for its entries", path.display())
            })?;
            graph.entries += 1;
            graph.total_coverage += coverage;
        }

        Ok(graph)
    }

    /// True when the k-mer, in either orientation, is present in the graph.
    pub fn contains(&self, kmer: &[u8]) -> bool {
        if kmer.len() != self.k {
            return false;
        }
        match pack_kmer(kmer) {
            Some(key) => {
                self.lookup(key) || self.lookup(packed_reverse_complement(key, self.k))
            }
            None => false,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn colours(&self) -> usize {
        self.colours
    }

    pub fn len(&self) -> u64 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Sum of the per-colour coverage counters over all entries.
    pub fn total_coverage(&self) -> u64 {
        self.total_coverage
    }

    fn insert(&mut self, key: u64) -> Result<()> {
        for attempt in 0..MAX_PROBE_ATTEMPTS {
            let bucket = probe_hash(key, attempt) % self.buckets;
            let start = (bucket * self.width as u64) as usize;
            for slot in start..start + self.width as usize {
                if !self.used[slot] {
                    self.keys[slot] = key;
                    self.used[slot] = true;
                    return Ok(());
                }
                if self.keys[slot] == key {
                    return Ok(());
                }
            }
        }
        bail!("no free slot within {} probe attempts", MAX_PROBE_ATTEMPTS)
    }

    fn lookup(&self, key: u64) -> bool {
        for attempt in 0..MAX_PROBE_ATTEMPTS {
            let bucket = probe_hash(key, attempt) % self.buckets;
            let start = (bucket * self.width as u64) as usize;
            for slot in start..start + self.width as usize {
                if !self.used[slot] {
                    return false;
                }
                if self.keys[slot] == key {
                    return true;
                }
            }
        }
        false
    }
}

/// Packs an exact-k sequence into 2 bits per base, first base in the most
/// significant position. None when a base outside ACGT is present.
pub fn pack_kmer(kmer: &[u8]) -> Option<u64> {
    let mut packed = 0u64;
    for &base in kmer {
        let bits = match base {
            b'A' | b'a' => 0b00,
            b'C' | b'c' => 0b01,
            b'G' | b'g' => 0b10,
            b'T' | b't' => 0b11,
            _ => return None,
        };
        packed = (packed << 2) | bits;
    }
    Some(packed)
}

fn packed_reverse_complement(kmer: u64, k: usize) -> u64 {
    let mut rc = 0u64;
    for i in 0..k {
        let base = (kmer >> (i * 2)) & 0b11;
        rc |= (base ^ 0b11) << ((k - 1 - i) * 2);
    }
    rc
}

fn probe_hash(key: u64, attempt: u64) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(attempt);
    hasher.write_u64(key);
    hasher.finish()
}

fn read_u32(reader: &mut BufReader<File>, path: &Path, label: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .with_context(|| format!("{}: cannot read {}", path.display(), label))?;
    Ok(u32::from_le_bytes(buf))
}
