use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::kmer::{reverse_complement, reverse_qualities};
use crate::pair::{ReadPair, ReadRecord};

/// Strips a trailing /1 or /2 mate suffix from a read id.
pub fn pair_key(id: &str) -> &str {
    id.strip_suffix("/1")
        .or_else(|| id.strip_suffix("/2"))
        .unwrap_or(id)
}

/// Lockstep reader over two four-line-per-record text files. Mate-2 records
/// are brought into the common orientation on ingest.
pub struct PairedFastqReader {
    reader_1: BufReader<File>,
    reader_2: BufReader<File>,
    path_1: PathBuf,
    path_2: PathBuf,
    record: u64,
}

impl PairedFastqReader {
    /// Opens `<base>_1` and `<base>_2`; both must be readable.
    pub fn open(base: &str) -> Result<Self> {
        let path_1 = PathBuf::from(format!("{}_1", base));
        let path_2 = PathBuf::from(format!("{}_2", base));
        let reader_1 = BufReader::new(
            File::open(&path_1)
                .with_context(|| format!("expected file {} can't be opened", path_1.display()))?,
        );
        let reader_2 = BufReader::new(
            File::open(&path_2)
                .with_context(|| format!("expected file {} can't be opened", path_2.display()))?,
        );
        Ok(PairedFastqReader {
            reader_1,
            reader_2,
            path_1,
            path_2,
            record: 0,
        })
    }

    /// Next pair of records, or None at end of input. When exactly one
    /// stream ends early a warning is printed and the input is treated as
    /// ended.
    pub fn next_pair(&mut self) -> Result<Option<(ReadRecord, ReadRecord)>> {
        self.record += 1;
        let record_1 = read_record(&mut self.reader_1, &self.path_1, self.record)?;
        let record_2 = read_record(&mut self.reader_2, &self.path_2, self.record)?;

        let (record_1, record_2) = match (record_1, record_2) {
            (Some(first), Some(second)) => (first, second),
            (None, None) => return Ok(None),
            (Some(_), None) => {
                eprintln!(
                    "Warning: {} ended before {} (record {}); stopping here",
                    self.path_2.display(),
                    self.path_1.display(),
                    self.record
                );
                return Ok(None);
            }
            (None, Some(_)) => {
                eprintln!(
                    "Warning: {} ended before {} (record {}); stopping here",
                    self.path_1.display(),
                    self.path_2.display(),
                    self.record
                );
                return Ok(None);
            }
        };

        check_mate_ids(&record_1.id, &record_2.id);

        // mate-2 is stored reverse-complemented relative to mate-1
        let record_2 = ReadRecord {
            id: record_2.id,
            seq: reverse_complement(&record_2.seq),
            qual: reverse_qualities(&record_2.qual),
        };

        Ok(Some((record_1, record_2)))
    }
}

fn check_mate_ids(id_1: &str, id_2: &str) {
    let has_suffix = |id: &str| id.ends_with("/1") || id.ends_with("/2");
    if !has_suffix(id_1) || !has_suffix(id_2) {
        eprintln!("Warning: read ids lack a mate suffix! {} vs {}", id_1, id_2);
    }
    assert!(
        has_suffix(id_1),
        "read id {} carries no /1 or /2 mate suffix",
        id_1
    );
    assert!(
        has_suffix(id_2),
        "read id {} carries no /1 or /2 mate suffix",
        id_2
    );
    if pair_key(id_1) != pair_key(id_2) {
        eprintln!("Warning: read ids don't match! {} vs {}", id_1, id_2);
    }
    assert_eq!(pair_key(id_1), pair_key(id_2), "paired read ids disagree");
}

fn read_record(
    reader: &mut BufReader<File>,
    path: &Path,
    record: u64,
) -> Result<Option<ReadRecord>> {
    let mut lines = Vec::with_capacity(4);
    for _ in 0..4 {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if n == 0 {
            break;
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        lines.push(line);
    }

    if lines.is_empty() || (lines.len() == 1 && lines[0].is_empty()) {
        return Ok(None);
    }
    if lines.len() != 4 {
        bail!(
            "{}: record {} is truncated ({} of 4 lines)",
            path.display(),
            record,
            lines.len()
        );
    }

    let qual = lines.pop().unwrap().into_bytes();
    let separator = lines.pop().unwrap();
    let seq = lines.pop().unwrap().into_bytes();
    let header = lines.pop().unwrap();

    let id = match header.strip_prefix('@') {
        Some(id) => id.to_string(),
        None => bail!(
            "{}: record {} does not start with '@'",
            path.display(),
            record
        ),
    };
    if separator != "+" {
        bail!(
            "{}: record {}: third line is '{}', expected '+'",
            path.display(),
            record,
            separator
        );
    }
    if seq.len() != qual.len() {
        bail!(
            "{}: record {}: sequence and quality lengths differ ({} vs {})",
            path.display(),
            record,
            seq.len(),
            qual.len()
        );
    }

    Ok(Some(ReadRecord { id, seq, qual }))
}

/// Writes kept pairs as two four-line-per-record text files, restoring
/// mate-2 to its on-disk orientation. Records are written in whole units.
pub struct PairedFastqWriter {
    writer_1: BufWriter<File>,
    writer_2: BufWriter<File>,
}

impl PairedFastqWriter {
    /// Creates `<base>_1` and `<base>_2`.
    pub fn create(base: &str) -> Result<Self> {
        let path_1 = format!("{}_1", base);
        let path_2 = format!("{}_2", base);
        let writer_1 = BufWriter::new(
            File::create(&path_1).with_context(|| format!("cannot open file {}", path_1))?,
        );
        let writer_2 = BufWriter::new(
            File::create(&path_2).with_context(|| format!("cannot open file {}", path_2))?,
        );
        Ok(PairedFastqWriter { writer_1, writer_2 })
    }

    pub fn write_pair(&mut self, pair: &ReadPair) -> Result<()> {
        let (read_1, read_2) = pair.records();

        write_record(&mut self.writer_1, &read_1.id, &read_1.seq, &read_1.qual)?;

        let seq_2 = reverse_complement(&read_2.seq);
        let qual_2 = reverse_qualities(&read_2.qual);
        write_record(&mut self.writer_2, &read_2.id, &seq_2, &qual_2)?;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer_1.flush()?;
        self.writer_2.flush()?;
        Ok(())
    }
}

fn write_record<W: Write>(writer: &mut W, id: &str, seq: &[u8], qual: &[u8]) -> Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(id.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}
