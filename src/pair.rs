use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::fmt;

/// One sequenced read, held in the common (mate-1) orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mate {
    One,
    Two,
}

impl fmt::Display for Mate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mate::One => write!(f, "1"),
            Mate::Two => write!(f, "2"),
        }
    }
}

/// Both mates of one fragment; the slots fill independently as records
/// arrive. A filled slot is never overwritten.
#[derive(Clone, Debug, Default)]
pub struct ReadPair {
    pub mate1: Option<ReadRecord>,
    pub mate2: Option<ReadRecord>,
}

impl ReadPair {
    /// Places a record in its mate slot. An identical re-delivery (same id)
    /// is accepted; a slot already holding a different record rejects the
    /// incoming one.
    pub fn take_read(&mut self, read: ReadRecord, mate: Mate) -> Result<(), ReadRecord> {
        let slot = match mate {
            Mate::One => &mut self.mate1,
            Mate::Two => &mut self.mate2,
        };
        match slot {
            None => {
                *slot = Some(read);
                Ok(())
            }
            Some(existing) if existing.id == read.id => Ok(()),
            Some(_) => Err(read),
        }
    }

    /// Moves the filled slots of another (half) pair into this one.
    pub fn absorb(&mut self, other: ReadPair) -> Result<(), ReadRecord> {
        if let Some(read) = other.mate1 {
            self.take_read(read, Mate::One)?;
        }
        if let Some(read) = other.mate2 {
            self.take_read(read, Mate::Two)?;
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.mate1.is_some() && self.mate2.is_some()
    }

    /// Both records of a complete pair.
    pub fn records(&self) -> (&ReadRecord, &ReadRecord) {
        (
            self.mate1.as_ref().expect("pair is complete"),
            self.mate2.as_ref().expect("pair is complete"),
        )
    }
}

/// Pair-assembly state for one scope: worker-local during region processing,
/// or the single global table for cross-region leftovers.
#[derive(Default)]
pub struct PairTable {
    pairs: FxHashMap<String, ReadPair>,
}

impl PairTable {
    /// Feeds one record into the table. When the record completes its pair,
    /// the pair is removed and returned. Refilling a slot with a different
    /// read reports both held ids and aborts.
    pub fn take(&mut self, key: String, mate: Mate, read: ReadRecord) -> Option<ReadPair> {
        match self.pairs.entry(key) {
            Entry::Vacant(slot) => {
                let mut pair = ReadPair::default();
                let _ = pair.take_read(read, mate);
                slot.insert(pair);
                None
            }
            Entry::Occupied(mut slot) => {
                if let Err(rejected) = slot.get_mut().take_read(read, mate) {
                    let pair = slot.get();
                    eprintln!("There is a problem with the read ids for pair {}.", slot.key());
                    eprintln!("\tincoming mate {}: {}", mate, rejected.id);
                    eprintln!("\tslot 1: {}", held_id(&pair.mate1));
                    eprintln!("\tslot 2: {}", held_id(&pair.mate2));
                    panic!(
                        "mate slot for {} already filled with a different read",
                        slot.key()
                    );
                }
                if slot.get().is_complete() {
                    Some(slot.remove())
                } else {
                    None
                }
            }
        }
    }

    /// Re-runs the pairing state machine over another scope's leftover half
    /// pairs. Pairs completed by the merge are removed and returned; the
    /// rest stay in this table.
    pub fn merge_leftovers(&mut self, leftovers: PairTable) -> Vec<ReadPair> {
        let mut completed = Vec::new();
        for (key, half) in leftovers.pairs {
            match self.pairs.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(half);
                }
                Entry::Occupied(mut slot) => {
                    if let Err(rejected) = slot.get_mut().absorb(half) {
                        let pair = slot.get();
                        eprintln!(
                            "There is a problem with the read ids for pair {} (cross-region).",
                            slot.key()
                        );
                        eprintln!("\trejected: {}", rejected.id);
                        eprintln!("\tslot 1: {}", held_id(&pair.mate1));
                        eprintln!("\tslot 2: {}", held_id(&pair.mate2));
                        panic!(
                            "mate slot for {} already filled with a different read",
                            slot.key()
                        );
                    }
                    if slot.get().is_complete() {
                        completed.push(slot.remove());
                    }
                }
            }
        }
        completed
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn held_id(slot: &Option<ReadRecord>) -> &str {
    slot.as_ref().map_or("-", |read| read.id.as_str())
}
