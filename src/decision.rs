use crate::cortex::CortexGraph;
use crate::kmer::{partition, reverse_complement};
use crate::kmer_set::KmerSet;
use crate::pair::ReadPair;

/// Decides whether a complete pair is kept, against a positive set, a
/// negative index and a uniqueness set. Pure: identical inputs give
/// identical answers and no state is mutated.
pub struct PairDecider {
    pub k: usize,
    pub positive: Option<KmerSet>,
    pub negative: Option<CortexGraph>,
    pub unique: Option<KmerSet>,
    pub positive_threshold: f64,
    pub negative_threshold: f64,
    pub positive_unique: bool,
    pub positive_unique_threshold: u32,
    pub positive_unique_symmetric: bool,
    pub negative_preserve_unique: bool,
    pub negative_preserve_unique_threshold: u32,
}

impl PairDecider {
    pub fn decide(&self, pair: &ReadPair) -> bool {
        let (read_1, read_2) = pair.records();
        let k = self.k;
        let total =
            (partition(&read_1.seq, k).count() + partition(&read_2.seq, k).count()) as f64;

        let mut pass_positive = true;
        if let Some(positive) = &self.positive {
            let forward_ok =
                set_hits(&read_1.seq, k, positive, false) + set_hits(&read_2.seq, k, positive, false);
            let reverse_ok =
                set_hits(&read_1.seq, k, positive, true) + set_hits(&read_2.seq, k, positive, true);

            let forward_fraction = if total == 0.0 { 0.0 } else { forward_ok as f64 / total };
            let reverse_fraction = if total == 0.0 { 0.0 } else { reverse_ok as f64 / total };

            pass_positive = forward_fraction >= self.positive_threshold
                || reverse_fraction >= self.positive_threshold;

            if self.positive_unique {
                let unique = self.unique.as_ref().expect("uniqueness set is loaded");
                let forward_unique =
                    set_hits(&read_1.seq, k, unique, false) + set_hits(&read_2.seq, k, unique, false);
                let reverse_unique =
                    set_hits(&read_1.seq, k, unique, true) + set_hits(&read_2.seq, k, unique, true);

                // The reverse count is held against the fractional positive
                // threshold, not the integer one; --positive-unique-symmetric
                // restores the symmetric rule.
                let reverse_rescue = if self.positive_unique_symmetric {
                    reverse_unique >= self.positive_unique_threshold as u64
                } else {
                    reverse_unique as f64 >= self.positive_threshold
                };
                pass_positive = pass_positive
                    || forward_unique >= self.positive_unique_threshold as u64
                    || reverse_rescue;
            }
        }

        if !pass_positive {
            return false;
        }

        if let Some(negative) = &self.negative {
            let not_ok = graph_hits(&read_1.seq, k, negative) + graph_hits(&read_2.seq, k, negative);
            let negativity = if total == 0.0 { 1.0 } else { not_ok as f64 / total };

            let mut pass_negative = negativity <= self.negative_threshold;

            if self.negative_preserve_unique {
                let unique = self.unique.as_ref().expect("uniqueness set is loaded");
                let forward_unique =
                    set_hits(&read_1.seq, k, unique, false) + set_hits(&read_2.seq, k, unique, false);
                let reverse_unique =
                    set_hits(&read_1.seq, k, unique, true) + set_hits(&read_2.seq, k, unique, true);
                let threshold = self.negative_preserve_unique_threshold as u64;
                pass_negative =
                    pass_negative || forward_unique >= threshold || reverse_unique >= threshold;
            }

            return pass_negative;
        }

        true
    }
}

fn set_hits(seq: &[u8], k: usize, set: &KmerSet, reverse: bool) -> u64 {
    partition(seq, k)
        .filter(|kmer| {
            if reverse {
                set.contains(&reverse_complement(kmer))
            } else {
                set.contains(kmer)
            }
        })
        .count() as u64
}

// The index checks both orientations itself, so one pass suffices.
fn graph_hits(seq: &[u8], k: usize, graph: &CortexGraph) -> u64 {
    partition(seq, k).filter(|kmer| graph.contains(kmer)).count() as u64
}
