pub mod bam;
pub mod cortex;
pub mod decision;
pub mod fastq;
pub mod filter;
pub mod kmer;
pub mod kmer_set;
pub mod pair;
