//! conserved_motifs library
//!
//! Discovery of DNA motifs that are conserved across the species of
//! orthologous gene families. Each family's genes are indexed in a generalized
//! suffix tree whose nodes record the species below them; motifs over an IUPAC
//! alphabet are enumerated through that tree and scored by the branch length
//! of the species tree they span.

pub mod aggregate;
pub mod config;
pub mod corpus;
pub mod enumerate;
pub mod error;
pub mod iupac;
pub mod motif;
pub mod output;
pub mod phylo;
pub mod pipeline;
pub mod suffix_tree;

pub use aggregate::CompactMotifAggregator;
pub use config::{DiscoveryConfig, MatchingMode};
pub use corpus::{
    GeneCorpus, GeneFamily, GeneRecord, InMemoryCorpus, RecordReader, Strand, TextCorpus,
};
pub use enumerate::{EnumerationStats, MotifEnumerator};
pub use error::{MotifError, Result};
pub use iupac::{Alphabet, IupacSymbol};
pub use output::{MotifSink, MotifWriter, OutputFormat};
pub use phylo::{OccurrenceMask, PhyloScore, MAX_SPECIES};
pub use pipeline::{FamilyReport, MotifDiscovery, MotifLocator, RunReport};
pub use suffix_tree::{GeneralizedSuffixTree, MaximalMatch, TreePosition};
