//! Depth-first enumeration of conserved degenerate motifs.
//!
//! A motif prefix is represented by the set of tree positions spelling any of
//! its expansions. Extending the prefix by one symbol maps each position
//! through every base the symbol stands for, and the union of the reached
//! nodes' masks tells which species still contain the motif. Since that set
//! only shrinks as the motif grows, a prefix whose mask no longer clears the
//! lowest threshold is abandoned with its whole subtree.
//!
//! Position sets live in a pool with one buffer per prefix length; each level
//! of the recursion borrows the deeper part of the pool exclusively.

use std::io::Write;

use serde::Serialize;

use crate::config::{DiscoveryConfig, MatchingMode};
use crate::corpus::{Strand, TextCorpus};
use crate::error::Result;
use crate::iupac::{Alphabet, IupacSymbol};
use crate::motif::{is_group_representative, is_representative};
use crate::output::MotifSink;
use crate::phylo::{OccurrenceMask, PhyloScore};
use crate::suffix_tree::{GeneralizedSuffixTree, TreePosition};

/// Counters reported after enumerating one family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnumerationStats {
    /// Prefixes with at least one occurrence that were scored.
    pub iterated: u64,
    /// Motifs handed to the sink.
    pub emitted: u64,
}

#[derive(Default)]
struct WalkState {
    prefix: Vec<IupacSymbol>,
    stats: EnumerationStats,
    leaves: Vec<usize>,
    columns: Vec<(Strand, usize, OccurrenceMask)>,
}

pub struct MotifEnumerator<'a> {
    tree: &'a GeneralizedSuffixTree,
    corpus: &'a TextCorpus,
    bls: &'a PhyloScore,
    config: &'a DiscoveryConfig,
}

impl<'a> MotifEnumerator<'a> {
    pub fn new(
        tree: &'a GeneralizedSuffixTree,
        corpus: &'a TextCorpus,
        bls: &'a PhyloScore,
        config: &'a DiscoveryConfig,
    ) -> Self {
        Self {
            tree,
            corpus,
            bls,
            config,
        }
    }

    /// Emit every canonical conserved motif in the length window to `sink`.
    pub fn run<W: Write>(&self, sink: &mut MotifSink<W>) -> Result<EnumerationStats> {
        let mut levels: Vec<Vec<TreePosition>> = vec![Vec::new(); self.config.max_len];
        if let Some(first) = levels.first_mut() {
            first.push(self.tree.root());
        }
        let mut state = WalkState {
            prefix: Vec::with_capacity(self.config.max_len),
            ..WalkState::default()
        };
        self.descend(&mut levels, 0, &mut state, sink)?;
        Ok(state.stats)
    }

    fn descend<W: Write>(
        &self,
        levels: &mut [Vec<TreePosition>],
        degenerate_used: usize,
        state: &mut WalkState,
        sink: &mut MotifSink<W>,
    ) -> Result<()> {
        if state.prefix.len() + 1 >= self.config.max_len {
            return Ok(());
        }
        let Some((current, deeper)) = levels.split_first_mut() else {
            return Ok(());
        };
        let alphabet = if degenerate_used < self.config.max_degenerate {
            self.config.alphabet
        } else {
            Alphabet::Exact
        };

        for &symbol in alphabet.symbols() {
            let Some(next) = deeper.first_mut() else {
                return Ok(());
            };
            next.clear();
            let mask = self.tree.advance_symbol(current, symbol, next);
            if next.is_empty() {
                continue;
            }
            state.stats.iterated += 1;
            if !self.bls.greater_than_min_threshold(mask) {
                continue;
            }

            state.prefix.push(symbol);
            if state.prefix.len() >= self.config.min_len && self.is_canonical(&state.prefix) {
                let satisfied = match self.config.mode {
                    MatchingMode::AlignmentFree => self.bls.vector(mask),
                    MatchingMode::AlignmentBased => self.aligned_vector(&deeper[0], state),
                };
                if satisfied > 0 {
                    sink.record(&state.prefix, satisfied)?;
                    state.stats.emitted += 1;
                }
            }
            let used = degenerate_used + usize::from(symbol.is_degenerate());
            self.descend(deeper, used, state, sink)?;
            state.prefix.pop();
        }
        Ok(())
    }

    fn is_canonical(&self, motif: &[IupacSymbol]) -> bool {
        if self.config.group_ids {
            is_group_representative(motif)
        } else {
            is_representative(motif)
        }
    }

    /// Threshold count of the best-scoring aligned column the motif occupies.
    ///
    /// Occurrences are grouped by strand and offset within their gene; the
    /// species of each group are combined and the highest-scoring group wins.
    fn aligned_vector(&self, positions: &[TreePosition], state: &mut WalkState) -> u8 {
        state.leaves.clear();
        for &pos in positions {
            self.tree.occurrences(pos, &mut state.leaves);
        }
        state.columns.clear();
        for &leaf in &state.leaves {
            if let Some(hit) = self.corpus.locate(leaf) {
                state
                    .columns
                    .push((hit.segment.strand, hit.offset, 1 << hit.segment.species));
            }
        }
        state.columns.sort_unstable();

        let columns = &state.columns;
        let mut best: OccurrenceMask = 0;
        let mut i = 0;
        while i < columns.len() {
            let (strand, offset, mut mask) = columns[i];
            let mut j = i + 1;
            while j < columns.len() && columns[j].0 == strand && columns[j].1 == offset {
                mask |= columns[j].2;
                j += 1;
            }
            if self.bls.score(mask) > self.bls.score(best) {
                best = mask;
            }
            i = j;
        }
        self.bls.vector(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{GeneFamily, GeneRecord};

    const PAIR_TREE: &str = "(A:0.5,B:0.5);";

    fn family(sequences: &[(&str, &str)]) -> GeneFamily {
        GeneFamily {
            name: "FAM".into(),
            newick: PAIR_TREE.into(),
            genes: sequences
                .iter()
                .map(|(species, seq)| GeneRecord {
                    gene_ids: vec![format!("{species}_1")],
                    species: species.to_string(),
                    sequence: seq.to_string(),
                })
                .collect(),
        }
    }

    fn enumerate(fam: &GeneFamily, config: &DiscoveryConfig) -> (String, EnumerationStats) {
        config.validate().unwrap();
        let bls = PhyloScore::new(&fam.newick, &config.thresholds).unwrap();
        let corpus = TextCorpus::build(fam, &bls).unwrap();
        let tree = GeneralizedSuffixTree::build(corpus.text(), corpus.boundaries()).unwrap();
        let mut sink = MotifSink::new(config, Vec::new());
        let stats = MotifEnumerator::new(&tree, &corpus, &bls, config)
            .run(&mut sink)
            .unwrap();
        let (out, _) = sink.finish().unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    fn window(min_len: usize, max_len: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            min_len,
            max_len,
            thresholds: vec![0.5],
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn alignment_free_counts_occurrences_anywhere() {
        let fam = family(&[("A", "ACGTTT"), ("B", "TTACGT")]);
        let (out, stats) = enumerate(&fam, &window(4, 5));
        assert_eq!(out, "ACGT\t1\n");
        assert_eq!(stats.emitted, 1);
        assert!(stats.iterated >= stats.emitted);
    }

    #[test]
    fn alignment_based_requires_a_shared_column() {
        let config = DiscoveryConfig {
            mode: MatchingMode::AlignmentBased,
            ..window(4, 5)
        };
        let shifted = family(&[("A", "ACGTTT"), ("B", "TTACGT")]);
        assert_eq!(enumerate(&shifted, &config).0, "");

        let aligned = family(&[("A", "ACGTTT"), ("B", "ACGTCC")]);
        assert_eq!(enumerate(&aligned, &config).0, "ACGT\t1\n");
    }

    #[test]
    fn alignment_based_keeps_strands_apart() {
        // ACGT is at offset 0 of A's forward strand and offset 0 of B's reverse strand.
        let fam = family(&[("A", "ACGTTT"), ("B", "AAACGT")]);
        let config = DiscoveryConfig {
            mode: MatchingMode::AlignmentBased,
            ..window(4, 5)
        };
        assert_eq!(enumerate(&fam, &config).0, "");

        let (out, _) = enumerate(&fam, &window(4, 5));
        assert_eq!(out, "AAAC\t1\nAACG\t1\nACGT\t1\n");
    }

    #[test]
    fn motifs_stay_inside_the_length_window() {
        let fam = family(&[("A", "ACGTACGTAA"), ("B", "ACGTACGTCC")]);
        let (out, _) = enumerate(&fam, &window(3, 6));
        assert!(!out.is_empty());
        for line in out.lines() {
            let motif = line.split('\t').next().unwrap();
            assert!((3..6).contains(&motif.len()), "{motif} outside window");
        }
    }

    #[test]
    fn degenerate_symbols_are_capped() {
        let config = DiscoveryConfig {
            alphabet: Alphabet::ExactTwofoldsAndN,
            max_degenerate: 1,
            ..window(4, 5)
        };
        let fam = family(&[("A", "ACGTTT"), ("B", "ACCTTT")]);
        let (out, _) = enumerate(&fam, &config);
        let motifs: Vec<&str> = out.lines().map(|l| l.split('\t').next().unwrap()).collect();
        assert!(motifs.contains(&"AASG"), "missing AASG in {motifs:?}");
        for motif in &motifs {
            let degenerate = motif.bytes().filter(|b| !b"ACGT".contains(b)).count();
            assert!(degenerate <= 1, "{motif} has {degenerate} degenerate symbols");
        }
    }

    #[test]
    fn only_one_strand_of_each_motif_is_emitted() {
        let fam = family(&[("A", "AACCGGTTAC"), ("B", "AACCGGTTAC")]);
        let (out, _) = enumerate(&fam, &window(3, 5));
        let motifs: Vec<&str> = out.lines().map(|l| l.split('\t').next().unwrap()).collect();
        for motif in &motifs {
            let rc: String = motif
                .bytes()
                .rev()
                .map(|b| match b {
                    b'A' => 'T',
                    b'C' => 'G',
                    b'G' => 'C',
                    _ => 'A',
                })
                .collect();
            if rc != *motif {
                assert!(!motifs.contains(&rc.as_str()), "{motif} and {rc} both emitted");
            }
        }
    }
}
