//! Run-wide motif count trie.
//!
//! Every enumerated motif of every family is folded into one trie keyed by
//! its IUPAC symbols. Nodes are fixed-shape arena records: a 15-entry table
//! from symbol to child slot, the number of used slots, an optional count
//! vector and the child ids. Children at the last allowed motif position are
//! never materialized as nodes; their parent keeps their count vectors back to
//! back in one flat array indexed by slot.
//!
//! The trie is written out exactly once, depth first in alphabetical symbol
//! order. Each node's buffers are released as soon as its subtree has been
//! written; the arena of fixed-size records goes when the walk ends.

use std::io::Write;

use smallvec::SmallVec;

use crate::error::{MotifError, Result};
use crate::iupac::IupacSymbol;
use crate::output::MotifWriter;

const NO_CHILD: u8 = u8::MAX;
const ROOT: usize = 0;

#[derive(Debug)]
struct AggregateNode {
    slots: [u8; IupacSymbol::COUNT],
    child_count: u8,
    counts: Option<Box<[u16]>>,
    children: SmallVec<[u32; 4]>,
    /// Count vectors of last-position children, `threshold_count` per slot.
    terminal: Box<[u16]>,
}

impl Default for AggregateNode {
    fn default() -> Self {
        Self {
            slots: [NO_CHILD; IupacSymbol::COUNT],
            child_count: 0,
            counts: None,
            children: SmallVec::new(),
            terminal: Box::default(),
        }
    }
}

impl AggregateNode {
    /// Slot for `symbol`, claiming the next free one if it has none yet.
    fn claim_slot(&mut self, symbol: IupacSymbol) -> (usize, bool) {
        let slot = &mut self.slots[symbol.index()];
        if *slot != NO_CHILD {
            return (usize::from(*slot), false);
        }
        *slot = self.child_count;
        self.child_count += 1;
        (usize::from(*slot), true)
    }
}

/// Per-threshold family counts for every motif seen during a run.
#[derive(Debug)]
pub struct CompactMotifAggregator {
    nodes: Vec<AggregateNode>,
    max_len: usize,
    threshold_count: usize,
    motifs: u64,
}

impl CompactMotifAggregator {
    /// Aggregator for motifs shorter than `max_len` with `threshold_count` counters each.
    pub fn new(max_len: usize, threshold_count: usize) -> Self {
        Self {
            nodes: vec![AggregateNode::default()],
            max_len,
            threshold_count,
            motifs: 0,
        }
    }

    /// Distinct motifs stored so far.
    pub fn motif_count(&self) -> u64 {
        self.motifs
    }

    pub fn is_empty(&self) -> bool {
        self.motifs == 0
    }

    /// Count one family in which `motif` exceeded its first `satisfied` thresholds.
    pub fn add_occurrence(&mut self, motif: &[IupacSymbol], satisfied: u8) -> Result<()> {
        if motif.is_empty() || motif.len() >= self.max_len {
            return Err(MotifError::Configuration(format!(
                "motif of length {} cannot be aggregated below length {}",
                motif.len(),
                self.max_len
            )));
        }
        let satisfied = usize::from(satisfied);
        if satisfied > self.threshold_count {
            return Err(MotifError::Configuration(format!(
                "{satisfied} thresholds satisfied but only {} configured",
                self.threshold_count
            )));
        }

        let width = self.threshold_count;
        let (last, path) = motif.split_last().ok_or_else(|| {
            MotifError::Configuration("empty motif cannot be aggregated".into())
        })?;
        let mut node = ROOT;
        for &symbol in path {
            node = self.child_or_insert(node, symbol)?;
        }

        let counts = if motif.len() == self.max_len - 1 {
            let parent = &mut self.nodes[node];
            let (slot, created) = parent.claim_slot(*last);
            if created {
                let mut grown = std::mem::take(&mut parent.terminal).into_vec();
                grown.resize(grown.len() + width, 0);
                parent.terminal = grown.into_boxed_slice();
                self.motifs += 1;
            }
            &mut parent.terminal[slot * width..(slot + 1) * width]
        } else {
            let node = self.child_or_insert(node, *last)?;
            let slot = &mut self.nodes[node].counts;
            if slot.is_none() {
                self.motifs += 1;
            }
            &mut slot.get_or_insert_with(|| vec![0; width].into_boxed_slice())[..]
        };
        for count in &mut counts[..satisfied] {
            *count = count.saturating_add(1);
        }
        Ok(())
    }

    fn child_or_insert(&mut self, node: usize, symbol: IupacSymbol) -> Result<usize> {
        let parent = &self.nodes[node];
        let slot = parent.slots[symbol.index()];
        if slot != NO_CHILD {
            return Ok(parent.children[usize::from(slot)] as usize);
        }
        let next_id = self.nodes.len();
        let child = node_id(next_id)?;
        let parent = &mut self.nodes[node];
        parent.claim_slot(symbol);
        parent.children.push(child);
        self.nodes.push(AggregateNode::default());
        Ok(next_id)
    }

    /// Write every motif with its counts and release the trie.
    ///
    /// Each node's count vector, terminal counts and child list are freed as
    /// soon as its subtree has been written. The arena itself keeps one empty
    /// record per node until the walk ends and is released then.
    ///
    /// Returns the number of motifs written.
    pub fn flush<W: Write>(mut self, writer: &mut MotifWriter<W>) -> Result<u64> {
        let mut prefix = Vec::with_capacity(self.max_len);
        let mut written = 0;
        self.drain(ROOT, &mut prefix, writer, &mut written)?;
        self.nodes.clear();
        self.nodes.shrink_to_fit();
        Ok(written)
    }

    fn drain<W: Write>(
        &mut self,
        id: usize,
        prefix: &mut Vec<IupacSymbol>,
        writer: &mut MotifWriter<W>,
        written: &mut u64,
    ) -> Result<()> {
        let node = std::mem::take(&mut self.nodes[id]);
        if let Some(counts) = &node.counts {
            writer.write_counts(prefix, counts)?;
            *written += 1;
        }
        let width = self.threshold_count;
        for symbol in IupacSymbol::ALPHABETICAL {
            let slot = node.slots[symbol.index()];
            if slot == NO_CHILD {
                continue;
            }
            let slot = usize::from(slot);
            prefix.push(symbol);
            if node.children.is_empty() {
                writer.write_counts(prefix, &node.terminal[slot * width..(slot + 1) * width])?;
                *written += 1;
            } else {
                self.drain(node.children[slot] as usize, prefix, writer, written)?;
            }
            prefix.pop();
        }
        Ok(())
    }
}

fn node_id(index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| MotifError::CapacityExceeded {
        what: "aggregator nodes",
        found: index,
        limit: u32::MAX as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iupac::parse_motif;
    use crate::output::OutputFormat;

    fn m(text: &str) -> Vec<IupacSymbol> {
        parse_motif(text).unwrap()
    }

    fn flush_text(aggregator: CompactMotifAggregator) -> String {
        let mut writer = MotifWriter::new(Vec::new(), OutputFormat::Text, false, 6, 3);
        aggregator.flush(&mut writer).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn counts_add_up_across_families() {
        let mut aggregator = CompactMotifAggregator::new(6, 3);
        // Two families emitting the same motif with different counts.
        aggregator.add_occurrence(&m("ACGTA"), 3).unwrap();
        aggregator.add_occurrence(&m("ACGTA"), 1).unwrap();
        aggregator.add_occurrence(&m("ACG"), 2).unwrap();
        aggregator.add_occurrence(&m("ACG"), 2).unwrap();
        assert_eq!(aggregator.motif_count(), 2);
        assert_eq!(flush_text(aggregator), "ACG\t2,2,0\nACGTA\t2,1,1\n");
    }

    #[test]
    fn flush_walks_symbols_alphabetically() {
        let mut aggregator = CompactMotifAggregator::new(6, 3);
        for motif in ["TTT", "AN", "AB", "ACGTY", "ACGTC", "AC", "YA"] {
            aggregator.add_occurrence(&m(motif), 1).unwrap();
        }
        let out = flush_text(aggregator);
        let motifs: Vec<&str> = out.lines().map(|l| l.split('\t').next().unwrap()).collect();
        assert_eq!(motifs, vec!["AB", "AC", "ACGTC", "ACGTY", "AN", "TTT", "YA"]);
    }

    #[test]
    fn counters_saturate() {
        let mut aggregator = CompactMotifAggregator::new(4, 1);
        for _ in 0..(u16::MAX as usize + 5) {
            aggregator.add_occurrence(&m("ACG"), 1).unwrap();
        }
        let mut writer = MotifWriter::new(Vec::new(), OutputFormat::Text, false, 4, 1);
        assert_eq!(aggregator.flush(&mut writer).unwrap(), 1);
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, format!("ACG\t{}\n", u16::MAX));
    }

    #[test]
    fn zero_satisfied_still_records_the_motif() {
        let mut aggregator = CompactMotifAggregator::new(6, 3);
        aggregator.add_occurrence(&m("GG"), 0).unwrap();
        assert!(!aggregator.is_empty());
        assert_eq!(flush_text(aggregator), "GG\t0,0,0\n");
    }

    #[test]
    fn draining_releases_node_buffers() {
        let mut aggregator = CompactMotifAggregator::new(4, 2);
        for motif in ["ACG", "AC", "TTA", "G"] {
            aggregator.add_occurrence(&m(motif), 2).unwrap();
        }
        let nodes = aggregator.nodes.len();
        let mut writer = MotifWriter::new(Vec::new(), OutputFormat::Text, false, 4, 2);
        let mut prefix = Vec::new();
        let mut written = 0;
        aggregator.drain(ROOT, &mut prefix, &mut writer, &mut written).unwrap();

        assert_eq!(written, 4);
        assert_eq!(aggregator.nodes.len(), nodes);
        for node in &aggregator.nodes {
            assert!(node.counts.is_none());
            assert!(node.children.is_empty());
            assert!(node.terminal.is_empty());
        }
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn node_ids_past_u32_are_rejected() {
        assert_eq!(node_id(u32::MAX as usize).unwrap(), u32::MAX);
        assert!(matches!(
            node_id(u32::MAX as usize + 1),
            Err(MotifError::CapacityExceeded { what: "aggregator nodes", .. })
        ));
    }

    #[test]
    fn out_of_window_motifs_are_rejected() {
        let mut aggregator = CompactMotifAggregator::new(4, 2);
        assert!(aggregator.add_occurrence(&m("ACGT"), 1).is_err());
        assert!(aggregator.add_occurrence(&[], 1).is_err());
        assert!(aggregator.add_occurrence(&m("AC"), 3).is_err());
        assert!(aggregator.is_empty());
    }
}
