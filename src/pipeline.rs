//! Per-family orchestration: score tables, text, suffix tree, enumeration.
//!
//! Every family is processed start to finish before the next one is read, and
//! its index structures are dropped as soon as it is done. Only the sink, and
//! with it an aggregation trie if one is configured, outlives a family.

use std::io::{BufRead, Write};
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use crate::config::{DiscoveryConfig, MatchingMode};
use crate::corpus::{GeneCorpus, GeneFamily, TextCorpus};
use crate::enumerate::MotifEnumerator;
use crate::error::Result;
use crate::iupac::{motif_to_string, parse_motif, IupacSymbol};
use crate::output::MotifSink;
use crate::phylo::PhyloScore;
use crate::suffix_tree::GeneralizedSuffixTree;

/// What happened to one family.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyReport {
    pub name: String,
    pub gene_lines: usize,
    pub species: usize,
    pub text_len: usize,
    pub tree_nodes: usize,
    pub motifs_iterated: u64,
    pub motifs_emitted: u64,
    pub elapsed_secs: f64,
}

/// Summary of a whole run, suitable for a JSON report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub mode: MatchingMode,
    pub thresholds: Vec<f64>,
    pub families: Vec<FamilyReport>,
    pub total_emitted: u64,
    pub records_written: u64,
}

/// Discovers conserved motifs family by family and routes them to one sink.
pub struct MotifDiscovery<W: Write> {
    config: DiscoveryConfig,
    sink: MotifSink<W>,
    report: RunReport,
}

impl<W: Write> MotifDiscovery<W> {
    pub fn new(config: DiscoveryConfig, out: W) -> Result<Self> {
        config.validate()?;
        let sink = MotifSink::new(&config, out);
        let report = RunReport {
            mode: config.mode,
            thresholds: config.thresholds.clone(),
            ..RunReport::default()
        };
        Ok(Self {
            config,
            sink,
            report,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Process every family `corpus` yields, stopping at the first failure.
    pub fn run<C: GeneCorpus + ?Sized>(&mut self, corpus: &mut C) -> Result<()> {
        while let Some(family) = corpus.next_family()? {
            self.process_family(&family)?;
        }
        info!(
            "Total motifs counted: {} over {} families",
            self.report.total_emitted,
            self.report.families.len()
        );
        Ok(())
    }

    pub fn process_family(&mut self, family: &GeneFamily) -> Result<&FamilyReport> {
        let report = self
            .discover(family)
            .map_err(|error| error.in_family(&family.name))?;
        self.report.total_emitted += report.motifs_emitted;
        self.report.families.push(report);
        Ok(&self.report.families[self.report.families.len() - 1])
    }

    fn discover(&mut self, family: &GeneFamily) -> Result<FamilyReport> {
        let started = Instant::now();
        let bls = PhyloScore::new(&family.newick, &self.config.thresholds)?;
        let corpus = TextCorpus::build(family, &bls)?;
        info!(
            "[{}] {} gene lines, text length {}",
            family.name,
            family.genes.len(),
            corpus.text().len()
        );
        let tree = GeneralizedSuffixTree::build(corpus.text(), corpus.boundaries())?;
        debug!("[{}] suffix tree has {} nodes", family.name, tree.node_count());

        let stats = MotifEnumerator::new(&tree, &corpus, &bls, &self.config).run(&mut self.sink)?;
        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "[{}] iterated over {} motifs, counted {} valid motifs in {:.3}s",
            family.name, stats.iterated, stats.emitted, elapsed
        );
        Ok(FamilyReport {
            name: family.name.clone(),
            gene_lines: family.genes.len(),
            species: bls.species_count(),
            text_len: corpus.text().len(),
            tree_nodes: tree.node_count(),
            motifs_iterated: stats.iterated,
            motifs_emitted: stats.emitted,
            elapsed_secs: elapsed,
        })
    }

    /// Flush the sink and hand back the output with the run summary.
    pub fn finish(self) -> Result<(W, RunReport)> {
        let mut report = self.report;
        let (out, records) = self.sink.finish()?;
        report.records_written = records;
        Ok((out, report))
    }
}

/// Read query motifs, one per non-empty line.
pub fn read_motifs<R: BufRead>(reader: R) -> Result<Vec<Vec<IupacSymbol>>> {
    let mut motifs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            motifs.push(parse_motif(trimmed)?);
        }
    }
    Ok(motifs)
}

/// Reports where given motifs occur in each family.
///
/// Each occurrence becomes one line:
/// `family, motif, gene, strand, offset in gene, BLS of the motif in the family`.
pub struct MotifLocator<W: Write> {
    motifs: Vec<Vec<IupacSymbol>>,
    thresholds: Vec<f64>,
    out: W,
    located: u64,
}

impl<W: Write> MotifLocator<W> {
    pub fn new(motifs: Vec<Vec<IupacSymbol>>, thresholds: Vec<f64>, out: W) -> Self {
        Self {
            motifs,
            thresholds,
            out,
            located: 0,
        }
    }

    pub fn run<C: GeneCorpus + ?Sized>(&mut self, corpus: &mut C) -> Result<u64> {
        while let Some(family) = corpus.next_family()? {
            self.locate_family(&family)
                .map_err(|error| error.in_family(&family.name))?;
        }
        Ok(self.located)
    }

    /// Write every occurrence of the query motifs in `family`; returns how many.
    pub fn locate_family(&mut self, family: &GeneFamily) -> Result<u64> {
        let started = Instant::now();
        let bls = PhyloScore::new(&family.newick, &self.thresholds)?;
        let corpus = TextCorpus::build(family, &bls)?;
        let tree = GeneralizedSuffixTree::build(corpus.text(), corpus.boundaries())?;

        let mut count = 0;
        let mut leaves = Vec::new();
        for motif in &self.motifs {
            let found = tree.match_iupac(motif);
            if found.positions.is_empty() {
                continue;
            }
            let score = bls.score(found.mask);
            let label = motif_to_string(motif);
            leaves.clear();
            for &pos in &found.positions {
                tree.occurrences(pos, &mut leaves);
            }
            leaves.sort_unstable();
            for &leaf in &leaves {
                let Some(hit) = corpus.locate(leaf) else {
                    continue;
                };
                writeln!(
                    self.out,
                    "{}\t{}\t{}\t{}\t{}\t{:.4}",
                    family.name,
                    label,
                    corpus.gene_id(hit.segment.gene),
                    hit.segment.strand.symbol(),
                    hit.offset,
                    score
                )?;
                count += 1;
            }
        }
        self.located += count;
        info!(
            "[{}] {} motifs located in {:.3}s",
            family.name,
            count,
            started.elapsed().as_secs_f64()
        );
        Ok(count)
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
