//! Gene family records and the concatenated text they are indexed as.
//!
//! A family arrives as a name, a Newick tree and one line per species, each
//! line holding one or more paralogous genes separated by spaces. The text
//! indexed for a family lays every line out as
//!
//! ```text
//! <forward line> $ <reverse complement of line> $ ... #
//! ```
//!
//! where `$` separates sequences (alignment gaps become `$` as well) and the
//! trailing `#` occurs exactly once.

use std::collections::VecDeque;
use std::io::BufRead;

use bio::alphabets::dna;

use crate::error::{MotifError, Result};
use crate::phylo::{OccurrenceMask, PhyloScore};

/// Separator between sequences, also standing in for alignment gaps.
pub const DELIMITER: u8 = b'$';
/// Final symbol of every text; occurs nowhere else.
pub const TERMINATOR: u8 = b'#';
/// Separator between paralogous genes on one line.
pub const PARALOG_SEPARATOR: u8 = b' ';
/// Gap filler used by aligned input.
pub const GAP: u8 = b'-';

/// One species line of a family: its genes and their sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRecord {
    pub gene_ids: Vec<String>,
    pub species: String,
    /// Space-separated gene sequences, one per entry of `gene_ids`.
    pub sequence: String,
}

/// An orthologous gene family with its species tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneFamily {
    pub name: String,
    pub newick: String,
    pub genes: Vec<GeneRecord>,
}

/// Source of gene families, consumed one family at a time.
pub trait GeneCorpus {
    /// Next family, or `None` once the source is exhausted.
    fn next_family(&mut self) -> Result<Option<GeneFamily>>;
}

/// Families held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCorpus {
    families: VecDeque<GeneFamily>,
}

impl InMemoryCorpus {
    pub fn new(families: Vec<GeneFamily>) -> Self {
        Self {
            families: families.into(),
        }
    }
}

impl GeneCorpus for InMemoryCorpus {
    fn next_family(&mut self) -> Result<Option<GeneFamily>> {
        Ok(self.families.pop_front())
    }
}

/// Streaming parser for the line-oriented family format.
pub struct RecordReader<R> {
    reader: R,
    line_number: usize,
    buffer: String,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buffer: String::new(),
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        self.buffer.clear();
        if self.reader.read_line(&mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(self.buffer.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn require_line(&mut self, family: &str, what: &str) -> Result<String> {
        self.read_line()?.ok_or_else(|| {
            MotifError::MalformedInput(format!(
                "family '{family}' ended before its {what} (line {})",
                self.line_number + 1
            ))
        })
    }

    fn malformed(&self, message: String) -> MotifError {
        MotifError::MalformedInput(format!("{message} (line {})", self.line_number))
    }
}

impl<R: BufRead> GeneCorpus for RecordReader<R> {
    fn next_family(&mut self) -> Result<Option<GeneFamily>> {
        let name = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line.trim().to_string(),
            }
        };
        let newick = self.require_line(&name, "Newick tree")?.trim().to_string();
        let count_line = self.require_line(&name, "gene count")?;
        let count: usize = count_line.trim().parse().map_err(|_| {
            self.malformed(format!(
                "family '{name}': gene count '{}' is not an integer",
                count_line.trim()
            ))
        })?;

        let mut genes = Vec::with_capacity(count);
        for _ in 0..count {
            let header = self.require_line(&name, "gene header")?;
            let (ids, species) = header.split_once('\t').ok_or_else(|| {
                self.malformed(format!(
                    "family '{name}': gene header '{header}' has no TAB before the species"
                ))
            })?;
            let gene_ids: Vec<String> = ids.split(' ').map(str::to_string).collect();
            let species = species.trim().to_string();
            let sequence = self.require_line(&name, "gene sequence")?;
            genes.push(GeneRecord {
                gene_ids,
                species,
                sequence,
            });
        }
        log::debug!("Read family '{}' with {} gene lines", name, genes.len());
        Ok(Some(GeneFamily {
            name,
            newick,
            genes,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn symbol(self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
        }
    }
}

/// First text offset belonging to a species, with that species' bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceBoundary {
    pub start: usize,
    pub mask: OccurrenceMask,
}

/// A single gene on one strand within the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneSegment {
    pub start: usize,
    pub len: usize,
    /// Index into [`TextCorpus::gene_id`].
    pub gene: usize,
    pub species: usize,
    pub strand: Strand,
}

/// A text offset resolved to the gene it falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHit<'a> {
    pub segment: &'a GeneSegment,
    pub offset: usize,
}

/// The indexed text of one family plus the tables mapping offsets back to genes.
#[derive(Debug, Clone)]
pub struct TextCorpus {
    text: Vec<u8>,
    boundaries: Vec<SourceBoundary>,
    segments: Vec<GeneSegment>,
    gene_ids: Vec<String>,
}

impl TextCorpus {
    /// Lay out `family` as text, assigning each line the bit of its species in `bls`.
    pub fn build(family: &GeneFamily, bls: &PhyloScore) -> Result<Self> {
        let mut corpus = Self {
            text: Vec::new(),
            boundaries: Vec::with_capacity(family.genes.len()),
            segments: Vec::new(),
            gene_ids: Vec::new(),
        };
        for record in &family.genes {
            let species = bls
                .species_index(&record.species)
                .ok_or_else(|| MotifError::SpeciesNotFound(record.species.clone()))?;
            let line: Vec<u8> = record
                .sequence
                .bytes()
                .map(|b| if b == GAP { DELIMITER } else { b.to_ascii_uppercase() })
                .collect();
            let pieces = line.split(|&b| b == PARALOG_SEPARATOR).count();
            if pieces != record.gene_ids.len() {
                return Err(MotifError::MalformedInput(format!(
                    "species '{}' lists {} gene ids but {} sequences",
                    record.species,
                    record.gene_ids.len(),
                    pieces
                )));
            }

            corpus.boundaries.push(SourceBoundary {
                start: corpus.text.len(),
                mask: 1 << species,
            });
            let first_gene = corpus.gene_ids.len();
            corpus.gene_ids.extend(record.gene_ids.iter().cloned());

            corpus.push_line(&line, species, Strand::Forward, |k| first_gene + k);
            let reverse = dna::revcomp(&line);
            let last = record.gene_ids.len() - 1;
            corpus.push_line(&reverse, species, Strand::Reverse, |k| first_gene + last - k);
        }
        corpus.text.push(TERMINATOR);
        if corpus.text.len() >= u32::MAX as usize {
            return Err(MotifError::CapacityExceeded {
                what: "text length",
                found: corpus.text.len(),
                limit: u32::MAX as usize - 1,
            });
        }
        Ok(corpus)
    }

    fn push_line(
        &mut self,
        line: &[u8],
        species: usize,
        strand: Strand,
        gene_of: impl Fn(usize) -> usize,
    ) {
        let mut start = self.text.len();
        for (k, piece) in line.split(|&b| b == PARALOG_SEPARATOR).enumerate() {
            self.segments.push(GeneSegment {
                start,
                len: piece.len(),
                gene: gene_of(k),
                species,
                strand,
            });
            start += piece.len() + 1;
        }
        self.text.extend_from_slice(line);
        self.text.push(DELIMITER);
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    pub fn boundaries(&self) -> &[SourceBoundary] {
        &self.boundaries
    }

    pub fn segments(&self) -> &[GeneSegment] {
        &self.segments
    }

    pub fn gene_id(&self, gene: usize) -> &str {
        &self.gene_ids[gene]
    }

    /// Resolve a text offset to its gene, or `None` for separators and the terminator.
    pub fn locate(&self, offset: usize) -> Option<SegmentHit<'_>> {
        let idx = self.segments.partition_point(|s| s.start <= offset);
        let segment = self.segments.get(idx.checked_sub(1)?)?;
        (offset < segment.start + segment.len).then(|| SegmentHit {
            segment,
            offset: offset - segment.start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const NEWICK: &str = "((BD:0.2688,OS:0.2688):0.0538,(SB:0.086,ZM:0.086):0.2366);";

    fn record(ids: &str, species: &str, sequence: &str) -> GeneRecord {
        GeneRecord {
            gene_ids: ids.split(' ').map(str::to_string).collect(),
            species: species.to_string(),
            sequence: sequence.to_string(),
        }
    }

    fn family(genes: Vec<GeneRecord>) -> GeneFamily {
        GeneFamily {
            name: "FAM1".to_string(),
            newick: NEWICK.to_string(),
            genes,
        }
    }

    #[test]
    fn reader_parses_consecutive_families() {
        let input = "\nFAM1\n(A:1,B:1);\n2\ng1\tA\nACGT\ng2 g3\tB\nAC-G TT\n\n\nFAM2\n(A:1,B:1);\n1\ng4\tA\nacgt\n";
        let mut reader = RecordReader::new(Cursor::new(input));
        let first = reader.next_family().unwrap().unwrap();
        assert_eq!(first.name, "FAM1");
        assert_eq!(first.newick, "(A:1,B:1);");
        assert_eq!(first.genes.len(), 2);
        assert_eq!(first.genes[1].gene_ids, vec!["g2", "g3"]);
        assert_eq!(first.genes[1].species, "B");
        assert_eq!(first.genes[1].sequence, "AC-G TT");
        let second = reader.next_family().unwrap().unwrap();
        assert_eq!(second.name, "FAM2");
        assert_eq!(second.genes[0].sequence, "acgt");
        assert!(reader.next_family().unwrap().is_none());
    }

    #[test]
    fn reader_rejects_truncated_and_malformed_records() {
        let cases = [
            "FAM\n(A,B);\n",
            "FAM\n(A,B);\ntwo\n",
            "FAM\n(A,B);\n1\ng1 A\nACGT\n",
            "FAM\n(A,B);\n2\ng1\tA\nACGT\n",
        ];
        for input in cases {
            let mut reader = RecordReader::new(Cursor::new(input));
            assert!(
                matches!(reader.next_family(), Err(MotifError::MalformedInput(_))),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn text_layout_interleaves_reverse_complements() {
        let bls = PhyloScore::new(NEWICK, &[0.1]).unwrap();
        let fam = family(vec![
            record("g1", "BD", "ACGTT"),
            record("g2", "ZM", "aac"),
        ]);
        let corpus = TextCorpus::build(&fam, &bls).unwrap();
        assert_eq!(corpus.text(), b"ACGTT$AACGT$AAC$GTT$#");
        assert_eq!(
            corpus.boundaries(),
            &[
                SourceBoundary { start: 0, mask: 0b0001 },
                SourceBoundary { start: 12, mask: 0b1000 },
            ]
        );
    }

    #[test]
    fn paralogs_and_gaps_become_segments() {
        let bls = PhyloScore::new(NEWICK, &[0.1]).unwrap();
        let fam = family(vec![record("a b", "OS", "AC-G TTT")]);
        let corpus = TextCorpus::build(&fam, &bls).unwrap();
        assert_eq!(corpus.text(), b"AC$G TTT$AAA C$GT$#");

        let hit = corpus.locate(5).unwrap();
        assert_eq!(corpus.gene_id(hit.segment.gene), "b");
        assert_eq!(hit.segment.strand, Strand::Forward);
        assert_eq!(hit.offset, 0);

        // Reverse complement lists genes in reverse order.
        let hit = corpus.locate(9).unwrap();
        assert_eq!(corpus.gene_id(hit.segment.gene), "b");
        assert_eq!(hit.segment.strand, Strand::Reverse);
        let hit = corpus.locate(14).unwrap();
        assert_eq!(corpus.gene_id(hit.segment.gene), "a");
        assert_eq!(hit.offset, 1);

        assert!(corpus.locate(4).is_none());
        assert!(corpus.locate(8).is_none());
        assert!(corpus.locate(corpus.text().len() - 1).is_none());
    }

    #[test]
    fn unknown_species_fails_the_family() {
        let bls = PhyloScore::new(NEWICK, &[0.1]).unwrap();
        let fam = family(vec![record("g1", "XX", "ACGT")]);
        assert!(matches!(
            TextCorpus::build(&fam, &bls),
            Err(MotifError::SpeciesNotFound(name)) if name == "XX"
        ));
    }

    #[test]
    fn gene_ids_must_match_sequences() {
        let bls = PhyloScore::new(NEWICK, &[0.1]).unwrap();
        let fam = family(vec![record("g1", "BD", "ACGT TTT")]);
        assert!(matches!(
            TextCorpus::build(&fam, &bls),
            Err(MotifError::MalformedInput(_))
        ));
    }

    #[test]
    fn in_memory_corpus_yields_in_order() {
        let mut corpus = InMemoryCorpus::new(vec![family(vec![]), family(vec![])]);
        assert!(corpus.next_family().unwrap().is_some());
        assert!(corpus.next_family().unwrap().is_some());
        assert!(corpus.next_family().unwrap().is_none());
    }
}
