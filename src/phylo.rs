//! Branch length scores over a family's species tree.
//!
//! The Newick tree is parsed into an arena of sibling/child linked nodes. Each
//! leaf claims the next species bit in the order it is encountered, and that
//! order is handed back to callers through [`PhyloScore::species`]. After
//! parsing, the score and the threshold count of every possible occurrence
//! mask are tabulated so lookups during enumeration are a single index.

use smallvec::SmallVec;

use crate::error::{MotifError, Result};

/// Bitmask of species, bit `i` standing for `species()[i]`.
pub type OccurrenceMask = u16;

/// Number of species an [`OccurrenceMask`] can describe.
pub const MAX_SPECIES: usize = OccurrenceMask::BITS as usize;

/// Largest number of thresholds whose satisfied count fits the per-mask table.
pub const MAX_THRESHOLDS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Default)]
struct PhyloNode {
    length: f64,
    mask: OccurrenceMask,
    first_child: Option<usize>,
    next_sibling: Option<usize>,
}

/// Precomputed branch length scores for every subset of a family's species.
#[derive(Debug, Clone)]
pub struct PhyloScore {
    species: Vec<String>,
    thresholds: Vec<f64>,
    scores: Vec<f64>,
    satisfied: Vec<u8>,
}

impl PhyloScore {
    /// Parse `newick` and tabulate scores against ascending `thresholds`.
    pub fn new(newick: &str, thresholds: &[f64]) -> Result<Self> {
        validate_thresholds(thresholds)?;
        let tree = SpeciesTree::parse(newick)?;

        let table_len = 1usize << tree.species.len();
        let mut scores = Vec::with_capacity(table_len);
        let mut satisfied = Vec::with_capacity(table_len);
        for mask in 0..table_len {
            let score = tree.score(mask as OccurrenceMask);
            scores.push(score);
            satisfied.push(thresholds.iter().filter(|&&t| score > t).count() as u8);
        }
        log::debug!(
            "Tabulated {} occurrence masks over {} species",
            table_len,
            tree.species.len()
        );

        Ok(Self {
            species: tree.species,
            thresholds: thresholds.to_vec(),
            scores,
            satisfied,
        })
    }

    /// Leaf names in bit order.
    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s == name)
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn threshold_count(&self) -> usize {
        self.thresholds.len()
    }

    /// Total branch length of the minimal subtree connecting the species in `mask`.
    #[inline]
    pub fn score(&self, mask: OccurrenceMask) -> f64 {
        self.scores[self.index(mask)]
    }

    /// Number of thresholds strictly exceeded by `score(mask)`.
    #[inline]
    pub fn vector(&self, mask: OccurrenceMask) -> u8 {
        self.satisfied[self.index(mask)]
    }

    #[inline]
    pub fn greater_than_min_threshold(&self, mask: OccurrenceMask) -> bool {
        self.vector(mask) > 0
    }

    #[inline]
    pub fn greater_than_threshold(&self, mask: OccurrenceMask, threshold: usize) -> bool {
        usize::from(self.vector(mask)) > threshold
    }

    #[inline]
    fn index(&self, mask: OccurrenceMask) -> usize {
        usize::from(mask) & (self.scores.len() - 1)
    }
}

pub(crate) fn validate_thresholds(thresholds: &[f64]) -> Result<()> {
    if thresholds.is_empty() {
        return Err(MotifError::Configuration(
            "at least one BLS threshold is required".into(),
        ));
    }
    if thresholds.len() > MAX_THRESHOLDS {
        return Err(MotifError::Configuration(format!(
            "{} BLS thresholds given, at most {MAX_THRESHOLDS} are supported",
            thresholds.len()
        )));
    }
    if thresholds.iter().any(|t| !t.is_finite()) {
        return Err(MotifError::Configuration(
            "BLS thresholds must be finite".into(),
        ));
    }
    if thresholds.windows(2).any(|w| w[0] >= w[1]) {
        return Err(MotifError::Configuration(format!(
            "BLS thresholds must be strictly ascending, got {thresholds:?}"
        )));
    }
    Ok(())
}

/// Parsed topology, alive only while the score tables are filled.
struct SpeciesTree {
    nodes: Vec<PhyloNode>,
    root: usize,
    species: Vec<String>,
}

impl SpeciesTree {
    fn parse(newick: &str) -> Result<Self> {
        let mut parser = NewickParser::new(newick.as_bytes());
        let root = parser.parse_tree()?;
        Ok(Self {
            nodes: parser.nodes,
            root,
            species: parser.species,
        })
    }

    fn siblings(&self, first: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(first, move |&id| self.nodes[id].next_sibling)
    }

    fn score(&self, mask: OccurrenceMask) -> f64 {
        self.steiner(self.nodes[self.root].first_child, mask)
    }

    /// Length of the subtree joining all species of `mask` below a sibling list.
    fn steiner(&self, first: Option<usize>, mask: OccurrenceMask) -> f64 {
        if mask.count_ones() <= 1 {
            return 0.0;
        }
        let hits: SmallVec<[usize; 4]> = self
            .siblings(first)
            .filter(|&id| self.nodes[id].mask & mask != 0)
            .collect();
        if let [only] = hits.as_slice() {
            let node = &self.nodes[*only];
            if node.first_child.is_some() && node.mask & mask == mask {
                // Not yet the junction: the edge above this node is not needed.
                return self.steiner(node.first_child, mask);
            }
        }
        hits.iter().map(|&id| self.spanning(id, mask)).sum()
    }

    /// Length from the top of `id`'s edge down to every queried species beneath it.
    fn spanning(&self, id: usize, mask: OccurrenceMask) -> f64 {
        let node = &self.nodes[id];
        let below: f64 = self
            .siblings(node.first_child)
            .filter(|&child| self.nodes[child].mask & mask != 0)
            .map(|child| self.spanning(child, mask))
            .sum();
        node.length + below
    }
}

struct NewickParser<'a> {
    input: &'a [u8],
    pos: usize,
    nodes: Vec<PhyloNode>,
    species: Vec<String>,
}

impl<'a> NewickParser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            nodes: Vec::new(),
            species: Vec::new(),
        }
    }

    fn parse_tree(&mut self) -> Result<usize> {
        self.skip_whitespace();
        let root = self.parse_subtree()?;
        self.skip_whitespace();
        if self.peek() != Some(b';') {
            return Err(self.error("expected ';' at end of tree"));
        }
        self.pos += 1;
        self.skip_whitespace();
        if self.pos != self.input.len() {
            return Err(self.error("unexpected text after ';'"));
        }
        Ok(root)
    }

    fn parse_subtree(&mut self) -> Result<usize> {
        self.skip_whitespace();
        let id = self.nodes.len();
        self.nodes.push(PhyloNode::default());

        if self.peek() == Some(b'(') {
            self.pos += 1;
            let mut children: SmallVec<[usize; 4]> = SmallVec::new();
            children.push(self.parse_subtree()?);
            loop {
                self.skip_whitespace();
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        children.push(self.parse_subtree()?);
                    }
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
            self.attach_children(id, &children);
            // Internal labels carry no species.
            self.parse_name();
        } else {
            let name = self.parse_name();
            if name.is_empty() {
                return Err(self.error("leaf without a name"));
            }
            self.add_species(id, name)?;
        }
        self.parse_length(id)?;
        Ok(id)
    }

    fn attach_children(&mut self, id: usize, children: &[usize]) {
        if let [only] = children {
            // A single-child group collapses into its parent edge.
            let child = self.nodes[*only].clone();
            let node = &mut self.nodes[id];
            node.length += child.length;
            node.mask = child.mask;
            node.first_child = child.first_child;
            return;
        }
        for pair in children.windows(2) {
            self.nodes[pair[0]].next_sibling = Some(pair[1]);
        }
        let mask = children.iter().fold(0, |acc, &c| acc | self.nodes[c].mask);
        let node = &mut self.nodes[id];
        node.first_child = children.first().copied();
        node.mask = mask;
    }

    fn add_species(&mut self, id: usize, name: String) -> Result<()> {
        if self.species.contains(&name) {
            return Err(self.error(&format!("duplicate leaf '{name}'")));
        }
        if self.species.len() == MAX_SPECIES {
            return Err(MotifError::CapacityExceeded {
                what: "species in tree",
                found: self.species.len() + 1,
                limit: MAX_SPECIES,
            });
        }
        self.nodes[id].mask = 1 << self.species.len();
        self.species.push(name);
        Ok(())
    }

    fn parse_length(&mut self, id: usize) -> Result<()> {
        self.skip_whitespace();
        if self.peek() != Some(b':') {
            return Ok(());
        }
        self.pos += 1;
        self.skip_whitespace();
        let start = self.pos;
        while let Some(b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E') = self.peek() {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]);
        let length: f64 = text
            .parse()
            .map_err(|_| self.error(&format!("invalid branch length '{text}'")))?;
        self.nodes[id].length += length;
        Ok(())
    }

    fn parse_name(&mut self) -> String {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(byte) = self.peek() {
            match byte {
                b':' | b',' | b')' | b'(' | b';' | b' ' | b'\t' | b'\n' | b'\r' => break,
                _ => self.pos += 1,
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> MotifError {
        MotifError::MalformedTree(format!("{message} at byte {}", self.pos))
    }
}
