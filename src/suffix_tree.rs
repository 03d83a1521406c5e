//! Generalized suffix tree over the text of one gene family.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. Construction follows
//! Ukkonen's online algorithm; the suffix links it leaves behind are only used
//! while building and are recomputed afterwards in two linear passes (Maass's
//! method: if `min1 < min2` are the smallest leaves of two different children
//! of a node, leaf `min2 + 1` hangs under that node's suffix link target). The
//! second pass walks the tree depth first and sets each link when it reaches
//! the causing leaf, reading the target off the current root path.
//!
//! Every node carries an [`OccurrenceMask`] with the bit of each species that
//! has a leaf below it. Leaves are created in increasing suffix order, so the
//! species of the next leaf is found by advancing a cursor over the source
//! boundaries rather than searching for it.

use crate::corpus::{SourceBoundary, TERMINATOR};
use crate::error::{MotifError, Result};
use crate::iupac::IupacSymbol;
use crate::phylo::OccurrenceMask;

pub type NodeId = u32;

pub const ROOT: NodeId = 0;
const NIL: NodeId = u32::MAX;

/// Child slots: the four bases, N, the paralog separator, the delimiter and the terminator.
const ALPHABET_SIZE: usize = 8;
const SYMBOLS: [u8; ALPHABET_SIZE] = *b"ACGTN $#";

#[inline]
fn encode(byte: u8) -> Option<u8> {
    match byte {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        b'N' => Some(4),
        b' ' => Some(5),
        b'$' => Some(6),
        b'#' => Some(7),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Node {
    begin: u32,
    end: u32,
    parent: NodeId,
    suffix_link: NodeId,
    /// String depth at the bottom of this node's edge.
    depth: u32,
    /// Suffix start for leaves, `NIL` for internal nodes.
    suffix_index: u32,
    mask: OccurrenceMask,
    children: [NodeId; ALPHABET_SIZE],
}

impl Node {
    fn new(begin: u32, end: u32, suffix_index: u32, mask: OccurrenceMask) -> Self {
        Self {
            begin,
            end,
            parent: NIL,
            suffix_link: NIL,
            depth: 0,
            suffix_index,
            mask,
            children: [NIL; ALPHABET_SIZE],
        }
    }

    #[inline]
    fn edge_len(&self) -> u32 {
        self.end - self.begin
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.suffix_index != NIL
    }
}

/// A point in the tree: `offset` symbols down the edge leading into `node`.
///
/// A position with `offset` equal to the edge length sits exactly on `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreePosition {
    node: NodeId,
    offset: u32,
}

impl TreePosition {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }
}

/// Result of matching a degenerate motif.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IupacMatch {
    pub positions: Vec<TreePosition>,
    pub mask: OccurrenceMask,
}

/// A maximal exact match between a query and the indexed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaximalMatch {
    pub text_pos: usize,
    pub query_pos: usize,
    pub len: usize,
}

pub struct GeneralizedSuffixTree {
    text: Vec<u8>,
    nodes: Vec<Node>,
}

impl GeneralizedSuffixTree {
    /// Build the tree over `text`, which must end with the only `#` it contains.
    ///
    /// `boundaries` gives the first offset of each species' part of the text, in
    /// increasing order; leaves before the first boundary get an empty mask.
    pub fn build(text: &[u8], boundaries: &[SourceBoundary]) -> Result<Self> {
        let n = text.len();
        if n >= NIL as usize {
            return Err(MotifError::CapacityExceeded {
                what: "text length",
                found: n,
                limit: NIL as usize - 1,
            });
        }
        let terminated = text
            .split_last()
            .is_some_and(|(&last, rest)| last == TERMINATOR && !rest.contains(&TERMINATOR));
        if !terminated {
            return Err(MotifError::MalformedInput(
                "text must end with a single '#' terminator".into(),
            ));
        }
        let encoded = text
            .iter()
            .enumerate()
            .map(|(i, &b)| encode(b).ok_or_else(|| MotifError::invalid_byte(b, i)))
            .collect::<Result<Vec<u8>>>()?;

        let mut tree = Self {
            text: encoded,
            nodes: Vec::with_capacity(2 * n),
        };
        tree.nodes.push(Node::new(0, 0, NIL, OccurrenceMask::MAX));
        tree.construct(boundaries);
        tree.compute_suffix_links();
        log::debug!(
            "Suffix tree over {} symbols has {} nodes",
            n,
            tree.nodes.len()
        );
        Ok(tree)
    }

    fn construct(&mut self, boundaries: &[SourceBoundary]) {
        let n = self.text.len() as u32;
        let mut pos = self.root();
        let mut num_leaves = 0u32;
        let mut cursor = 0usize;

        for j in 1..=n {
            let c = self.text[(j - 1) as usize];
            let mut prev_internal = NIL;
            for i in num_leaves..j {
                if prev_internal != NIL && self.is_at_node(pos) {
                    self.nodes[prev_internal as usize].suffix_link = pos.node;
                    prev_internal = NIL;
                }
                if self.advance(&mut pos, c) {
                    break;
                }
                if !self.is_at_node(pos) {
                    pos = self.split_edge(pos);
                    if prev_internal != NIL {
                        self.nodes[prev_internal as usize].suffix_link = pos.node;
                    }
                    prev_internal = pos.node;
                }
                while cursor + 1 < boundaries.len() && boundaries[cursor + 1].start <= i as usize {
                    cursor += 1;
                }
                let mask = match boundaries.get(cursor) {
                    Some(b) if b.start <= i as usize => b.mask,
                    _ => 0,
                };
                self.add_leaf(pos, i, mask);
                pos = self.follow_suffix_link(pos);
                num_leaves += 1;
            }
        }
    }

    fn set_child(&mut self, parent: NodeId, child: NodeId) {
        let begin = self.nodes[child as usize].begin;
        let slot = self.text[begin as usize] as usize;
        self.nodes[parent as usize].children[slot] = child;
        let depth = self.nodes[parent as usize].depth + self.nodes[child as usize].edge_len();
        let node = &mut self.nodes[child as usize];
        node.parent = parent;
        node.depth = depth;
    }

    /// Split the edge into `pos.node` at `pos.offset`, returning a position on the new node.
    fn split_edge(&mut self, pos: TreePosition) -> TreePosition {
        let child = pos.node;
        let (begin, parent, mask) = {
            let node = &self.nodes[child as usize];
            (node.begin, node.parent, node.mask)
        };
        let mid = self.nodes.len() as NodeId;
        self.nodes
            .push(Node::new(begin, begin + pos.offset, NIL, mask));
        self.nodes[child as usize].begin = begin + pos.offset;
        self.set_child(parent, mid);
        self.set_child(mid, child);
        TreePosition {
            node: mid,
            offset: pos.offset,
        }
    }

    fn add_leaf(&mut self, pos: TreePosition, suffix: u32, mask: OccurrenceMask) {
        let n = self.text.len() as u32;
        let begin = suffix + self.position_depth(pos) as u32;
        let leaf = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(begin, n, suffix, mask));
        self.set_child(pos.node, leaf);

        let mut ancestor = pos.node;
        while ancestor != NIL && self.nodes[ancestor as usize].mask & mask != mask {
            let node = &mut self.nodes[ancestor as usize];
            node.mask |= mask;
            ancestor = node.parent;
        }
    }

    /// Replace the links left by construction with ones derived from leaf order.
    fn compute_suffix_links(&mut self) {
        let n = self.text.len();
        let count = self.nodes.len();

        let mut order = Vec::with_capacity(count);
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id));
        }

        // Bottom-up: smallest leaf per node; the runner-up among the children's
        // smallest leaves picks the leaf that causes the node's link.
        let mut min_leaf = vec![NIL; count];
        let mut cause = vec![NIL; n + 1];
        for &id in order.iter().rev() {
            let node = &self.nodes[id as usize];
            if node.is_leaf() {
                min_leaf[id as usize] = node.suffix_index;
                continue;
            }
            let (mut a, mut b) = (NIL, NIL);
            for child in self.children(id) {
                let value = min_leaf[child as usize];
                if value < a {
                    b = a;
                    a = value;
                } else if value < b {
                    b = value;
                }
            }
            min_leaf[id as usize] = a;
            if id != ROOT {
                cause[b as usize + 1] = id;
            }
        }

        // Depth first from the root: `on_path[d]` holds the node at depth `d` on the
        // path to the current node. At a causing leaf, link to the path node one
        // symbol shallower than the node it causes.
        for node in &mut self.nodes {
            node.suffix_link = NIL;
        }
        let mut on_path = vec![NIL; n + 1];
        stack.push(ROOT);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.is_leaf() {
                let source = cause[node.suffix_index as usize];
                if source != NIL {
                    let depth = self.nodes[source as usize].depth as usize;
                    self.nodes[source as usize].suffix_link = on_path[depth - 1];
                }
                continue;
            }
            on_path[node.depth as usize] = id;
            stack.extend(self.children(id));
        }
    }

    pub fn root(&self) -> TreePosition {
        TreePosition {
            node: ROOT,
            offset: 0,
        }
    }

    /// Length of the indexed text, terminator included.
    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id as usize]
            .children
            .iter()
            .copied()
            .filter(|&c| c != NIL)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id as usize].parent;
        (parent != NIL).then_some(parent)
    }

    pub fn suffix_link(&self, id: NodeId) -> Option<NodeId> {
        let link = self.nodes[id as usize].suffix_link;
        (link != NIL).then_some(link)
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id as usize].is_leaf()
    }

    /// Start of the suffix spelled by a leaf.
    pub fn suffix_index(&self, id: NodeId) -> Option<usize> {
        let node = &self.nodes[id as usize];
        node.is_leaf().then_some(node.suffix_index as usize)
    }

    pub fn node_depth(&self, id: NodeId) -> usize {
        self.nodes[id as usize].depth as usize
    }

    pub fn node_mask(&self, id: NodeId) -> OccurrenceMask {
        self.nodes[id as usize].mask
    }

    #[inline]
    pub fn is_at_node(&self, pos: TreePosition) -> bool {
        pos.offset == self.nodes[pos.node as usize].edge_len()
    }

    /// Species below a position: the mask of the node its edge leads into.
    #[inline]
    pub fn position_mask(&self, pos: TreePosition) -> OccurrenceMask {
        self.nodes[pos.node as usize].mask
    }

    #[inline]
    pub fn position_depth(&self, pos: TreePosition) -> usize {
        let node = &self.nodes[pos.node as usize];
        (node.depth - node.edge_len() + pos.offset) as usize
    }

    #[inline]
    fn advance(&self, pos: &mut TreePosition, code: u8) -> bool {
        let node = &self.nodes[pos.node as usize];
        if pos.offset == node.edge_len() {
            let child = node.children[code as usize];
            if child == NIL {
                return false;
            }
            *pos = TreePosition {
                node: child,
                offset: 1,
            };
            true
        } else if self.text[(node.begin + pos.offset) as usize] == code {
            pos.offset += 1;
            true
        } else {
            false
        }
    }

    /// Extend every position in `from` by every base `symbol` stands for.
    ///
    /// Reached positions are appended to `into`; the OR of their masks is returned.
    pub fn advance_symbol(
        &self,
        from: &[TreePosition],
        symbol: IupacSymbol,
        into: &mut Vec<TreePosition>,
    ) -> OccurrenceMask {
        let mut mask = 0;
        for &start in from {
            for code in symbol.base_codes() {
                let mut pos = start;
                if self.advance(&mut pos, code) {
                    mask |= self.position_mask(pos);
                    into.push(pos);
                }
            }
        }
        mask
    }

    /// All start offsets of `pattern` in the text, ascending.
    pub fn match_pattern(&self, pattern: &[u8]) -> Result<Vec<usize>> {
        let mut pos = self.root();
        for (i, &byte) in pattern.iter().enumerate() {
            let code = encode(byte).ok_or_else(|| MotifError::invalid_byte(byte, i))?;
            if !self.advance(&mut pos, code) {
                return Ok(Vec::new());
            }
        }
        let mut starts = Vec::new();
        self.occurrences(pos, &mut starts);
        starts.sort_unstable();
        Ok(starts)
    }

    /// Positions spelling any expansion of `motif`, with the union of their masks.
    pub fn match_iupac(&self, motif: &[IupacSymbol]) -> IupacMatch {
        let mut current = vec![self.root()];
        let mut next = Vec::new();
        let mut mask = self.position_mask(self.root());
        for &symbol in motif {
            next.clear();
            mask = self.advance_symbol(&current, symbol, &mut next);
            std::mem::swap(&mut current, &mut next);
            if current.is_empty() {
                return IupacMatch::default();
            }
        }
        IupacMatch {
            positions: current,
            mask,
        }
    }

    /// Append the suffix starts of every leaf below `pos` to `out`.
    pub fn occurrences(&self, pos: TreePosition, out: &mut Vec<usize>) {
        let mut stack = vec![pos.node];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.is_leaf() {
                out.push(node.suffix_index as usize);
            } else {
                stack.extend(self.children(id));
            }
        }
    }

    /// Position of the same path label with its first symbol removed.
    pub fn follow_suffix_link(&self, pos: TreePosition) -> TreePosition {
        if pos.node == ROOT {
            return pos;
        }
        let node = &self.nodes[pos.node as usize];
        let (start, mut from) = if node.parent == ROOT {
            (ROOT, node.begin + 1)
        } else {
            (self.nodes[node.parent as usize].suffix_link, node.begin)
        };
        let to = node.begin + pos.offset;

        let mut next = TreePosition {
            node: start,
            offset: self.nodes[start as usize].edge_len(),
        };
        while from < to {
            let child = self.nodes[next.node as usize].children[self.text[from as usize] as usize];
            let step = (to - from).min(self.nodes[child as usize].edge_len());
            next = TreePosition {
                node: child,
                offset: step,
            };
            from += step;
        }
        next
    }

    /// The text spelled from the root down to `pos`.
    pub fn path_label(&self, pos: TreePosition) -> Vec<u8> {
        let mut chain = Vec::new();
        let mut id = pos.node;
        while id != ROOT {
            chain.push(id);
            id = self.nodes[id as usize].parent;
        }
        let mut label = Vec::with_capacity(self.position_depth(pos));
        for &id in chain.iter().rev() {
            let node = &self.nodes[id as usize];
            let end = if id == pos.node {
                node.begin + pos.offset
            } else {
                node.end
            };
            label.extend(
                self.text[node.begin as usize..end as usize]
                    .iter()
                    .map(|&code| SYMBOLS[code as usize]),
            );
        }
        label
    }

    /// Maximal exact matches of at least `min_len` symbols between `query` and the text.
    pub fn find_mems(&self, query: &[u8], min_len: usize) -> Result<Vec<MaximalMatch>> {
        if min_len == 0 {
            return Err(MotifError::Configuration(
                "minimum match length must be positive".into(),
            ));
        }
        let query = query
            .iter()
            .enumerate()
            .map(|(i, &b)| encode(b).ok_or_else(|| MotifError::invalid_byte(b, i)))
            .collect::<Result<Vec<u8>>>()?;

        let mut matches = Vec::new();
        let mut pos = self.root();
        for j in 0..query.len() {
            let mut k = j + self.position_depth(pos);
            while k < query.len() && self.advance(&mut pos, query[k]) {
                k += 1;
            }
            if self.position_depth(pos) >= min_len {
                self.report_mems(&query, j, min_len, pos, &mut matches);
            }
            pos = self.follow_suffix_link(pos);
        }
        Ok(matches)
    }

    fn report_mems(
        &self,
        query: &[u8],
        j: usize,
        min_len: usize,
        pos: TreePosition,
        out: &mut Vec<MaximalMatch>,
    ) {
        let left_maximal = |i: usize| j == 0 || i == 0 || query[j - 1] != self.text[i - 1];
        let mut leaves = Vec::new();

        self.occurrences(pos, &mut leaves);
        let len = self.position_depth(pos);
        out.extend(
            leaves
                .iter()
                .filter(|&&i| left_maximal(i))
                .map(|&i| MaximalMatch {
                    text_pos: i,
                    query_pos: j,
                    len,
                }),
        );

        // Shorter matches branch off the matched path at its ancestors.
        let mut below = pos.node;
        let mut ancestor = self.nodes[below as usize].parent;
        while ancestor != NIL && self.node_depth(ancestor) >= min_len {
            let len = self.node_depth(ancestor);
            for child in self.children(ancestor).filter(|&c| c != below) {
                leaves.clear();
                self.occurrences(
                    TreePosition {
                        node: child,
                        offset: 0,
                    },
                    &mut leaves,
                );
                out.extend(
                    leaves
                        .iter()
                        .filter(|&&i| left_maximal(i))
                        .map(|&i| MaximalMatch {
                            text_pos: i,
                            query_pos: j,
                            len,
                        }),
                );
            }
            below = ancestor;
            ancestor = self.nodes[ancestor as usize].parent;
        }
    }
}
