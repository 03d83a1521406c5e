//! Strand handling and canonical forms of IUPAC motifs.
//!
//! Motifs are compared by their printable letters, so "lexicographic" always
//! means ASCII order of the IUPAC codes.

use crate::iupac::IupacSymbol;

pub fn reverse_complement(motif: &[IupacSymbol]) -> Vec<IupacSymbol> {
    motif.iter().rev().map(|s| s.complement()).collect()
}

/// Base-composition class of a motif: its letters in sorted order.
pub fn group_id(motif: &[IupacSymbol]) -> Vec<IupacSymbol> {
    let mut group = motif.to_vec();
    group.sort_unstable_by_key(|s| s.to_byte());
    group
}

/// True when the motif is not lexicographically greater than its reverse complement.
///
/// Palindromic motifs are their own representative.
pub fn is_representative(motif: &[IupacSymbol]) -> bool {
    let n = motif.len();
    for i in 0..n {
        let forward = motif[i].to_byte();
        let reverse = motif[n - 1 - i].complement().to_byte();
        if forward != reverse {
            return forward < reverse;
        }
    }
    true
}

/// The lexicographically smaller of the motif and its reverse complement.
pub fn representative(motif: &[IupacSymbol]) -> Vec<IupacSymbol> {
    if is_representative(motif) {
        motif.to_vec()
    } else {
        reverse_complement(motif)
    }
}

/// True when the motif's composition class does not sort after that of its
/// reverse complement.
pub fn is_group_representative(motif: &[IupacSymbol]) -> bool {
    let own = group_id(motif);
    let other = group_id(&reverse_complement(motif));
    own.iter().map(|s| s.to_byte()).le(other.iter().map(|s| s.to_byte()))
}

/// Pack symbols four bits each, high nibble first, into exactly `width` bytes.
///
/// Positions past the end of the motif are zero.
pub fn pack_symbols(motif: &[IupacSymbol], width: usize, out: &mut Vec<u8>) {
    for byte_idx in 0..width {
        let hi = motif.get(byte_idx * 2).map_or(0, |s| s.mask());
        let lo = motif.get(byte_idx * 2 + 1).map_or(0, |s| s.mask());
        out.push((hi << 4) | lo);
    }
}
