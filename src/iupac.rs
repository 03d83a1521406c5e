//! IUPAC nucleotide symbols and the alphabets motifs are enumerated over.
//!
//! A symbol is stored as its 4-bit base mask (A=1, C=2, G=4, T=8), so the
//! expansion of a degenerate symbol is simply the set bits of its mask and the
//! complement is the mask with its four bits reversed.

use std::fmt;
use std::str::FromStr;

use crate::error::{MotifError, Result};

/// Printable representation indexed by mask.
const MASK_TO_CHAR: [u8; 16] = *b"-ACMGRSVTWYHKDBN";

/// A single IUPAC nucleotide code (never the empty mask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IupacSymbol(u8);

impl IupacSymbol {
    pub const A: Self = Self(0b0001);
    pub const C: Self = Self(0b0010);
    pub const M: Self = Self(0b0011);
    pub const G: Self = Self(0b0100);
    pub const R: Self = Self(0b0101);
    pub const S: Self = Self(0b0110);
    pub const V: Self = Self(0b0111);
    pub const T: Self = Self(0b1000);
    pub const W: Self = Self(0b1001);
    pub const Y: Self = Self(0b1010);
    pub const H: Self = Self(0b1011);
    pub const K: Self = Self(0b1100);
    pub const D: Self = Self(0b1101);
    pub const B: Self = Self(0b1110);
    pub const N: Self = Self(0b1111);

    /// Number of distinct symbols.
    pub const COUNT: usize = 15;

    /// All symbols in alphabetical order of their letters.
    pub const ALPHABETICAL: [Self; Self::COUNT] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::G,
        Self::H,
        Self::K,
        Self::M,
        Self::N,
        Self::R,
        Self::S,
        Self::T,
        Self::V,
        Self::W,
        Self::Y,
    ];

    pub fn from_mask(mask: u8) -> Option<Self> {
        (1..=15).contains(&mask).then_some(Self(mask))
    }

    /// Parse an upper- or lower-case IUPAC letter.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let upper = byte.to_ascii_uppercase();
        MASK_TO_CHAR
            .iter()
            .skip(1)
            .position(|&c| c == upper)
            .map(|idx| Self(idx as u8 + 1))
    }

    #[inline]
    pub fn mask(self) -> u8 {
        self.0
    }

    /// Dense index in `0..COUNT`, used to address per-symbol tables.
    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        MASK_TO_CHAR[usize::from(self.0)]
    }

    /// True when the symbol stands for more than one base.
    #[inline]
    pub fn is_degenerate(self) -> bool {
        self.0.count_ones() > 1
    }

    #[inline]
    pub fn complement(self) -> Self {
        let m = self.0;
        Self(
            ((m & 0b0001) << 3) | ((m & 0b0010) << 1) | ((m & 0b0100) >> 1) | ((m & 0b1000) >> 3),
        )
    }

    /// Base codes (A=0, C=1, G=2, T=3) this symbol expands to.
    pub fn base_codes(self) -> impl Iterator<Item = u8> {
        let mask = self.0;
        (0..4u8).filter(move |bit| mask & (1 << bit) != 0)
    }
}

impl fmt::Display for IupacSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(self.to_byte()))
    }
}

/// Symbol sets a motif may be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alphabet {
    /// A, C, G, T.
    #[default]
    Exact,
    /// Exact bases plus N.
    ExactAndN,
    /// Exact bases, N and the twofold degenerate codes.
    ExactTwofoldsAndN,
    /// Every IUPAC code.
    All,
}

const EXACT: [IupacSymbol; 4] = [IupacSymbol::A, IupacSymbol::C, IupacSymbol::G, IupacSymbol::T];
const EXACT_AND_N: [IupacSymbol; 5] = [
    IupacSymbol::A,
    IupacSymbol::C,
    IupacSymbol::G,
    IupacSymbol::T,
    IupacSymbol::N,
];
const EXACT_TWOFOLDS_AND_N: [IupacSymbol; 11] = [
    IupacSymbol::A,
    IupacSymbol::C,
    IupacSymbol::G,
    IupacSymbol::T,
    IupacSymbol::N,
    IupacSymbol::R,
    IupacSymbol::Y,
    IupacSymbol::S,
    IupacSymbol::W,
    IupacSymbol::K,
    IupacSymbol::M,
];
const ALL: [IupacSymbol; 15] = [
    IupacSymbol::A,
    IupacSymbol::C,
    IupacSymbol::G,
    IupacSymbol::T,
    IupacSymbol::N,
    IupacSymbol::R,
    IupacSymbol::Y,
    IupacSymbol::S,
    IupacSymbol::W,
    IupacSymbol::K,
    IupacSymbol::M,
    IupacSymbol::B,
    IupacSymbol::D,
    IupacSymbol::H,
    IupacSymbol::V,
];

impl Alphabet {
    /// Symbols tried, in order, when extending a motif.
    pub fn symbols(self) -> &'static [IupacSymbol] {
        match self {
            Self::Exact => &EXACT,
            Self::ExactAndN => &EXACT_AND_N,
            Self::ExactTwofoldsAndN => &EXACT_TWOFOLDS_AND_N,
            Self::All => &ALL,
        }
    }

    pub fn allows_degenerate(self) -> bool {
        self != Self::Exact
    }
}

impl FromStr for Alphabet {
    type Err = MotifError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "exact" => Ok(Self::Exact),
            "1" | "exact-n" => Ok(Self::ExactAndN),
            "2" | "twofold-n" => Ok(Self::ExactTwofoldsAndN),
            "3" | "all" => Ok(Self::All),
            other => Err(MotifError::Configuration(format!(
                "unknown alphabet '{other}' (expected exact, exact-n, twofold-n or all)"
            ))),
        }
    }
}

/// Parse a motif string into symbols, rejecting anything that is not an IUPAC letter.
pub fn parse_motif(text: &str) -> Result<Vec<IupacSymbol>> {
    text.bytes()
        .enumerate()
        .map(|(offset, byte)| {
            IupacSymbol::from_byte(byte).ok_or_else(|| MotifError::invalid_byte(byte, offset))
        })
        .collect()
}

/// Render symbols as their IUPAC letters.
pub fn motif_to_string(motif: &[IupacSymbol]) -> String {
    motif.iter().map(|s| char::from(s.to_byte())).collect()
}
