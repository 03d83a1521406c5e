use std::str::FromStr;

use serde::Serialize;

use crate::error::{MotifError, Result};
use crate::iupac::Alphabet;
use crate::output::OutputFormat;
use crate::phylo::validate_thresholds;

/// Longest motif window accepted; the binary record stores lengths in one byte.
pub const MAX_MOTIF_LEN: usize = 256;

/// How occurrences in different species are combined before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MatchingMode {
    /// Occurrences must sit in the same aligned column.
    AlignmentBased,
    /// Any occurrence anywhere in a species' genes counts.
    #[default]
    AlignmentFree,
}

impl FromStr for MatchingMode {
    type Err = MotifError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AB" => Ok(Self::AlignmentBased),
            "AF" => Ok(Self::AlignmentFree),
            other => Err(MotifError::Configuration(format!(
                "unknown matching mode '{other}' (expected AB or AF)"
            ))),
        }
    }
}

/// Settings for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub mode: MatchingMode,
    /// Symbols a motif may use.
    pub alphabet: Alphabet,
    /// Ascending BLS thresholds; the emitted count is how many are exceeded.
    pub thresholds: Vec<f64>,
    /// Maximum number of degenerate symbols in one motif.
    pub max_degenerate: usize,
    /// Shortest motif emitted (inclusive).
    pub min_len: usize,
    /// Motif length bound (exclusive).
    pub max_len: usize,
    /// Accumulate counts across families and write them once at the end.
    pub aggregate: bool,
    pub output: OutputFormat,
    /// Prefix each motif with its base-composition group and pick strands by group.
    pub group_ids: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: MatchingMode::AlignmentFree,
            alphabet: Alphabet::Exact,
            thresholds: vec![0.15, 0.5, 0.6, 0.7, 0.9, 0.95],
            max_degenerate: 0,
            min_len: 6,
            max_len: 13,
            aggregate: false,
            output: OutputFormat::Text,
            group_ids: false,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_len == 0 {
            return Err(MotifError::Configuration(
                "minimum motif length must be at least 1".into(),
            ));
        }
        if self.min_len >= self.max_len {
            return Err(MotifError::Configuration(format!(
                "length window [{}, {}) is empty",
                self.min_len, self.max_len
            )));
        }
        if self.max_len > MAX_MOTIF_LEN {
            return Err(MotifError::Configuration(format!(
                "maximum motif length {} exceeds {MAX_MOTIF_LEN}",
                self.max_len
            )));
        }
        if self.max_degenerate > 0 && !self.alphabet.allows_degenerate() {
            return Err(MotifError::Configuration(format!(
                "{} degenerate symbols requested with the exact alphabet",
                self.max_degenerate
            )));
        }
        validate_thresholds(&self.thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        DiscoveryConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_windows_and_alphabets_are_rejected() {
        let cases = [
            DiscoveryConfig {
                min_len: 8,
                max_len: 8,
                ..DiscoveryConfig::default()
            },
            DiscoveryConfig {
                min_len: 0,
                ..DiscoveryConfig::default()
            },
            DiscoveryConfig {
                max_len: MAX_MOTIF_LEN + 1,
                ..DiscoveryConfig::default()
            },
            DiscoveryConfig {
                max_degenerate: 1,
                ..DiscoveryConfig::default()
            },
            DiscoveryConfig {
                thresholds: vec![0.9, 0.5],
                ..DiscoveryConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(MotifError::Configuration(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn degenerate_symbols_allowed_with_wider_alphabets() {
        let config = DiscoveryConfig {
            alphabet: Alphabet::ExactTwofoldsAndN,
            max_degenerate: 2,
            ..DiscoveryConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn matching_mode_parses() {
        assert_eq!("AB".parse::<MatchingMode>().unwrap(), MatchingMode::AlignmentBased);
        assert_eq!("af".parse::<MatchingMode>().unwrap(), MatchingMode::AlignmentFree);
        assert!("XY".parse::<MatchingMode>().is_err());
    }
}
