//! Error type shared by every stage of motif discovery.

/// Errors raised while reading families, building indexes or emitting motifs.
#[derive(thiserror::Error, Debug)]
pub enum MotifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Malformed Newick tree: {0}")]
    MalformedTree(String),
    #[error("Species '{0}' is not a leaf of the family tree")]
    SpeciesNotFound(String),
    #[error("Invalid symbol {symbol:?} at offset {offset}")]
    InvalidSymbol { symbol: char, offset: usize },
    #[error("Capacity exceeded: {what} ({found} > {limit})")]
    CapacityExceeded {
        what: &'static str,
        found: usize,
        limit: usize,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Gene family '{family}' failed")]
    Family {
        family: String,
        #[source]
        source: Box<MotifError>,
    },
}

impl MotifError {
    /// Attach the family name to an error raised while processing that family.
    pub fn in_family(self, family: &str) -> Self {
        match self {
            Self::Family { .. } => self,
            other => Self::Family {
                family: family.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn invalid_byte(byte: u8, offset: usize) -> Self {
        Self::InvalidSymbol {
            symbol: char::from(byte),
            offset,
        }
    }
}

pub type Result<T> = std::result::Result<T, MotifError>;
