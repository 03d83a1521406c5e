//! Motif record writers.
//!
//! Binary records are laid out as
//!
//! ```text
//! u8 length | [group id, packed] | motif, packed | u16 LE count per threshold
//! ```
//!
//! with symbols packed as 4-bit IUPAC masks, high nibble first, into
//! `max_len / 2` bytes. Text records are tab separated, one per line.

use std::io::Write;
use std::str::FromStr;

use crate::aggregate::CompactMotifAggregator;
use crate::config::DiscoveryConfig;
use crate::error::{MotifError, Result};
use crate::iupac::{motif_to_string, IupacSymbol};
use crate::motif::{group_id, pack_symbols};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum OutputFormat {
    #[default]
    Text,
    Binary,
}

impl FromStr for OutputFormat {
    type Err = MotifError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "binary" => Ok(Self::Binary),
            other => Err(MotifError::Configuration(format!(
                "unknown output format '{other}' (expected text or binary)"
            ))),
        }
    }
}

/// Serializes motif records in one fixed format.
pub struct MotifWriter<W: Write> {
    out: W,
    format: OutputFormat,
    group_ids: bool,
    packed_width: usize,
    threshold_count: usize,
    records: u64,
    scratch: Vec<u8>,
}

impl<W: Write> MotifWriter<W> {
    pub fn new(
        out: W,
        format: OutputFormat,
        group_ids: bool,
        max_len: usize,
        threshold_count: usize,
    ) -> Self {
        Self {
            out,
            format,
            group_ids,
            packed_width: max_len / 2,
            threshold_count,
            records: 0,
            scratch: Vec::new(),
        }
    }

    /// Write a motif found in one family, satisfying the first `satisfied` thresholds.
    pub fn write_satisfied(&mut self, motif: &[IupacSymbol], satisfied: u8) -> Result<()> {
        match self.format {
            OutputFormat::Binary => {
                let satisfied = usize::from(satisfied);
                let counts = (0..self.threshold_count).map(|i| u16::from(i < satisfied));
                self.write_binary(motif, counts)
            }
            OutputFormat::Text => {
                self.write_text_prefix(motif)?;
                writeln!(self.out, "{satisfied}")?;
                self.records += 1;
                Ok(())
            }
        }
    }

    /// Write a motif with its per-threshold family counts.
    pub fn write_counts(&mut self, motif: &[IupacSymbol], counts: &[u16]) -> Result<()> {
        match self.format {
            OutputFormat::Binary => self.write_binary(motif, counts.iter().copied()),
            OutputFormat::Text => {
                self.write_text_prefix(motif)?;
                let joined = counts
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                writeln!(self.out, "{joined}")?;
                self.records += 1;
                Ok(())
            }
        }
    }

    fn write_text_prefix(&mut self, motif: &[IupacSymbol]) -> Result<()> {
        if self.group_ids {
            write!(self.out, "{}\t", motif_to_string(&group_id(motif)))?;
        }
        write!(self.out, "{}\t", motif_to_string(motif))?;
        Ok(())
    }

    fn write_binary(
        &mut self,
        motif: &[IupacSymbol],
        counts: impl Iterator<Item = u16>,
    ) -> Result<()> {
        self.scratch.clear();
        self.scratch.push(motif.len() as u8);
        if self.group_ids {
            pack_symbols(&group_id(motif), self.packed_width, &mut self.scratch);
        }
        pack_symbols(motif, self.packed_width, &mut self.scratch);
        for count in counts {
            self.scratch.extend_from_slice(&count.to_le_bytes());
        }
        self.out.write_all(&self.scratch)?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Where enumerated motifs go, fixed for the whole run.
pub enum MotifSink<W: Write> {
    /// Each family's motifs are written as soon as they are found.
    Direct(MotifWriter<W>),
    /// Counts are summed across families and written once by [`MotifSink::finish`].
    Aggregate {
        aggregator: CompactMotifAggregator,
        writer: MotifWriter<W>,
    },
}

impl<W: Write> MotifSink<W> {
    pub fn new(config: &DiscoveryConfig, out: W) -> Self {
        let writer = MotifWriter::new(
            out,
            config.output,
            config.group_ids,
            config.max_len,
            config.thresholds.len(),
        );
        if config.aggregate {
            Self::Aggregate {
                aggregator: CompactMotifAggregator::new(config.max_len, config.thresholds.len()),
                writer,
            }
        } else {
            Self::Direct(writer)
        }
    }

    pub fn record(&mut self, motif: &[IupacSymbol], satisfied: u8) -> Result<()> {
        match self {
            Self::Direct(writer) => writer.write_satisfied(motif, satisfied),
            Self::Aggregate { aggregator, .. } => aggregator.add_occurrence(motif, satisfied),
        }
    }

    /// Flush pending output and return the writer with the number of records written.
    pub fn finish(self) -> Result<(W, u64)> {
        let writer = match self {
            Self::Direct(writer) => writer,
            Self::Aggregate {
                aggregator,
                mut writer,
            } => {
                let unique = aggregator.flush(&mut writer)?;
                log::info!("Wrote {} aggregated motifs", unique);
                writer
            }
        };
        let records = writer.records();
        Ok((writer.into_inner()?, records))
    }
}
