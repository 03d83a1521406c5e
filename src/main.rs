use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use flate2::read::MultiGzDecoder;

use conserved_motifs::pipeline::read_motifs;
use conserved_motifs::{
    Alphabet, DiscoveryConfig, MatchingMode, MotifDiscovery, MotifLocator, OutputFormat,
    RecordReader, RunReport,
};

/// Discover phylogenetically conserved DNA motifs in orthologous gene families
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gene family file ('-' for stdin, .gz accepted)
    input: String,

    /// Matching mode: AB (alignment based) or AF (alignment free)
    #[arg(long, default_value = "AF")]
    mode: MatchingMode,

    /// Motif alphabet: exact, exact-n, twofold-n, all (or 0-3)
    #[arg(long, default_value = "exact")]
    alphabet: Alphabet,

    /// Comma separated ascending BLS thresholds
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [0.15, 0.5, 0.6, 0.7, 0.9, 0.95]
    )]
    thresholds: Vec<f64>,

    /// Maximum number of degenerate symbols per motif
    #[arg(long, default_value_t = 0)]
    degeneration: usize,

    /// Minimum motif length (inclusive)
    #[arg(long, default_value_t = 6)]
    min_len: usize,

    /// Maximum motif length (exclusive)
    #[arg(long, default_value_t = 13)]
    max_len: usize,

    /// Sum counts over all families and write each motif once at the end
    #[arg(long)]
    aggregate: bool,

    /// Output record format: text or binary
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Prefix motifs with their base-composition group
    #[arg(long)]
    group_ids: bool,

    /// Output path (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// Report the occurrences of the motifs listed in this file instead of discovering motifs
    #[arg(long)]
    locate: Option<String>,

    /// Optional JSON file for per-family statistics
    #[arg(long)]
    stats_json: Option<String>,

    /// Verbose/info output (default: quiet)
    #[arg(long, short = 'v', alias = "info")]
    verbose: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,

    /// Trace output
    #[arg(long)]
    trace: bool,
}

impl Args {
    fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            mode: self.mode,
            alphabet: self.alphabet,
            thresholds: self.thresholds.clone(),
            max_degenerate: self.degeneration,
            min_len: self.min_len,
            max_len: self.max_len,
            aggregate: self.aggregate,
            output: self.format,
            group_ids: self.group_ids,
        }
    }
}

fn main() {
    let args = Args::parse();
    let log_level = if args.trace {
        log::LevelFilter::Trace
    } else if args.debug {
        log::LevelFilter::Debug
    } else if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Error
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Err(error) = run(&args) {
        eprintln!("Motif discovery failed: {error:?}");
        std::process::exit(1);
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("bgz"))
        .unwrap_or(false)
}

fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if is_gzip(path) {
        let decoder = MultiGzDecoder::new(file);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn open_input(input: &str) -> Result<Box<dyn BufRead>> {
    if input == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        open_reader(Path::new(input))
    }
}

fn create_file(path: &str) -> Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    File::create(path).with_context(|| format!("Failed to create {path}"))
}

fn open_output(output: Option<&str>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => Ok(Box::new(BufWriter::new(create_file(path)?))),
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn write_report(path: &str, report: &RunReport) -> Result<()> {
    let mut file = create_file(path)?;
    writeln!(file, "{}", serde_json::to_string_pretty(report)?)?;
    info!("Statistics written to {}", path);
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = args.discovery_config();
    info!(
        "{:?} discovery, alphabet {:?}, lengths [{}, {}), thresholds {:?}",
        config.mode, config.alphabet, config.min_len, config.max_len, config.thresholds
    );
    let input = open_input(&args.input)?;
    let mut corpus = RecordReader::new(input);
    let out = open_output(args.output.as_deref())?;

    if let Some(motif_path) = &args.locate {
        let motifs = read_motifs(open_reader(Path::new(motif_path))?)
            .with_context(|| format!("Failed to read motifs from {motif_path}"))?;
        info!("Locating {} motifs", motifs.len());
        let mut locator = MotifLocator::new(motifs, config.thresholds.clone(), out);
        let located = locator
            .run(&mut corpus)
            .with_context(|| format!("Failed to locate motifs in {}", args.input))?;
        locator.into_inner()?;
        info!("{} occurrences located", located);
        return Ok(());
    }

    let mut discovery = MotifDiscovery::new(config, out)?;
    discovery
        .run(&mut corpus)
        .with_context(|| format!("Failed to process gene families from {}", args.input))?;
    let (_, report) = discovery.finish()?;
    info!(
        "{} motif records written for {} families",
        report.records_written,
        report.families.len()
    );
    if let Some(path) = &args.stats_json {
        write_report(path, &report)?;
    }
    Ok(())
}

#[cfg(test)]
mod smoke {
    use super::*;

    const FAMILY: &str = "FAM1\n(A:0.5,B:0.5);\n2\na1\tA\nACGTTT\nb1\tB\nTTACGT\n";

    #[test]
    fn smoke_run() {
        let input = tempfile::NamedTempFile::new().expect("tmpfile");
        write!(input.as_file(), "{FAMILY}").unwrap();
        let dir = tempfile::tempdir().expect("tmpdir");
        let output = dir.path().join("motifs.txt");
        let stats = dir.path().join("stats").join("run.json");

        let args = Args::parse_from([
            "conserved-motifs",
            input.path().to_str().unwrap(),
            "--min-len",
            "4",
            "--max-len",
            "5",
            "--thresholds",
            "0.5",
            "--output",
            output.to_str().unwrap(),
            "--stats-json",
            stats.to_str().unwrap(),
        ]);
        run(&args).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "ACGT\t1\n");
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&stats).unwrap()).unwrap();
        assert_eq!(report["families"][0]["name"], "FAM1");
        assert_eq!(report["records_written"], 1);
    }

    #[test]
    fn gzip_input_and_locate_mode() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().expect("tmpdir");
        let input = dir.path().join("families.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&input).unwrap(), Compression::default());
        encoder.write_all(FAMILY.as_bytes()).unwrap();
        encoder.finish().unwrap();
        let motifs = dir.path().join("motifs.txt");
        std::fs::write(&motifs, "ACGT\n").unwrap();
        let output = dir.path().join("located.tsv");

        let args = Args::parse_from([
            "conserved-motifs",
            input.to_str().unwrap(),
            "--locate",
            motifs.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ]);
        run(&args).unwrap();

        let located = std::fs::read_to_string(&output).unwrap();
        assert_eq!(located.lines().count(), 4);
        assert!(located.starts_with("FAM1\tACGT\ta1\t+\t0\t"));
    }

    #[test]
    fn bad_species_fails() {
        let input = tempfile::NamedTempFile::new().expect("tmpfile");
        write!(input.as_file(), "FAM1\n(A:0.5,B:0.5);\n1\nz1\tZ\nACGT\n").unwrap();
        let args = Args::parse_from(["conserved-motifs", input.path().to_str().unwrap()]);
        let error = run(&args).unwrap_err();
        assert!(format!("{error:?}").contains("Species 'Z'"));
    }
}
