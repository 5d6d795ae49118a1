//! Sift - signature carver for disk images
//!
//! Scans a raw image (or piped input) for JPEG, PNG and GIF signatures and
//! writes each carved artifact into an output directory.

mod engine;
mod extraction;
mod logging;
mod report;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use engine::ScanJob;
use logging::Verbosity;
use sift_core::{ScanConfig, SignatureTable, StoragePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnStorageError {
    /// Record a warning and keep scanning
    Skip,
    /// Stop the scan
    Abort,
}

impl From<OnStorageError> for StoragePolicy {
    fn from(value: OnStorageError) -> Self {
        match value {
            OnStorageError::Skip => StoragePolicy::Skip,
            OnStorageError::Abort => StoragePolicy::Abort,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Disk image or device to scan, or `-` for standard input
    source: PathBuf,

    #[arg(short, long, default_value = "./recovered")]
    output: PathBuf,

    /// Bytes read per window (accepts K, M, G suffixes)
    #[arg(long, value_parser = parse_size, default_value = "1M")]
    chunk_size: u64,

    /// Give up on a candidate whose end marker is further than this
    #[arg(long, value_parser = parse_size)]
    max_size: Option<u64>,

    /// JSON signature table replacing the built-in formats
    #[arg(long)]
    signatures: Option<PathBuf>,

    /// Only carve these format tags
    #[arg(long, value_delimiter = ',')]
    formats: Vec<String>,

    /// Extraction threads; 0 uses every CPU
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    #[arg(long, value_enum, default_value_t = OnStorageError::Skip)]
    on_storage_error: OnStorageError,

    /// Write a JSON manifest of the scan
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Do not write `.custody.json` sidecars
    #[arg(long, default_value_t = false)]
    no_custody: bool,

    #[arg(short, long, default_value_t = false, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.verbose, args.quiet);
    logging::init(verbosity)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let job = build_job(&args, verbosity)?;
    let outcome = engine::run_scan(&job, running)?;

    if outcome.report.interrupted {
        info!("scan interrupted, partial results kept");
    }
    if let Some(path) = &args.manifest {
        report::write_manifest(
            path,
            &args.source.display().to_string(),
            &job.output,
            &outcome.report,
        )?;
        info!(path = %path.display(), "manifest written");
    }
    if verbosity != Verbosity::Quiet {
        report::print_summary(&outcome.report, outcome.elapsed, &job.output);
    }

    Ok(())
}

fn build_job(args: &Args, verbosity: Verbosity) -> Result<ScanJob> {
    let mut table = match &args.signatures {
        Some(path) => SignatureTable::load(path)
            .with_context(|| format!("Failed to load signatures: {}", path.display()))?,
        None => SignatureTable::default(),
    };
    if !args.formats.is_empty() {
        table = table
            .retain_tags(&args.formats)
            .context("Invalid --formats")?;
    }

    let chunk_size =
        usize::try_from(args.chunk_size).context("--chunk-size does not fit in memory")?;
    let config = ScanConfig::default()
        .with_chunk_size(chunk_size)
        .with_max_carve_size(args.max_size)
        .with_storage_policy(args.on_storage_error.into());
    config.validate(&table)?;

    let jobs = match args.jobs {
        0 => num_cpus::get(),
        n => n,
    };

    Ok(ScanJob {
        source: args.source.clone(),
        output: args.output.clone(),
        table,
        config,
        jobs,
        custody: !args.no_custody,
        show_progress: verbosity != Verbosity::Quiet,
    })
}

/// Parses `4096`, `64K`, `1M`, `2G` (binary multiples).
fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let (digits, shift) = match text.char_indices().last() {
        Some((i, 'k' | 'K')) => (&text[..i], 10),
        Some((i, 'm' | 'M')) => (&text[..i], 20),
        Some((i, 'g' | 'G')) => (&text[..i], 30),
        Some(_) => (text, 0),
        None => bail!("empty size"),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid size: {text}"))?;
    value
        .checked_mul(1u64 << shift)
        .with_context(|| format!("size too large: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::DEFAULT_CHUNK_SIZE;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 << 30);
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("12X").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["sift", "disk.img"]).unwrap();
        let job = build_job(&args, Verbosity::Normal).unwrap();
        assert_eq!(job.config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(job.config.max_carve_size, None);
        assert_eq!(job.config.storage_policy, StoragePolicy::Skip);
        assert_eq!(job.table.len(), 3);
        assert_eq!(job.jobs, 1);
        assert!(job.custody);
        assert_eq!(job.output, PathBuf::from("./recovered"));
    }

    #[test]
    fn test_format_filter_and_options() {
        let args = Args::try_parse_from([
            "sift",
            "-",
            "-o",
            "out",
            "--formats",
            "jpeg,gif",
            "--chunk-size",
            "64K",
            "--max-size",
            "8M",
            "--on-storage-error",
            "abort",
            "--no-custody",
            "-j",
            "0",
        ])
        .unwrap();
        let job = build_job(&args, Verbosity::Quiet).unwrap();

        let tags: Vec<_> = job.table.lookup().iter().map(|s| s.tag()).collect();
        assert_eq!(tags, vec!["JPEG", "GIF"]);
        assert_eq!(job.config.chunk_size, 64 * 1024);
        assert_eq!(job.config.max_carve_size, Some(8 << 20));
        assert_eq!(job.config.storage_policy, StoragePolicy::Abort);
        assert!(job.jobs >= 1);
        assert!(!job.custody);
        assert!(!job.show_progress);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let args = Args::try_parse_from(["sift", "disk.img", "--formats", "bmp"]).unwrap();
        assert!(build_job(&args, Verbosity::Normal).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["sift", "disk.img", "-v", "-q"]).is_err());
    }
}
