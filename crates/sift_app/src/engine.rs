use anyhow::{Context, Result};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use sift_core::carver::merge_warnings;
use sift_core::{
    BlockSource, Carver, CoreError, EmitError, Extracted, ScanConfig, ScanReport, ScanWarning,
    SignatureTable, StoragePolicy,
};
use sift_io::{DirectorySink, Reader, StoredArtifact, STDIN_PATH};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::extraction::{Extraction, ExtractionPool};

/// Everything one run needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub table: SignatureTable,
    pub config: ScanConfig,
    /// Extraction threads; `1` extracts inline.
    pub jobs: usize,
    pub custody: bool,
    pub show_progress: bool,
}

impl ScanJob {
    fn is_stdin(&self) -> bool {
        self.source == Path::new(STDIN_PATH)
    }

    fn source_label(&self) -> String {
        if self.is_stdin() {
            "<stdin>".to_string()
        } else {
            self.source.display().to_string()
        }
    }
}

pub struct ScanOutcome {
    pub report: ScanReport<StoredArtifact>,
    pub elapsed: Duration,
}

pub fn run_scan(job: &ScanJob, running: Arc<AtomicBool>) -> Result<ScanOutcome> {
    let start_time = Instant::now();

    let mut reader = Reader::open_or_stdin(&job.source)
        .with_context(|| format!("Failed to open source: {}", job.source.display()))?;
    let source_size = reader.size();

    let mut sink = DirectorySink::new(&job.output)
        .with_context(|| format!("Failed to create output directory: {}", job.output.display()))?;
    if job.custody {
        sink = sink.with_custody(job.source_label());
    }

    info!(
        source = %job.source_label(),
        size = %format_size(source_size, BINARY),
        mmap = reader.is_mmap(),
        "opened source"
    );

    let pb = progress_bar(source_size, job.show_progress);
    let pb_carver = pb.clone();
    let carver = Carver::new(job.table.clone(), job.config.clone())
        .context("Invalid scan configuration")?
        .with_running(running)
        .with_progress(move |pos| pb_carver.set_position(pos));

    let parallel = job.jobs > 1 && !job.is_stdin();
    if job.jobs > 1 && !parallel {
        warn!("parallel extraction needs a file source; extracting inline");
    }

    let result = if parallel {
        scan_parallel(&carver, &mut reader, job, Arc::new(sink))
    } else {
        carver.scan(&mut reader, &sink).map_err(anyhow::Error::from)
    };
    pb.finish_and_clear();

    let report = result.context("Scan failed")?;
    Ok(ScanOutcome {
        report,
        elapsed: start_time.elapsed(),
    })
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:50.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}

/// Collects extraction results and applies the storage policy.
struct Collector {
    policy: StoragePolicy,
    extracted: Vec<Extracted<StoredArtifact>>,
    failures: Vec<ScanWarning>,
}

impl Collector {
    fn accept(&mut self, extraction: Extraction) -> sift_core::Result<()> {
        let Extraction { artifact, outcome } = extraction;
        match outcome {
            Ok(handle) => {
                self.extracted.push(Extracted::new(&artifact, handle));
                Ok(())
            }
            Err(EmitError::Read(e)) => Err(e),
            Err(EmitError::Storage(e)) if self.policy == StoragePolicy::Abort => {
                Err(CoreError::Storage(e))
            }
            Err(EmitError::Storage(e)) => {
                warn!(name = %artifact.file_name(), error = %e, "artifact not stored");
                self.failures.push(ScanWarning::StorageFailed {
                    tag: artifact.tag().to_string(),
                    offset: artifact.start(),
                    name: artifact.file_name(),
                    error: e.to_string(),
                });
                Ok(())
            }
        }
    }
}

/// Resolution stays on this thread; only the copying fans out.
fn scan_parallel(
    carver: &Carver,
    reader: &mut Reader,
    job: &ScanJob,
    sink: Arc<DirectorySink>,
) -> Result<ScanReport<StoredArtifact>> {
    let pool = ExtractionPool::spawn(job.jobs, &job.source, sink)?;
    info!(workers = job.jobs, "parallel extraction enabled");

    let mut collector = Collector {
        policy: job.config.storage_policy,
        extracted: Vec::new(),
        failures: Vec::new(),
    };

    let outcome = carver.carve(reader, |_, artifact| {
        for extraction in pool.drain() {
            collector.accept(extraction)?;
        }
        if pool.submit(artifact) {
            Ok(())
        } else {
            Err(CoreError::Io(std::io::Error::other(
                "extraction workers exited early",
            )))
        }
    });
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            pool.cancel();
            return Err(e.into());
        }
    };

    for extraction in pool.finish() {
        collector.accept(extraction)?;
    }

    let Collector {
        mut extracted,
        failures,
        ..
    } = collector;
    extracted.sort_by_key(|e| e.start);

    Ok(ScanReport {
        extracted,
        warnings: merge_warnings(outcome.warnings, failures),
        bytes_scanned: outcome.bytes_scanned,
        interrupted: outcome.interrupted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use tempfile::NamedTempFile;

    fn create_image() -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..20u8 {
            data.extend_from_slice(&[0x00; 100]);
            data.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0, i]);
            data.extend_from_slice(&[0x10; 50]);
            data.extend_from_slice(&[0xFF, 0xD9]);
        }
        data.extend_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x00]);
        data
    }

    fn job(source: &Path, output: &Path, jobs: usize) -> ScanJob {
        ScanJob {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            table: SignatureTable::default(),
            config: ScanConfig::default().with_chunk_size(256),
            jobs,
            custody: true,
            show_progress: false,
        }
    }

    fn temp_source(data: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(data).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    fn listing(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| !p.to_string_lossy().ends_with(".custody.json"))
            .map(|p| {
                let name = p.file_name().unwrap().to_string_lossy().into_owned();
                (name, fs::read(&p).unwrap())
            })
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn test_scan_with_embedded_jpegs() {
        let source = temp_source(&create_image());
        let out = tempfile::tempdir().unwrap();
        let running = Arc::new(AtomicBool::new(true));

        let outcome = run_scan(&job(source.path(), out.path(), 1), running).unwrap();
        let report = outcome.report;

        assert_eq!(report.extracted.len(), 20);
        assert_eq!(report.extracted[0].name, "image_100.jpg");
        assert_eq!(report.extracted[1].start, 257);
        assert_eq!(report.warnings.len(), 1);
        assert!(!report.interrupted);
        assert_eq!(listing(out.path()).len(), 20);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let source = temp_source(&create_image());
        let seq_out = tempfile::tempdir().unwrap();
        let par_out = tempfile::tempdir().unwrap();

        let seq = run_scan(
            &job(source.path(), seq_out.path(), 1),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap()
        .report;
        let par = run_scan(
            &job(source.path(), par_out.path(), 4),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap()
        .report;

        let names = |r: &ScanReport<StoredArtifact>| {
            r.names().map(|(n, _)| n.to_string()).collect::<Vec<_>>()
        };
        assert_eq!(names(&seq), names(&par));
        assert_eq!(seq.warnings, par.warnings);
        assert_eq!(listing(seq_out.path()), listing(par_out.path()));
        for (a, b) in seq.extracted.iter().zip(&par.extracted) {
            assert_eq!(a.handle.sha256, b.handle.sha256);
        }
    }

    #[test]
    fn test_scan_empty_file() {
        let source = NamedTempFile::new().unwrap();
        let out = tempfile::tempdir().unwrap();
        let outcome = run_scan(
            &job(source.path(), out.path(), 1),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();
        assert!(outcome.report.extracted.is_empty());
        assert_eq!(outcome.report.bytes_scanned, 0);
    }

    #[test]
    fn test_cancelled_scan_is_marked_interrupted() {
        let source = temp_source(&create_image());
        let out = tempfile::tempdir().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        running.store(false, Ordering::SeqCst);

        let report = run_scan(&job(source.path(), out.path(), 2), running)
            .unwrap()
            .report;
        assert!(report.interrupted);
        assert!(report.extracted.is_empty());
    }

    #[test]
    fn test_abort_policy_stops_on_existing_file() {
        let source = temp_source(&create_image());
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("image_100.jpg"), b"taken").unwrap();

        let mut strict = job(source.path(), out.path(), 1);
        strict.config = strict.config.with_storage_policy(StoragePolicy::Abort);
        assert!(run_scan(&strict, Arc::new(AtomicBool::new(true))).is_err());

        let lenient = job(source.path(), out.path(), 3);
        let report = run_scan(&lenient, Arc::new(AtomicBool::new(true)))
            .unwrap()
            .report;
        assert_eq!(report.extracted.len(), 19);
        assert!(matches!(
            report.warnings[0],
            ScanWarning::StorageFailed { offset: 100, .. }
        ));
    }

    #[test]
    fn test_parallel_abort_policy_fails_the_scan() {
        let source = temp_source(&create_image());
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("image_100.jpg"), b"taken").unwrap();

        let mut strict = job(source.path(), out.path(), 3);
        strict.config = strict.config.with_storage_policy(StoragePolicy::Abort);
        assert!(run_scan(&strict, Arc::new(AtomicBool::new(true))).is_err());
        assert_eq!(fs::read(out.path().join("image_100.jpg")).unwrap(), b"taken");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let result = run_scan(
            &job(&out.path().join("absent.img"), out.path(), 1),
            Arc::new(AtomicBool::new(true)),
        );
        assert!(result.is_err());
    }
}
