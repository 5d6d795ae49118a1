//! Extraction worker pool: resolved artifacts are copied out by several
//! threads, each holding its own reader on the source.

use anyhow::Context;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use sift_core::{Artifact, ArtifactEmitter, EmitError};
use sift_io::{DirectorySink, Reader, StoredArtifact};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

const EXTRACTION_QUEUE_SIZE: usize = 256;

/// Outcome of one extraction job.
#[derive(Debug)]
pub struct Extraction {
    pub artifact: Artifact,
    pub outcome: Result<StoredArtifact, EmitError>,
}

pub struct ExtractionPool {
    jobs_tx: Option<Sender<Artifact>>,
    results_rx: Receiver<Extraction>,
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl ExtractionPool {
    pub fn spawn(workers: usize, source: &Path, sink: Arc<DirectorySink>) -> anyhow::Result<Self> {
        let (jobs_tx, jobs_rx) = bounded::<Artifact>(EXTRACTION_QUEUE_SIZE);
        let (results_tx, results_rx) = unbounded::<Extraction>();
        let mut handles = Vec::with_capacity(workers);
        let stop = Arc::new(AtomicBool::new(false));

        for worker_id in 0..workers.max(1) {
            let reader = Reader::open(source).with_context(|| {
                format!("Failed to open {} for worker {worker_id}", source.display())
            })?;
            let rx = jobs_rx.clone();
            let tx = results_tx.clone();
            let sink = Arc::clone(&sink);
            let stop = Arc::clone(&stop);

            let handle = thread::Builder::new()
                .name(format!("extraction-{worker_id}"))
                .spawn(move || extraction_worker(reader, rx, tx, sink, stop))
                .context("Failed to spawn extraction worker")?;
            handles.push(handle);
        }

        debug!(workers = handles.len(), "extraction pool started");
        Ok(Self {
            jobs_tx: Some(jobs_tx),
            results_rx,
            handles,
            stop,
        })
    }

    /// Queues an artifact, blocking while the queue is full. Returns `false`
    /// once every worker has exited.
    pub fn submit(&self, artifact: Artifact) -> bool {
        match &self.jobs_tx {
            Some(tx) => tx.send(artifact).is_ok(),
            None => false,
        }
    }

    /// Results finished so far, without waiting.
    pub fn drain(&self) -> Vec<Extraction> {
        self.results_rx.try_iter().collect()
    }

    /// Makes the workers drop queued artifacts instead of writing them.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Closes the queue, waits for the workers, and returns the remaining
    /// results.
    pub fn finish(mut self) -> Vec<Extraction> {
        self.shutdown();
        self.results_rx.try_iter().collect()
    }

    fn shutdown(&mut self) {
        self.jobs_tx.take();
        for (i, handle) in std::mem::take(&mut self.handles).into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker = i, "extraction worker panicked");
            }
        }
    }
}

/// A pool dropped without `finish` belongs to a failed scan: queued
/// artifacts are discarded.
impl Drop for ExtractionPool {
    fn drop(&mut self) {
        self.cancel();
        self.shutdown();
    }
}

fn extraction_worker(
    mut reader: Reader,
    rx: Receiver<Artifact>,
    tx: Sender<Extraction>,
    sink: Arc<DirectorySink>,
    stop: Arc<AtomicBool>,
) {
    let mut emitter = ArtifactEmitter::default();

    for artifact in rx {
        if stop.load(Ordering::SeqCst) {
            debug!(name = %artifact.file_name(), "extraction cancelled");
            break;
        }
        let outcome = emitter.emit(&mut reader, &artifact, &*sink);
        if tx.send(Extraction { artifact, outcome }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_pool_extracts_every_submitted_artifact() {
        let data: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let mut source = NamedTempFile::new().unwrap();
        source.write_all(&data).unwrap();
        source.flush().unwrap();
        let out = tempfile::tempdir().unwrap();
        let sink = Arc::new(DirectorySink::new(out.path()).unwrap());

        let pool = ExtractionPool::spawn(4, source.path(), sink).unwrap();
        for i in 0..40u64 {
            let start = i * 1000;
            assert!(pool.submit(Artifact::new("JPEG", start, start + 700, "jpg")));
        }
        let mut results = pool.finish();
        results.sort_by_key(|r| r.artifact.start());

        assert_eq!(results.len(), 40);
        for result in results {
            let stored = result.outcome.unwrap();
            let range = result.artifact.range();
            assert_eq!(
                fs::read(&stored.path).unwrap(),
                &data[range.start as usize..range.end as usize]
            );
        }
    }

    #[test]
    fn test_cancelled_pool_writes_nothing() {
        let data = vec![0x5Au8; 8 * 1024];
        let mut source = NamedTempFile::new().unwrap();
        source.write_all(&data).unwrap();
        source.flush().unwrap();
        let out = tempfile::tempdir().unwrap();
        let sink = Arc::new(DirectorySink::new(out.path()).unwrap());

        let pool = ExtractionPool::spawn(2, source.path(), sink).unwrap();
        pool.cancel();
        for i in 0..10u64 {
            let start = i * 500;
            let _ = pool.submit(Artifact::new("JPEG", start, start + 400, "jpg"));
        }

        assert!(pool.finish().is_empty());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_source_fails_to_spawn() {
        let out = tempfile::tempdir().unwrap();
        let sink = Arc::new(DirectorySink::new(out.path()).unwrap());
        let result = ExtractionPool::spawn(2, &out.path().join("nope.img"), sink);
        assert!(result.is_err());
    }
}
