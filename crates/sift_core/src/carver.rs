//! The top-level scan: Window Reader → Marker Scanner → Carve Resolver →
//! Artifact Emitter, in a single pass over the source.

use crate::config::{ScanConfig, StoragePolicy};
use crate::emitter::{ArtifactEmitter, EmitError};
use crate::error::{CoreError, Result};
use crate::resolver::{CarveResolver, Discard, Resolution};
use crate::scanner::MarkerScanner;
use crate::signatures::SignatureTable;
use crate::traits::{ArtifactSink, BlockSource};
use crate::types::{Artifact, Candidate, StreamOffset};
use crate::window::WindowReader;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type ProgressCallback = Box<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
}

/// A detected candidate that did not become an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanWarning {
    Unterminated {
        tag: String,
        offset: StreamOffset,
    },
    Overlap {
        tag: String,
        offset: StreamOffset,
        claimed_by: StreamOffset,
    },
    Oversized {
        tag: String,
        offset: StreamOffset,
        limit: u64,
    },
    StorageFailed {
        tag: String,
        offset: StreamOffset,
        name: String,
        error: String,
    },
}

impl ScanWarning {
    fn from_discard(tag: &str, offset: StreamOffset, discard: Discard) -> Self {
        let tag = tag.to_string();
        match discard {
            Discard::Overlap { claimed_by } => Self::Overlap {
                tag,
                offset,
                claimed_by,
            },
            Discard::Unterminated => Self::Unterminated { tag, offset },
            Discard::Oversized { limit } => Self::Oversized { tag, offset, limit },
        }
    }

    #[must_use]
    pub fn offset(&self) -> StreamOffset {
        match self {
            Self::Unterminated { offset, .. }
            | Self::Overlap { offset, .. }
            | Self::Oversized { offset, .. }
            | Self::StorageFailed { offset, .. } => *offset,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Unterminated { tag, .. }
            | Self::Overlap { tag, .. }
            | Self::Oversized { tag, .. }
            | Self::StorageFailed { tag, .. } => tag,
        }
    }

    /// Overlap discards are expected false positives inside claimed bytes.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Overlap { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unterminated { tag, offset } => {
                write!(f, "{tag} at 0x{offset:X}: no end marker before end of stream")
            }
            Self::Overlap {
                tag,
                offset,
                claimed_by,
            } => write!(
                f,
                "{tag} at 0x{offset:X}: inside artifact starting at 0x{claimed_by:X}"
            ),
            Self::Oversized { tag, offset, limit } => {
                write!(f, "{tag} at 0x{offset:X}: no end marker within {limit} bytes")
            }
            Self::StorageFailed {
                tag,
                offset,
                name,
                error,
            } => write!(f, "{tag} at 0x{offset:X}: could not store {name}: {error}"),
        }
    }
}

/// An artifact that reached storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extracted<H> {
    pub name: String,
    pub tag: String,
    pub start: StreamOffset,
    pub end: StreamOffset,
    pub handle: H,
}

impl<H> Extracted<H> {
    pub fn new(artifact: &Artifact, handle: H) -> Self {
        Self {
            name: artifact.file_name(),
            tag: artifact.tag().to_string(),
            start: artifact.start(),
            end: artifact.end(),
            handle,
        }
    }
}

/// Resolution-only result of [`Carver::carve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarveOutcome {
    pub resolved: usize,
    pub warnings: Vec<ScanWarning>,
    pub bytes_scanned: u64,
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport<H> {
    pub extracted: Vec<Extracted<H>>,
    pub warnings: Vec<ScanWarning>,
    pub bytes_scanned: u64,
    pub interrupted: bool,
}

impl<H> ScanReport<H> {
    /// `(name, tag)` for every stored artifact, in stream order.
    pub fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extracted
            .iter()
            .map(|e| (e.name.as_str(), e.tag.as_str()))
    }

    pub fn warnings_at_least(&self, severity: Severity) -> impl Iterator<Item = &ScanWarning> {
        self.warnings
            .iter()
            .filter(move |w| w.severity() >= severity)
    }
}

pub struct Carver {
    table: SignatureTable,
    config: ScanConfig,
    scanner: MarkerScanner,
    running: Option<Arc<AtomicBool>>,
    progress: Option<ProgressCallback>,
}

impl Carver {
    pub fn new(table: SignatureTable, config: ScanConfig) -> Result<Self> {
        config.validate(&table)?;
        let scanner = MarkerScanner::new(&table)?;
        Ok(Self {
            table,
            config,
            scanner,
            running: None,
            progress: None,
        })
    }

    /// Scan stops once `running` is cleared.
    #[must_use]
    pub fn with_running(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    /// Called with the number of source bytes read after every window.
    #[must_use]
    pub fn with_progress(mut self, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn table(&self) -> &SignatureTable {
        &self.table
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.load(Ordering::SeqCst))
    }

    /// Scans and resolves, handing each artifact to `on_artifact` in
    /// ascending start order. An error from the callback ends the scan.
    pub fn carve<S, F>(&self, source: &mut S, mut on_artifact: F) -> Result<CarveOutcome>
    where
        S: BlockSource + ?Sized,
        F: FnMut(&mut S, Artifact) -> Result<()>,
    {
        let mut reader = WindowReader::new(self.config.chunk_size, self.table.lookback())?;
        let mut resolver =
            CarveResolver::new(&self.table, self.config.chunk_size, self.config.max_carve_size);
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut outcome = CarveOutcome::default();
        let running = self.running.as_deref();

        info!(
            formats = self.table.len(),
            chunk_size = self.config.chunk_size,
            source_size = source.size(),
            "scan started"
        );

        'windows: loop {
            if self.cancelled() {
                outcome.interrupted = true;
                break;
            }

            candidates.clear();
            match reader.next(source)? {
                Some(window) => self.scanner.scan_into(&window, &mut candidates),
                None => break,
            }
            outcome.bytes_scanned = reader.position();
            if let Some(progress) = &self.progress {
                progress(outcome.bytes_scanned);
            }

            for &candidate in &candidates {
                match resolver.resolve(source, candidate, running)? {
                    Resolution::Artifact(artifact) => {
                        outcome.resolved += 1;
                        on_artifact(&mut *source, artifact)?;
                    }
                    Resolution::Discarded(discard) => {
                        let tag = self
                            .table
                            .get(candidate.signature)
                            .map_or("?", |s| s.tag());
                        let warning = ScanWarning::from_discard(tag, candidate.offset, discard);
                        debug!(%warning, "candidate discarded");
                        outcome.warnings.push(warning);
                    }
                    Resolution::Pending => {
                        debug!(offset = candidate.offset, "resolution abandoned");
                        outcome.interrupted = true;
                        break 'windows;
                    }
                }
            }
        }

        info!(
            resolved = outcome.resolved,
            discarded = outcome.warnings.len(),
            bytes = outcome.bytes_scanned,
            interrupted = outcome.interrupted,
            "scan finished"
        );
        Ok(outcome)
    }

    /// Full scan: every resolved artifact is emitted into `sink` as soon as
    /// it is resolved.
    pub fn scan<S, K>(&self, source: &mut S, sink: &K) -> Result<ScanReport<K::Handle>>
    where
        S: BlockSource + ?Sized,
        K: ArtifactSink + ?Sized,
    {
        let mut emitter = ArtifactEmitter::default();
        let mut extracted = Vec::new();
        let mut failures = Vec::new();
        let policy = self.config.storage_policy;

        let outcome = self.carve(source, |source, artifact| {
            match emitter.emit(source, &artifact, sink) {
                Ok(handle) => {
                    extracted.push(Extracted::new(&artifact, handle));
                    Ok(())
                }
                Err(EmitError::Read(e)) => Err(e),
                Err(EmitError::Storage(e)) if policy == StoragePolicy::Abort => {
                    Err(CoreError::Storage(e))
                }
                Err(EmitError::Storage(e)) => {
                    warn!(name = %artifact.file_name(), error = %e, "artifact not stored");
                    failures.push(ScanWarning::StorageFailed {
                        tag: artifact.tag().to_string(),
                        offset: artifact.start(),
                        name: artifact.file_name(),
                        error: e.to_string(),
                    });
                    Ok(())
                }
            }
        })?;

        Ok(ScanReport {
            extracted,
            warnings: merge_warnings(outcome.warnings, failures),
            bytes_scanned: outcome.bytes_scanned,
            interrupted: outcome.interrupted,
        })
    }
}

/// Orders warnings by stream offset, keeping discovery order for ties.
pub fn merge_warnings(mut a: Vec<ScanWarning>, b: Vec<ScanWarning>) -> Vec<ScanWarning> {
    a.extend(b);
    a.sort_by_key(ScanWarning::offset);
    a
}
