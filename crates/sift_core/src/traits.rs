//! Ports between the carving core and its collaborators.
//!
//! The core never opens files or creates directories itself. It reads
//! through a [`BlockSource`] and hands finished artifacts to an
//! [`ArtifactSink`]; the `sift_io` crate provides the disk-backed adapters.

use crate::error::StorageError;
use crate::types::Artifact;
use std::io::{self, Write};

/// A positional source of raw bytes, typically a disk image.
///
/// Reads are addressed by absolute offset, so the window reader and the
/// carve resolver can each keep their own cursor into the same source.
///
/// # Example
///
/// ```ignore
/// struct ImageFile { /* ... */ }
///
/// impl BlockSource for ImageFile {
///     fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
///         // pread at offset
///     }
///
///     fn size(&self) -> u64 {
///         // total length in bytes
///     }
/// }
/// ```
pub trait BlockSource {
    /// Reads up to `buffer.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; `0` means `offset` is at or past
    /// the end of the source.
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize>;

    /// Total size of the source in bytes, used for progress reporting only.
    fn size(&self) -> u64;
}

impl<T: BlockSource + ?Sized> BlockSource for Box<T> {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(offset, buffer)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

impl<T: BlockSource + ?Sized> BlockSource for &mut T {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(offset, buffer)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

/// Storage collaborator receiving carved artifacts.
///
/// Writing is two-phase: [`stage`](Self::stage) opens a writer that the
/// emitter fills with the artifact bytes, and [`commit`](Self::commit)
/// publishes it. A staging writer dropped without commit must leave no
/// trace, so a failed emission never exposes a partial artifact.
///
/// Methods take `&self` so one sink can be shared by extraction workers.
pub trait ArtifactSink: Send + Sync {
    /// Opaque reference to a stored artifact.
    type Handle;
    type Staging: Write;

    fn stage(&self, name: &str) -> Result<Self::Staging, StorageError>;

    fn commit(
        &self,
        staging: Self::Staging,
        artifact: &Artifact,
    ) -> Result<Self::Handle, StorageError>;
}
