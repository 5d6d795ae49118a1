pub mod custody;
mod mmap_reader;
mod reader;
mod sink;
mod spool;

pub use custody::ChainOfCustody;
pub use mmap_reader::MmapReader;
pub use reader::DiskReader;
pub use sink::{DirectorySink, FileStaging, StoredArtifact};
pub use spool::spool;

use sift_core::BlockSource;
use std::io;
use std::path::Path;
use tracing::debug;

/// Path argument that selects standard input.
pub const STDIN_PATH: &str = "-";

pub enum Reader {
    Mmap(MmapReader),
    Disk(DiskReader),
}

impl Reader {
    /// Maps regular files and falls back to positional reads for devices.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path_ref = path.as_ref();
        match MmapReader::new(path_ref) {
            Ok(r) => Ok(Reader::Mmap(r)),
            Err(e) => {
                debug!(path = %path_ref.display(), reason = %e, "mmap unavailable, using positional reads");
                Ok(Reader::Disk(DiskReader::new(path_ref)?))
            }
        }
    }

    /// Opens `path`, or spools standard input when it is `-`.
    pub fn open_or_stdin(path: impl AsRef<Path>) -> io::Result<Self> {
        let path_ref = path.as_ref();
        if path_ref == Path::new(STDIN_PATH) {
            return Ok(Reader::Disk(spool(io::stdin().lock())?));
        }
        Self::open(path_ref)
    }

    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self, Reader::Mmap(_))
    }
}

impl BlockSource for Reader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        match self {
            Reader::Mmap(r) => r.read_chunk(offset, buffer),
            Reader::Disk(r) => r.read_chunk(offset, buffer),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Reader::Mmap(r) => r.size(),
            Reader::Disk(r) => r.size(),
        }
    }
}
