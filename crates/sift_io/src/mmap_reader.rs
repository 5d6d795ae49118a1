use memmap2::Mmap;
use sift_core::BlockSource;
use std::fs::File;
use std::io;
use std::path::Path;

/// Memory-mapped image file. Block devices and empty files cannot be
/// mapped; callers fall back to [`DiskReader`](crate::DiskReader).
pub struct MmapReader {
    mmap: Mmap,
    size: u64,
    /// Bytes ahead of each read to request from the kernel.
    readahead: usize,
}

impl MmapReader {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            ));
        }

        // SAFETY: the mapping is read-only; the image is expected not to be
        // truncated while the scan runs.
        let mmap = unsafe { Mmap::map(&file) }?;

        if mmap.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "mmap returned an empty mapping (block device?)",
            ));
        }

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
        }

        Ok(Self {
            mmap,
            size,
            readahead: 0,
        })
    }

    /// Prefetch this many bytes past every read.
    #[must_use]
    pub fn with_readahead(mut self, bytes: usize) -> Self {
        self.readahead = bytes;
        self
    }

    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        if start >= self.mmap.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        Some(&self.mmap[start..end])
    }

    #[cfg(target_os = "linux")]
    pub fn prefetch(&self, offset: u64, len: usize) {
        let Ok(start) = usize::try_from(offset) else {
            return;
        };
        if start >= self.mmap.len() || len == 0 {
            return;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        let _ = self
            .mmap
            .advise_range(memmap2::Advice::WillNeed, start, end - start);
    }

    #[cfg(not(target_os = "linux"))]
    pub fn prefetch(&self, _offset: u64, _len: usize) {}
}

impl BlockSource for MmapReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        let Some(slice) = self.slice(offset, buffer.len()) else {
            return Ok(0);
        };
        let len = slice.len();
        buffer[..len].copy_from_slice(slice);
        self.prefetch(offset + len as u64, self.readahead);
        Ok(len)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
