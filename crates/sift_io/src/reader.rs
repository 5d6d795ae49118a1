//! Positional reader for physical disks and image files.

use sift_core::BlockSource;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A read-only block source backed by a file handle.
///
/// `DiskReader` works for anything that can be opened and seeked:
/// - Physical disk devices (`/dev/sda`, `/dev/nvme0n1`, etc.)
/// - Partition devices (`/dev/sda1`, etc.)
/// - Raw image files (`.img`, `.dd`, etc.)
/// - Anonymous spool files holding piped input
///
/// # Example
///
/// ```ignore
/// use sift_io::DiskReader;
/// use sift_core::BlockSource;
///
/// let mut reader = DiskReader::new("/dev/sda")?;
///
/// let mut buffer = vec![0u8; 512];
/// let bytes_read = reader.read_chunk(0, &mut buffer)?;
/// ```
#[derive(Debug)]
pub struct DiskReader {
    file: File,
    size: u64,
}

impl DiskReader {
    /// Opens `path` read-only.
    ///
    /// Fails if the path does not exist, permission is denied, or the size
    /// cannot be determined by seeking to the end.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(false)
            .open(path.as_ref())?;
        Self::from_file(file)
    }

    /// Wraps an already open file; the read position is irrelevant.
    pub fn from_file(mut file: File) -> io::Result<Self> {
        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
            let _ = fadvise(&file, 0, None, Advice::NoReuse);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self { file, size })
    }
}

impl BlockSource for DiskReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buffer)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
