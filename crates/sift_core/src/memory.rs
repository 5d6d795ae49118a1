//! In-memory adapters for the core ports.

use crate::error::StorageError;
use crate::traits::{ArtifactSink, BlockSource};
use crate::types::Artifact;
use parking_lot::Mutex;
use std::io::{self, Write};

/// A [`BlockSource`] over bytes already in memory.
#[derive(Debug, Clone)]
pub struct SliceSource<B> {
    bytes: B,
    reads: usize,
}

impl<B: AsRef<[u8]>> SliceSource<B> {
    pub fn new(bytes: B) -> Self {
        Self { bytes, reads: 0 }
    }

    /// Number of `read_chunk` calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl<B: AsRef<[u8]>> BlockSource for SliceSource<B> {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        let bytes = self.bytes.as_ref();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= bytes.len() {
            return Ok(0);
        }
        let len = buffer.len().min(bytes.len() - start);
        buffer[..len].copy_from_slice(&bytes[start..start + len]);
        Ok(len)
    }

    fn size(&self) -> u64 {
        self.bytes.as_ref().len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub name: String,
    pub tag: String,
    pub data: Vec<u8>,
}

/// Collects artifacts in memory; handles are insertion indices.
#[derive(Debug, Default)]
pub struct MemorySink {
    blobs: Mutex<Vec<StoredBlob>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn blobs(&self) -> Vec<StoredBlob> {
        self.blobs.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[derive(Debug)]
pub struct MemoryStaging {
    name: String,
    data: Vec<u8>,
}

impl Write for MemoryStaging {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactSink for MemorySink {
    type Handle = usize;
    type Staging = MemoryStaging;

    fn stage(&self, name: &str) -> Result<MemoryStaging, StorageError> {
        if self.blobs.lock().iter().any(|b| b.name == name) {
            return Err(StorageError::AlreadyExists(name.into()));
        }
        Ok(MemoryStaging {
            name: name.to_string(),
            data: Vec::new(),
        })
    }

    fn commit(&self, staging: MemoryStaging, artifact: &Artifact) -> Result<usize, StorageError> {
        let mut blobs = self.blobs.lock();
        if blobs.iter().any(|b| b.name == staging.name) {
            return Err(StorageError::AlreadyExists(staging.name.into()));
        }
        blobs.push(StoredBlob {
            name: staging.name,
            tag: artifact.tag().to_string(),
            data: staging.data,
        });
        Ok(blobs.len() - 1)
    }
}
