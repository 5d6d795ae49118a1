use crate::error::{CoreError, Result, StorageError};
use crate::traits::{ArtifactSink, BlockSource};
use crate::types::Artifact;
use std::io::{self, Write};

const DEFAULT_COPY_CHUNK: usize = 64 * 1024;

/// Why an emission failed. Read failures poison the shared source and end
/// the scan; storage failures only cost the one artifact.
#[derive(Debug)]
pub enum EmitError {
    Read(CoreError),
    Storage(StorageError),
}

impl From<EmitError> for CoreError {
    fn from(err: EmitError) -> Self {
        match err {
            EmitError::Read(e) => e,
            EmitError::Storage(e) => CoreError::Storage(e),
        }
    }
}

/// Copies an artifact's byte range from the source into a sink.
#[derive(Debug)]
pub struct ArtifactEmitter {
    buffer: Vec<u8>,
}

impl Default for ArtifactEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_COPY_CHUNK)
    }
}

impl ArtifactEmitter {
    pub fn new(copy_chunk: usize) -> Self {
        Self {
            buffer: vec![0u8; copy_chunk.max(1)],
        }
    }

    /// Streams `[start, end)` into a staged write and commits it under the
    /// artifact's generated name. Nothing is committed unless every byte was
    /// read and written.
    pub fn emit<S, K>(
        &mut self,
        source: &mut S,
        artifact: &Artifact,
        sink: &K,
    ) -> std::result::Result<K::Handle, EmitError>
    where
        S: BlockSource + ?Sized,
        K: ArtifactSink + ?Sized,
    {
        let mut staging = sink
            .stage(&artifact.file_name())
            .map_err(EmitError::Storage)?;

        let mut offset = artifact.start();
        while offset < artifact.end() {
            let want = (artifact.end() - offset).min(self.buffer.len() as u64) as usize;
            let n = self
                .read(source, offset, want)
                .map_err(EmitError::Read)?;
            staging
                .write_all(&self.buffer[..n])
                .map_err(|e| EmitError::Storage(e.into()))?;
            offset += n as u64;
        }
        staging
            .flush()
            .map_err(|e| EmitError::Storage(e.into()))?;

        sink.commit(staging, artifact).map_err(EmitError::Storage)
    }

    fn read<S: BlockSource + ?Sized>(&mut self, source: &mut S, offset: u64, want: usize) -> Result<usize> {
        loop {
            match source.read_chunk(offset, &mut self.buffer[..want]) {
                Ok(0) => {
                    return Err(CoreError::read_at(
                        offset,
                        io::Error::new(io::ErrorKind::UnexpectedEof, "source ended inside artifact"),
                    ))
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CoreError::read_at(offset, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySink, SliceSource};

    #[test]
    fn emits_exact_range_across_copy_chunks() {
        let data: Vec<u8> = (0..200u8).collect();
        let mut source = SliceSource::new(data.clone());
        let sink = MemorySink::new();
        let artifact = Artifact::new("JPEG", 17, 150, "jpg");

        let handle = ArtifactEmitter::new(8)
            .emit(&mut source, &artifact, &sink)
            .unwrap();

        let blobs = sink.blobs();
        assert_eq!(handle, 0);
        assert_eq!(blobs[0].name, "image_17.jpg");
        assert_eq!(blobs[0].tag, "JPEG");
        assert_eq!(blobs[0].data, &data[17..150]);
    }

    #[test]
    fn short_source_fails_without_commit() {
        let mut source = SliceSource::new(vec![0u8; 10]);
        let sink = MemorySink::new();
        let artifact = Artifact::new("GIF", 4, 40, "gif");

        let err = ArtifactEmitter::new(4)
            .emit(&mut source, &artifact, &sink)
            .unwrap_err();
        assert!(matches!(err, EmitError::Read(CoreError::StreamRead { offset: 10, .. })));
        assert!(sink.is_empty());
    }

    struct FullDisk;

    struct Rejecting;

    impl Write for Rejecting {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ArtifactSink for FullDisk {
        type Handle = ();
        type Staging = Rejecting;

        fn stage(&self, _name: &str) -> std::result::Result<Rejecting, StorageError> {
            Ok(Rejecting)
        }

        fn commit(&self, _staging: Rejecting, _artifact: &Artifact) -> std::result::Result<(), StorageError> {
            panic!("commit after failed write");
        }
    }

    #[test]
    fn write_failures_are_storage_errors() {
        let mut source = SliceSource::new(vec![0u8; 10]);
        let artifact = Artifact::new("PNG", 0, 10, "png");
        let err = ArtifactEmitter::default()
            .emit(&mut source, &artifact, &FullDisk)
            .unwrap_err();
        assert!(matches!(err, EmitError::Storage(StorageError::Io(_))));
    }
}
