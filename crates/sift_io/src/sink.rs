use crate::custody::{self, ChainOfCustody};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sift_core::{Artifact, ArtifactSink, StorageError};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const WRITE_BUFFER: usize = 128 * 1024;

/// Reference to an artifact persisted by [`DirectorySink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

/// Writes artifacts as files into one output directory.
///
/// Bytes are staged in a hidden temporary file in the same directory and
/// renamed into place on commit, so a visible `image_<offset>.<ext>` is
/// always complete. Existing files are never overwritten.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    /// Source label for custody sidecars; `None` disables them.
    custody: Option<String>,
}

impl DirectorySink {
    /// Creates `dir` (and parents) if missing.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, custody: None })
    }

    #[must_use]
    pub fn with_custody(mut self, source: impl Into<String>) -> Self {
        self.custody = Some(source.into());
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Staged artifact bytes, hashed while written.
pub struct FileStaging {
    name: String,
    writer: BufWriter<NamedTempFile>,
    hasher: Sha256,
    size: u64,
}

impl Write for FileStaging {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ArtifactSink for DirectorySink {
    type Handle = StoredArtifact;
    type Staging = FileStaging;

    fn stage(&self, name: &str) -> Result<FileStaging, StorageError> {
        let target = self.dir.join(name);
        if target.exists() {
            return Err(StorageError::AlreadyExists(target));
        }

        let file = tempfile::Builder::new()
            .prefix(".sift-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;

        Ok(FileStaging {
            name: name.to_string(),
            writer: BufWriter::with_capacity(WRITE_BUFFER, file),
            hasher: Sha256::new(),
            size: 0,
        })
    }

    fn commit(
        &self,
        staging: FileStaging,
        artifact: &Artifact,
    ) -> Result<StoredArtifact, StorageError> {
        let FileStaging {
            name,
            writer,
            hasher,
            size,
        } = staging;

        if size != artifact.len() {
            return Err(StorageError::Other(format!(
                "staged {size} bytes for {name}, expected {}",
                artifact.len()
            )));
        }

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.as_file().sync_data()?;

        let target = self.dir.join(&name);
        file.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                StorageError::AlreadyExists(target.clone())
            } else {
                StorageError::Io(e.error)
            }
        })?;

        let sha256 = format!("{:x}", hasher.finalize());

        if let Some(source) = &self.custody {
            let record = ChainOfCustody::new(artifact, source, &sha256);
            if let Err(e) = custody::write_sidecar(&target, &record) {
                warn!(path = %target.display(), error = %e, "custody sidecar failed, removing artifact");
                let _ = fs::remove_file(&target);
                return Err(StorageError::Io(e));
            }
        }

        debug!(path = %target.display(), size, "artifact stored");
        Ok(StoredArtifact {
            path: target,
            sha256,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(sink: &DirectorySink, artifact: &Artifact, bytes: &[u8]) -> Result<StoredArtifact, StorageError> {
        let mut staging = sink.stage(&artifact.file_name())?;
        staging.write_all(bytes)?;
        staging.flush()?;
        sink.commit(staging, artifact)
    }

    fn visible_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_commit_writes_file_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out")).unwrap();
        let artifact = Artifact::new("JPEG", 10, 15, "jpg");

        let stored = store(&sink, &artifact, b"hello").unwrap();

        assert_eq!(stored.path, dir.path().join("out").join("image_10.jpg"));
        assert_eq!(fs::read(&stored.path).unwrap(), b"hello");
        assert_eq!(stored.size, 5);
        assert_eq!(
            stored.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(visible_entries(sink.dir()), vec!["image_10.jpg"]);
    }

    #[test]
    fn test_dropped_staging_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path()).unwrap();

        let mut staging = sink.stage("image_0.png").unwrap();
        staging.write_all(b"partial").unwrap();
        drop(staging);

        assert!(visible_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("image_4.gif"), b"keep").unwrap();
        let sink = DirectorySink::new(dir.path()).unwrap();

        let err = store(&sink, &Artifact::new("GIF", 4, 6, "gif"), b"GI").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(fs::read(dir.path().join("image_4.gif")).unwrap(), b"keep");
    }

    #[test]
    fn test_short_staging_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path()).unwrap();

        let err = store(&sink, &Artifact::new("JPEG", 0, 10, "jpg"), b"abc").unwrap_err();
        assert!(matches!(err, StorageError::Other(_)));
        assert!(visible_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_custody_sidecar_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path()).unwrap().with_custody("disk.img");

        let stored = store(&sink, &Artifact::new("PNG", 0, 3, "png"), b"png").unwrap();

        let sidecar = custody::sidecar_path(&stored.path);
        let record: ChainOfCustody =
            serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(record.sha256_hash, stored.sha256);
        assert_eq!(record.source, "disk.img");
        assert_eq!(
            visible_entries(dir.path()),
            vec!["image_0.png", "image_0.png.custody.json"]
        );
    }
}
