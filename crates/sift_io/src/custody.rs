//! Chain-of-custody sidecars: one JSON record next to every stored artifact.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sift_core::Artifact;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOfCustody {
    pub filename: String,
    pub source: String,
    pub source_offset: String,
    pub source_offset_decimal: u64,
    pub file_size: u64,
    pub sha256_hash: String,
    pub recovery_timestamp: String,
    pub file_type: String,
}

impl ChainOfCustody {
    pub fn new(artifact: &Artifact, source: &str, sha256_hash: &str) -> Self {
        Self {
            filename: artifact.file_name(),
            source: source.to_string(),
            source_offset: format!("0x{:016X}", artifact.start()),
            source_offset_decimal: artifact.start(),
            file_size: artifact.len(),
            sha256_hash: sha256_hash.to_string(),
            recovery_timestamp: Utc::now().to_rfc3339(),
            file_type: artifact.tag().to_string(),
        }
    }
}

/// `image_7.jpg` → `image_7.jpg.custody.json`
pub fn sidecar_path(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path.as_os_str().to_owned();
    name.push(".custody.json");
    PathBuf::from(name)
}

pub fn write_sidecar(artifact_path: &Path, custody: &ChainOfCustody) -> io::Result<PathBuf> {
    let path = sidecar_path(artifact_path);
    let json = serde_json::to_string_pretty(custody).map_err(io::Error::other)?;
    fs::write(&path, json)?;
    Ok(path)
}
