use crate::error::{CoreError, Result};
use crate::signatures::SignatureTable;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// What to do when the storage collaborator rejects an artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoragePolicy {
    /// Record a warning and keep scanning.
    #[default]
    Skip,
    /// Stop the scan with the storage error.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Fresh bytes read per window.
    pub chunk_size: usize,
    /// Longest artifact to carve; `None` searches to end of stream.
    pub max_carve_size: Option<u64>,
    pub storage_policy: StoragePolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_carve_size: None,
            storage_policy: StoragePolicy::Skip,
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_max_carve_size(mut self, limit: Option<u64>) -> Self {
        self.max_carve_size = limit;
        self
    }

    #[must_use]
    pub fn with_storage_policy(mut self, policy: StoragePolicy) -> Self {
        self.storage_policy = policy;
        self
    }

    pub fn validate(&self, table: &SignatureTable) -> Result<()> {
        let longest = table.max_start_len();
        if self.chunk_size < longest.max(1) {
            return Err(CoreError::InvalidConfig(format!(
                "chunk size {} is smaller than the longest start marker ({} bytes)",
                self.chunk_size, longest
            )));
        }
        if self.max_carve_size == Some(0) {
            return Err(CoreError::InvalidConfig(
                "maximum carve size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
