pub mod carver;
pub mod config;
pub mod emitter;
mod error;
pub mod memory;
pub mod resolver;
pub mod scanner;
pub mod signatures;
mod traits;
mod types;
pub mod window;

pub use carver::{CarveOutcome, Carver, Extracted, ScanReport, ScanWarning, Severity};
pub use config::{ScanConfig, StoragePolicy, DEFAULT_CHUNK_SIZE};
pub use emitter::{ArtifactEmitter, EmitError};
pub use error::{CoreError, Result, StorageError};
pub use resolver::{CarveResolver, Discard, Resolution};
pub use scanner::MarkerScanner;
pub use signatures::{EndRule, SignatureSpec, SignatureTable};
pub use traits::{ArtifactSink, BlockSource};
pub use types::{Artifact, Candidate, StreamOffset};
pub use window::{Window, WindowReader};
