//! The Signature Table: which formats are carved and how their boundaries
//! are recognised.
//!
//! The table is plain data. The scanner and resolver only ever see it through
//! [`SignatureTable::lookup`], so new formats can be added from a JSON file
//! without touching either of them.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

const MAX_START_MARKER: usize = 16;
const MAX_TRAILER: u64 = 1 << 20;

/// How the end of an artifact is located once its start marker is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndRule {
    /// The artifact ends right after this byte sequence.
    Marker(Vec<u8>),
    /// The artifact ends `trailer` bytes after this byte sequence
    /// (e.g. PNG `IEND` followed by its 4-byte CRC).
    MarkerWithTrailer { marker: Vec<u8>, trailer: u64 },
}

impl EndRule {
    #[must_use]
    pub fn marker(&self) -> &[u8] {
        match self {
            Self::Marker(marker) | Self::MarkerWithTrailer { marker, .. } => marker,
        }
    }

    /// Bytes from the first byte of the end marker to the artifact's
    /// exclusive end.
    #[must_use]
    pub fn span(&self) -> u64 {
        match self {
            Self::Marker(marker) => marker.len() as u64,
            Self::MarkerWithTrailer { marker, trailer } => {
                (marker.len() as u64).saturating_add(*trailer)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignatureDef", into = "SignatureDef")]
pub struct SignatureSpec {
    tag: String,
    start: Vec<u8>,
    end: EndRule,
    extension: String,
}

impl SignatureSpec {
    pub fn new(
        tag: impl Into<String>,
        start: impl Into<Vec<u8>>,
        end: EndRule,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let spec = Self {
            tag: tag.into(),
            start: start.into(),
            end,
            extension: extension.into(),
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        if self.tag.trim().is_empty() {
            return Err(CoreError::InvalidSignature("empty format tag".into()));
        }
        if self.start.is_empty() || self.start.len() > MAX_START_MARKER {
            return Err(CoreError::InvalidSignature(format!(
                "{}: start marker must be 1..={} bytes, got {}",
                self.tag,
                MAX_START_MARKER,
                self.start.len()
            )));
        }
        if self.end.marker().is_empty() {
            return Err(CoreError::InvalidSignature(format!(
                "{}: empty end marker",
                self.tag
            )));
        }
        if let EndRule::MarkerWithTrailer { trailer, .. } = self.end {
            if trailer > MAX_TRAILER {
                return Err(CoreError::InvalidSignature(format!(
                    "{}: trailer must be at most {MAX_TRAILER} bytes, got {trailer}",
                    self.tag
                )));
            }
        }
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(CoreError::InvalidSignature(format!(
                "{}: invalid extension {:?}",
                self.tag, self.extension
            )));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[inline]
    #[must_use]
    pub fn start_marker(&self) -> &[u8] {
        &self.start
    }

    #[inline]
    #[must_use]
    pub fn end_rule(&self) -> &EndRule {
        &self.end
    }

    /// Extension without the leading dot.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}

impl fmt::Display for SignatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} .. {}, .{})",
            self.tag,
            hex::encode_upper(&self.start),
            hex::encode_upper(self.end.marker()),
            self.extension()
        )
    }
}

/// On-disk shape of a signature: markers are hex strings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignatureDef {
    tag: String,
    start: String,
    end: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    trailer: u64,
    extension: String,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

fn parse_hex(field: &str, tag: &str, text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact)
        .map_err(|e| CoreError::InvalidSignature(format!("{tag}: bad {field} marker {text:?}: {e}")))
}

impl TryFrom<SignatureDef> for SignatureSpec {
    type Error = CoreError;

    fn try_from(def: SignatureDef) -> Result<Self> {
        let start = parse_hex("start", &def.tag, &def.start)?;
        let marker = parse_hex("end", &def.tag, &def.end)?;
        let end = if def.trailer == 0 {
            EndRule::Marker(marker)
        } else {
            EndRule::MarkerWithTrailer {
                marker,
                trailer: def.trailer,
            }
        };
        Self::new(def.tag, start, end, def.extension)
    }
}

impl From<SignatureSpec> for SignatureDef {
    fn from(spec: SignatureSpec) -> Self {
        let trailer = match spec.end {
            EndRule::Marker(_) => 0,
            EndRule::MarkerWithTrailer { trailer, .. } => trailer,
        };
        Self {
            start: hex::encode_upper(&spec.start),
            end: hex::encode_upper(spec.end.marker()),
            trailer,
            extension: spec.extension().to_string(),
            tag: spec.tag,
        }
    }
}

/// Ordered, immutable set of [`SignatureSpec`]s.
///
/// Order is the tie-break when two start markers match at the same offset:
/// the earlier entry is resolved first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SignatureTable {
    specs: Vec<SignatureSpec>,
}

impl SignatureTable {
    pub fn new(specs: Vec<SignatureSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(CoreError::InvalidConfig(
                "signature table has no entries".into(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.tag.to_ascii_uppercase()) {
                return Err(CoreError::InvalidSignature(format!(
                    "duplicate format tag {}",
                    spec.tag
                )));
            }
        }
        Ok(Self { specs })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let specs: Vec<SignatureSpec> = serde_json::from_str(text)
            .map_err(|e| CoreError::InvalidSignature(format!("signature table: {e}")))?;
        Self::new(specs)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    #[inline]
    #[must_use]
    pub fn lookup(&self) -> &[SignatureSpec] {
        &self.specs
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&SignatureSpec> {
        self.specs.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    #[must_use]
    pub fn max_start_len(&self) -> usize {
        self.specs
            .iter()
            .map(|s| s.start.len())
            .max()
            .unwrap_or(0)
    }

    /// Bytes of the previous window carried into the next one so that no
    /// start marker is split across a chunk boundary.
    #[must_use]
    pub fn lookback(&self) -> usize {
        self.max_start_len().saturating_sub(1)
    }

    /// Keeps only the formats whose tag (case-insensitive) is listed.
    pub fn retain_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<Self> {
        let wanted: HashSet<String> = tags
            .iter()
            .map(|t| t.as_ref().trim().to_ascii_uppercase())
            .collect();
        for tag in &wanted {
            if !self.specs.iter().any(|s| s.tag.eq_ignore_ascii_case(tag)) {
                return Err(CoreError::InvalidConfig(format!("unknown format {tag}")));
            }
        }
        Self::new(
            self.specs
                .iter()
                .filter(|s| wanted.contains(&s.tag.to_ascii_uppercase()))
                .cloned()
                .collect(),
        )
    }
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self {
            specs: vec![
                SignatureSpec {
                    tag: "JPEG".into(),
                    start: vec![0xFF, 0xD8, 0xFF],
                    end: EndRule::Marker(vec![0xFF, 0xD9]),
                    extension: "jpg".into(),
                },
                SignatureSpec {
                    tag: "PNG".into(),
                    start: vec![0x89, 0x50, 0x4E, 0x47],
                    end: EndRule::Marker(vec![0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]),
                    extension: "png".into(),
                },
                SignatureSpec {
                    tag: "GIF".into(),
                    start: vec![0x47, 0x49, 0x46, 0x38],
                    end: EndRule::Marker(vec![0x00, 0x3B]),
                    extension: "gif".into(),
                },
            ],
        }
    }
}
