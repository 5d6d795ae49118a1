use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// Absolute byte position in the source stream.
pub type StreamOffset = u64;

/// A start marker seen in the stream, not yet resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Candidate {
    pub offset: StreamOffset,
    /// Index of the matching entry in the [`SignatureTable`](crate::SignatureTable).
    pub signature: usize,
}

/// A resolved `[start, end)` range ready for emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    tag: String,
    start: StreamOffset,
    end: StreamOffset,
    extension: String,
}

impl Artifact {
    pub fn new(
        tag: impl Into<String>,
        start: StreamOffset,
        end: StreamOffset,
        extension: impl Into<String>,
    ) -> Self {
        debug_assert!(start < end);
        Self {
            tag: tag.into(),
            start,
            end,
            extension: extension.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[inline]
    #[must_use]
    pub fn start(&self) -> StreamOffset {
        self.start
    }

    #[inline]
    #[must_use]
    pub fn end(&self) -> StreamOffset {
        self.end
    }

    #[inline]
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[must_use]
    pub fn range(&self) -> Range<StreamOffset> {
        self.start..self.end
    }

    /// Output name, unique per start offset: `image_<start>.<ext>`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("image_{}.{}", self.start, self.extension)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [0x{:X}..0x{:X}) {} bytes",
            self.tag,
            self.start,
            self.end,
            self.len()
        )
    }
}
