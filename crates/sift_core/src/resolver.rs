//! Carve Resolver: turns a start candidate into an artifact range.
//!
//! The resolver searches forward for the end marker with its own cursor into
//! the source, independent of the window reader, so end markers may lie any
//! distance past the window in which the start was seen. It also arbitrates
//! claimed ranges: candidates must arrive in ascending offset order, and one
//! that starts inside the last resolved artifact is discarded.

use crate::error::{CoreError, Result};
use crate::signatures::SignatureTable;
use crate::traits::BlockSource;
use crate::types::{Artifact, Candidate, StreamOffset};
use memchr::memmem::Finder;
use std::io;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Artifact(Artifact),
    Discarded(Discard),
    /// The scan was cancelled while the end marker was being searched.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// The start lies inside the artifact that begins at `claimed_by`.
    Overlap { claimed_by: StreamOffset },
    /// No end marker before end of stream.
    Unterminated,
    /// No end marker within `limit` bytes of the start.
    Oversized { limit: u64 },
}

/// Outcome of the last end-marker search for one signature: no occurrence
/// in `[from, found)`, and `found` is either the next occurrence or `None`
/// for end of stream.
#[derive(Debug, Clone, Copy)]
struct SearchMemo {
    from: StreamOffset,
    found: Option<StreamOffset>,
}

enum Search {
    Found(StreamOffset),
    EndOfStream,
    Limit,
    Cancelled,
}

pub struct CarveResolver<'t> {
    table: &'t SignatureTable,
    finders: Vec<Finder<'static>>,
    memos: Vec<Option<SearchMemo>>,
    buffer: Vec<u8>,
    chunk_size: usize,
    max_carve_size: Option<u64>,
    claimed: Option<Range<StreamOffset>>,
    last_offset: StreamOffset,
}

impl<'t> CarveResolver<'t> {
    pub fn new(table: &'t SignatureTable, chunk_size: usize, max_carve_size: Option<u64>) -> Self {
        let finders: Vec<Finder<'static>> = table
            .lookup()
            .iter()
            .map(|spec| Finder::new(spec.end_rule().marker()).into_owned())
            .collect();
        let keep = table
            .lookup()
            .iter()
            .map(|spec| spec.end_rule().marker().len().saturating_sub(1))
            .max()
            .unwrap_or(0);

        Self {
            table,
            memos: vec![None; finders.len()],
            finders,
            buffer: vec![0u8; keep + chunk_size],
            chunk_size,
            max_carve_size,
            claimed: None,
            last_offset: 0,
        }
    }

    /// Range of the most recently resolved artifact.
    #[must_use]
    pub fn claimed(&self) -> Option<Range<StreamOffset>> {
        self.claimed.clone()
    }

    pub fn resolve<S: BlockSource + ?Sized>(
        &mut self,
        source: &mut S,
        candidate: Candidate,
        running: Option<&AtomicBool>,
    ) -> Result<Resolution> {
        debug_assert!(
            candidate.offset >= self.last_offset,
            "candidates must be resolved in ascending order"
        );
        self.last_offset = candidate.offset;

        if let Some(claim) = &self.claimed {
            if claim.contains(&candidate.offset) {
                trace!(offset = candidate.offset, claimed_by = claim.start, "inside claimed range");
                return Ok(Resolution::Discarded(Discard::Overlap {
                    claimed_by: claim.start,
                }));
            }
        }

        let table = self.table;
        let spec = table.get(candidate.signature).ok_or_else(|| {
            CoreError::InvalidConfig(format!("unknown signature index {}", candidate.signature))
        })?;
        let rule = spec.end_rule();
        let marker_pos = match self.find_end(source, candidate, candidate.offset, running)? {
            Search::Found(pos) => pos,
            Search::EndOfStream => return Ok(Resolution::Discarded(Discard::Unterminated)),
            Search::Limit => return Ok(self.oversized()),
            Search::Cancelled => return Ok(Resolution::Pending),
        };

        let Some(end) = marker_pos.checked_add(rule.span()) else {
            return Ok(Resolution::Discarded(Discard::Unterminated));
        };
        if let Some(limit) = self.max_carve_size {
            if end - candidate.offset > limit {
                return Ok(self.oversized());
            }
        }

        // A trailer may run past the end of the stream.
        if rule.span() > rule.marker().len() as u64 && !has_byte(source, end - 1)? {
            return Ok(Resolution::Discarded(Discard::Unterminated));
        }

        let artifact = Artifact::new(spec.tag(), candidate.offset, end, spec.extension());
        debug!(%artifact, "resolved");
        self.claimed = Some(artifact.range());
        Ok(Resolution::Artifact(artifact))
    }

    fn oversized(&self) -> Resolution {
        Resolution::Discarded(Discard::Oversized {
            limit: self.max_carve_size.unwrap_or(u64::MAX),
        })
    }

    fn find_end<S: BlockSource + ?Sized>(
        &mut self,
        source: &mut S,
        candidate: Candidate,
        search_from: StreamOffset,
        running: Option<&AtomicBool>,
    ) -> Result<Search> {
        let id = candidate.signature;

        if let Some(memo) = self.memos[id] {
            if search_from >= memo.from {
                match memo.found {
                    None => return Ok(Search::EndOfStream),
                    Some(pos) if pos >= search_from => return Ok(Search::Found(pos)),
                    Some(_) => {}
                }
            }
        }

        let keep = self.finders[id].needle().len() - 1;
        let mut carry = 0usize;
        let mut offset = search_from;

        loop {
            if running.is_some_and(|r| !r.load(Ordering::Relaxed)) {
                return Ok(Search::Cancelled);
            }

            let n = read_retrying(source, offset, &mut self.buffer[carry..carry + self.chunk_size])?;
            if n == 0 {
                self.memos[id] = Some(SearchMemo {
                    from: search_from,
                    found: None,
                });
                return Ok(Search::EndOfStream);
            }

            let total = carry + n;
            if let Some(i) = self.finders[id].find(&self.buffer[..total]) {
                let pos = offset - carry as u64 + i as u64;
                self.memos[id] = Some(SearchMemo {
                    from: search_from,
                    found: Some(pos),
                });
                return Ok(Search::Found(pos));
            }

            let k = keep.min(total);
            self.buffer.copy_within(total - k..total, 0);
            carry = k;
            offset += n as u64;

            if let Some(limit) = self.max_carve_size {
                if offset - candidate.offset >= limit {
                    return Ok(Search::Limit);
                }
            }
        }
    }
}

fn read_retrying<S: BlockSource + ?Sized>(
    source: &mut S,
    offset: StreamOffset,
    buffer: &mut [u8],
) -> Result<usize> {
    loop {
        match source.read_chunk(offset, buffer) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::read_at(offset, e)),
        }
    }
}

fn has_byte<S: BlockSource + ?Sized>(source: &mut S, offset: StreamOffset) -> Result<bool> {
    let mut probe = [0u8; 1];
    Ok(read_retrying(source, offset, &mut probe)? == 1)
}
