use crate::error::Result;
use crate::signatures::SignatureTable;
use crate::types::Candidate;
use crate::window::Window;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

/// Finds every start marker of every signature in a window.
///
/// All markers are compiled into one Aho-Corasick automaton and searched
/// with overlapping semantics, so `FF D8 FF D8 FF` yields two JPEG
/// candidates and a marker that is a prefix of another still reports both.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    automaton: AhoCorasick,
    /// Signature indices per automaton pattern. Identical markers from
    /// different signatures share one pattern.
    pattern_signatures: Vec<Vec<usize>>,
}

impl MarkerScanner {
    pub fn new(table: &SignatureTable) -> Result<Self> {
        let mut patterns: Vec<&[u8]> = Vec::new();
        let mut pattern_signatures: Vec<Vec<usize>> = Vec::new();

        for (id, spec) in table.lookup().iter().enumerate() {
            match patterns.iter().position(|p| *p == spec.start_marker()) {
                Some(idx) => pattern_signatures[idx].push(id),
                None => {
                    patterns.push(spec.start_marker());
                    pattern_signatures.push(vec![id]);
                }
            }
        }

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(&patterns)?;

        Ok(Self {
            automaton,
            pattern_signatures,
        })
    }

    /// Candidates whose start lies in the window's owned range, in ascending
    /// stream order; ties keep signature-table order.
    #[must_use]
    pub fn scan(&self, window: &Window<'_>) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        self.scan_into(window, &mut candidates);
        candidates
    }

    pub fn scan_into(&self, window: &Window<'_>, out: &mut Vec<Candidate>) {
        let first = out.len();
        let owned = window.owned_len();

        for mat in self.automaton.find_overlapping_iter(window.bytes()) {
            if mat.start() >= owned {
                continue;
            }
            let offset = window.base() + mat.start() as u64;
            for &signature in &self.pattern_signatures[mat.pattern().as_usize()] {
                out.push(Candidate { offset, signature });
            }
        }

        // Overlapping matches arrive ordered by end position.
        out[first..].sort_unstable();
    }
}
