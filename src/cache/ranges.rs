//! Byte ranges marking which parts of an object are present locally.
//!
//! A [`Ranges`] value is always kept normalised: sorted by position,
//! non-empty, non-overlapping and with adjacent ranges merged. The JSON
//! form is a plain array of `{"Pos": .., "Size": ..}` objects so payloads
//! written by other tools of the host program decode unchanged. Decoding
//! accepts `null` as the empty set and normalises whatever array it reads.

use serde::{Deserialize, Deserializer, Serialize};

/// A half-open byte range `[pos, pos + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Start offset in bytes.
    #[serde(rename = "Pos")]
    pub pos: i64,
    /// Length in bytes.
    #[serde(rename = "Size")]
    pub size: i64,
}

impl Range {
    /// Create a range from a start offset and a length.
    #[must_use]
    pub fn new(pos: i64, size: i64) -> Self {
        Self { pos, size }
    }

    /// Exclusive end offset.
    #[must_use]
    pub fn end(&self) -> i64 {
        self.pos.saturating_add(self.size)
    }

    /// Whether the range covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size <= 0
    }

    fn clip(&self, other: &Range) -> Range {
        let pos = self.pos.max(other.pos);
        let end = self.end().min(other.end());
        Range::new(pos, end.saturating_sub(pos).max(0))
    }
}

/// A normalised set of byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Ranges(Vec<Range>);

impl<'de> Deserialize<'de> for Ranges {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ranges = Option::<Vec<Range>>::deserialize(deserializer)?;
        Ok(Self::from_ranges(ranges.unwrap_or_default()))
    }
}

impl Ranges {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary ranges, normalising them.
    #[must_use]
    pub fn from_ranges(ranges: impl IntoIterator<Item = Range>) -> Self {
        let mut set = Self::new();
        for r in ranges {
            set.insert(r);
        }
        set
    }

    /// Add a range, merging it with any overlapping or adjacent ranges.
    pub fn insert(&mut self, r: Range) {
        if r.is_empty() {
            return;
        }

        let mut merged = r;
        let mut out = Vec::with_capacity(self.0.len() + 1);
        let mut placed = false;

        for existing in self.0.drain(..) {
            if existing.end() < merged.pos {
                out.push(existing);
            } else if merged.end() < existing.pos {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(existing);
            } else {
                let pos = existing.pos.min(merged.pos);
                let end = existing.end().max(merged.end());
                merged = Range::new(pos, end.saturating_sub(pos));
            }
        }

        if !placed {
            out.push(merged);
        }
        self.0 = out;
    }

    /// Whether every byte of `r` is present.
    #[must_use]
    pub fn present(&self, r: Range) -> bool {
        if r.is_empty() {
            return true;
        }
        self.0
            .iter()
            .any(|existing| existing.pos <= r.pos && existing.end() >= r.end())
    }

    /// The parts of `r` that are not present, in ascending order.
    #[must_use]
    pub fn missing(&self, r: Range) -> Vec<Range> {
        let mut gaps = Vec::new();
        if r.is_empty() {
            return gaps;
        }

        let mut cursor = r.pos;
        for existing in &self.0 {
            let overlap = existing.clip(&r);
            if overlap.is_empty() {
                continue;
            }
            if overlap.pos > cursor {
                gaps.push(Range::new(cursor, overlap.pos.saturating_sub(cursor)));
            }
            cursor = cursor.max(overlap.end());
        }
        if cursor < r.end() {
            gaps.push(Range::new(cursor, r.end().saturating_sub(cursor)));
        }
        gaps
    }

    /// Drop everything at or beyond `size`, e.g. after the object shrank.
    pub fn truncate(&mut self, size: i64) {
        let limit = Range::new(0, size.max(0));
        self.0 = self
            .0
            .iter()
            .map(|r| r.clip(&limit))
            .filter(|r| !r.is_empty())
            .collect();
    }

    /// Total number of bytes covered.
    #[must_use]
    pub fn covered_bytes(&self) -> i64 {
        self.0.iter().map(|r| r.size).sum()
    }

    /// Number of disjoint ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no bytes are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the disjoint ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Range> {
        self.0.iter()
    }
}
