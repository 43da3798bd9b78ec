//! Byte ranges written locally and not yet persisted to the store

use crate::PlanError;

/// A modified byte range of one open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntreatedRange {
    pub start: u64,
    pub size: u64,
    /// Write generation that last touched this range
    pub tag: u64,
}

impl UntreatedRange {
    /// Validate a range given in filesystem offsets.
    pub fn new(start: i64, size: i64, tag: u64) -> Result<Self, PlanError> {
        if start < 0 || size <= 0 {
            return Err(PlanError::InvalidRange { start, size });
        }

        Ok(UntreatedRange {
            start: start as u64,
            size: size as u64,
            tag,
        })
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// Whether `[chk_start, chk_start + chk_size)` intersects or touches this range.
    ///
    /// Touching counts so that a write landing exactly at a boundary merges
    /// instead of leaving two ranges with no gap between them.
    pub fn overlaps(&self, chk_start: i64, chk_size: i64) -> bool {
        if chk_start < 0 || chk_size <= 0 {
            return false;
        }
        let chk_start = chk_start as u64;
        self.touches(chk_start, chk_start + chk_size as u64)
    }

    fn touches(&self, start: u64, end: u64) -> bool {
        start <= self.end() && self.start <= end
    }

    fn stretch(&mut self, start: u64, end: u64, tag: u64) {
        let new_start = self.start.min(start);
        let new_end = self.end().max(end);
        self.start = new_start;
        self.size = new_end - new_start;
        self.tag = tag;
    }
}

/// Sorted set of disjoint, non-adjacent untreated ranges
#[derive(Debug, Clone, Default)]
pub struct UntreatedTracker {
    ranges: Vec<UntreatedRange>,
}

impl UntreatedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write of `size` bytes at `start`.
    ///
    /// Returns `true` when the write merged into an existing range and
    /// `false` when it was recorded as a new one.
    pub fn add(&mut self, start: i64, size: i64, tag: u64) -> Result<bool, PlanError> {
        let incoming = UntreatedRange::new(start, size, tag)?;

        // First range that reaches the new start; everything before it ends
        // strictly earlier and cannot touch.
        let idx = self.ranges.partition_point(|r| r.end() < incoming.start);

        match self.ranges.get_mut(idx) {
            Some(range) if range.touches(incoming.start, incoming.end()) => {
                range.stretch(incoming.start, incoming.end(), tag);
            }
            _ => {
                self.ranges.insert(idx, incoming);
                return Ok(false);
            }
        }

        // The stretched range may now bridge into its successors. Keep
        // absorbing until nothing after it touches.
        while idx + 1 < self.ranges.len() {
            let next = self.ranges[idx + 1];
            if !self.ranges[idx].touches(next.start, next.end()) {
                break;
            }
            self.ranges.remove(idx + 1);
            self.ranges[idx].stretch(next.start, next.end(), tag);
        }

        Ok(true)
    }

    /// Ranges ordered by start offset
    pub fn list(&self) -> &[UntreatedRange] {
        &self.ranges
    }

    /// Forget the bytes covered by `range`, splitting ranges it cuts through.
    pub fn clear(&mut self, range: &UntreatedRange) {
        let (start, end) = (range.start, range.end());
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);

        for r in self.ranges.drain(..) {
            if r.end() <= start || r.start >= end {
                kept.push(r);
                continue;
            }
            if r.start < start {
                kept.push(UntreatedRange {
                    start: r.start,
                    size: start - r.start,
                    tag: r.tag,
                });
            }
            if r.end() > end {
                kept.push(UntreatedRange {
                    start: end,
                    size: r.end() - end,
                    tag: r.tag,
                });
            }
        }

        self.ranges = kept;
    }

    /// Drop everything at or past `size`
    pub fn truncate(&mut self, size: u64) {
        self.ranges.retain(|r| r.start < size);
        if let Some(last) = self.ranges.last_mut() {
            if last.end() > size {
                last.size = size - last.start;
            }
        }
    }

    pub fn clear_all(&mut self) {
        self.ranges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Number of dirty bytes across all ranges
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.size).sum()
    }
}
