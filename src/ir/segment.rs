//! Image segment metadata.

/// A contiguous address range of the loaded image.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Segment name as reported by the host (e.g. `.bss`, `.data`).
    pub name: String,
    /// Inclusive start address.
    pub start: u64,
    /// Exclusive end address.
    pub end: u64,
    /// True if the segment is zero-initialized and not written before the
    /// analyzed code runs.
    pub zero_init: bool,
}

impl Segment {
    /// True if `address` falls within this segment.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }
}

/// Address-ordered collection of [`Segment`]s supplied by the host.
///
/// Consulted by the dead-value elimination pass to decide whether a global
/// read can be folded to zero.
#[derive(Debug, Clone, Default)]
pub struct SegmentMap {
    segments: Vec<Segment>,
}

impl SegmentMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a segment.
    pub fn add(&mut self, name: impl Into<String>, start: u64, end: u64, zero_init: bool) {
        self.segments.push(Segment {
            name: name.into(),
            start,
            end,
            zero_init,
        });
    }

    /// Segment containing `address`, if any.
    #[must_use]
    pub fn segment_at(&self, address: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(address))
    }

    /// True if `address` lies in a zero-initialized segment.
    #[must_use]
    pub fn is_zero_init(&self, address: u64) -> bool {
        self.segment_at(address).is_some_and(|s| s.zero_init)
    }
}
