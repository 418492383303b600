//! Online median over a stream of samples via two balanced heaps.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// f64 wrapper ordered by total order, so it can live in a heap.
///
/// NaN samples are never inserted by callers (quotes and rates are finite);
/// total_cmp keeps the structure well-defined regardless.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapF64(f64);

impl Eq for HeapF64 {}

impl PartialOrd for HeapF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Two-heap streaming median: O(log n) insert, O(1) median.
///
/// `upper` is a min-heap holding the upper partition, `lower` a max-heap
/// holding the lower partition. Invariants: every element of `lower` ≤ every
/// element of `upper`, and `upper` holds the extra element when the count is
/// odd. The estimator does not expire elements — callers that need a sliding
/// window rebuild a fresh instance per window.
#[derive(Debug, Clone, Default)]
pub struct StreamingMedian {
    upper: BinaryHeap<Reverse<HeapF64>>,
    lower: BinaryHeap<HeapF64>,
    count: usize,
}

impl StreamingMedian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample, rebalancing the two heaps.
    pub fn insert(&mut self, value: f64) {
        // Route through the upper heap so its minimum migrates down, then
        // give the extra element back to the upper heap on even counts.
        self.upper.push(Reverse(HeapF64(value)));
        let Reverse(migrated) = self.upper.pop().expect("just pushed");
        self.lower.push(migrated);

        if self.count % 2 == 0 {
            let top = self.lower.pop().expect("just pushed");
            self.upper.push(Reverse(top));
        }
        self.count += 1;
    }

    /// Current median; 0.0 when no samples have been inserted.
    pub fn median(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let upper_top = self.upper.peek().expect("non-empty on odd/even counts").0 .0;
        if self.count % 2 == 1 {
            upper_top
        } else {
            let lower_top = self.lower.peek().expect("non-empty on even counts").0;
            (upper_top + lower_top) / 2.0
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Resets both heaps.
    pub fn clear(&mut self) {
        self.upper.clear();
        self.lower.clear();
        self.count = 0;
    }
}
