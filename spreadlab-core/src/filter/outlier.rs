//! Median/MAD acceptance band for spread-rate quotes.
//!
//! A rolling window of recent rate observations yields a robust band
//! `median ± k * 1.4826 * MAD`; quotes outside it are rejected as outliers.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::median::StreamingMedian;

/// Consistency constant making MAD comparable to a standard deviation for
/// normal data. Kept separate from the configurable multiplier `k`.
pub const MAD_SCALE: f64 = 1.4826;

/// Default rolling-window capacity (number of rate observations).
pub const DEFAULT_WINDOW: usize = 17;

/// Default band multiplier. The live algo path historically used 1.5 and the
/// backtester 3.0; 3.0 is the default here and 1.5 remains reachable through
/// configuration.
pub const DEFAULT_K: f64 = 3.0;

/// Closed interval of acceptable values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    /// Strict-interior membership, matching the `lower < x < upper` gate of
    /// the crossing logic. A zero-width band accepts nothing.
    pub fn contains(&self, x: f64) -> bool {
        self.lower < x && x < self.upper
    }
}

/// Computes the acceptance band over a window of samples.
///
/// Returns `None` for fewer than 2 samples: the filter has not warmed up,
/// and callers reject until it has.
pub fn acceptance_band(window: &[f64], k: f64) -> Option<Band> {
    if window.len() < 2 {
        return None;
    }

    let mut est = StreamingMedian::new();
    for &x in window {
        est.insert(x);
    }
    let median = est.median();

    let mut deviations = StreamingMedian::new();
    for &x in window {
        deviations.insert((x - median).abs());
    }
    let mad = deviations.median();

    let half_width = k * MAD_SCALE * mad;
    Some(Band {
        lower: median - half_width,
        upper: median + half_width,
    })
}

/// Fixed-capacity rolling window of rate observations plus the band
/// multiplier, refreshed on every new observation.
#[derive(Debug, Clone)]
pub struct OutlierFilter {
    window: VecDeque<f64>,
    capacity: usize,
    k: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_K)
    }
}

impl OutlierFilter {
    pub fn new(capacity: usize, k: f64) -> Self {
        OutlierFilter {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
            k,
        }
    }

    /// Records a new observation, evicting the oldest once full.
    pub fn push(&mut self, sample: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }

    /// Current acceptance band, `None` until 2 observations exist.
    pub fn band(&self) -> Option<Band> {
        let window: Vec<f64> = self.window.iter().copied().collect();
        acceptance_band(&window, self.k)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}
