//! Streaming statistics used to validate spread-rate quotes.

pub mod median;
pub mod outlier;

pub use median::StreamingMedian;
pub use outlier::{acceptance_band, Band, OutlierFilter, MAD_SCALE};
