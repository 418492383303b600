//! SpreadLab Core — spread model, execution algorithms, streaming outlier filter.
//!
//! This crate contains the live-trading heart of the system:
//! - Domain types (ticks, bars, orders, trades, contracts)
//! - The multi-leg spread model with derived pricing and volume mapping
//! - Streaming median / MAD acceptance band for spread-rate validation
//! - Taker and maker execution algorithms with passive-leg hedging
//! - The algo engine that drives concurrent algos from a single dispatch thread

pub mod algo;
pub mod domain;
pub mod engine;
pub mod filter;
pub mod spread;
