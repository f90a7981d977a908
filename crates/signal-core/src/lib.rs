//! SyncPlot Signal Core
//!
//! Brings independently clocked streams onto a common timeline:
//! - **Signal:** normalization, resampling, magnitude, gradient, rate inference
//! - **Correlation:** full cross-correlation and lag estimation
//! - **Synchronizer:** offset of a sensor stream relative to the video's own data
//!
//! This crate is pure computation. No I/O, no rendering.

pub mod correlation;
pub mod interpolate;
pub mod signal;
pub mod synchronizer;

pub use correlation::{cross_correlation, cross_correlation_offset, CorrelationPeak};
pub use interpolate::Interpolation;
pub use synchronizer::{compute_offset, compute_offset_report, SyncReport};
