//! SyncPlot Common Utilities
//!
//! Shared infrastructure for all SyncPlot crates:
//! - Error types and result aliases
//! - Stream timestamps and offsets
//! - Tracing/logging initialization
//! - Application configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
