//! SyncPlot Data Model
//!
//! Defines the data contracts shared by synchronization and rendering:
//! - **TimeSeries:** timestamp-indexed numeric columns
//! - **Groups:** column selection and plot-axis grouping
//! - **Config:** TOML job description (video, sensors, render settings)
//! - **Loader:** CSV readers for sensor, camera-IMU and skeleton data

pub mod config;
pub mod dimensions;
pub mod groups;
pub mod loader;
pub mod timeseries;

pub use config::*;
pub use dimensions::*;
pub use groups::*;
pub use loader::*;
pub use timeseries::*;
