//! Data layer for splsensors.
//!
//! Extracts navigation sessions from position files, reads sensor start times,
//! assigns observations to sessions and builds the flat and session-wide views
//! used by the reports.

pub mod aggregator;
pub mod analysis;
pub mod anomalies;
pub mod locator;
pub mod matcher;
pub mod navigation;
pub mod sensors;

pub use splsensors_core as core;
