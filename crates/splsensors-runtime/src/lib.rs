//! Runtime layer for splsensors.
//!
//! Pre-flight validation, whole-run orchestration across sensor families,
//! rename/move execution, the CSV exports and the consolidated workbook.

pub mod actions;
pub mod orchestrator;
pub mod preflight;
pub mod report;

pub use splsensors_core as core;
pub use splsensors_data as data;
