//! Shared types for splsensors.
//!
//! Error type, session and observation models, timestamp parsing, report
//! formatting helpers and command-line settings used by the data and runtime
//! layers.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{Result, SplError};
