//! Detector Configuration Module
//!
//! Hyperparameters for a detection run, loaded from TOML with built-in
//! defaults.
//!
//! ## Loading Order
//!
//! 1. `DETECTOR_CONFIG` environment variable (path to TOML file)
//! 2. `detector.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is passed explicitly to the pipeline; there is no
//! process-wide config singleton.

mod detector_config;
pub mod validation;

pub use detector_config::*;
