//! Framecast Common Utilities
//!
//! Shared infrastructure for all Framecast crates:
//! - Error taxonomy and result aliases
//! - Timing utilities for per-frame measurements and progress estimates
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
