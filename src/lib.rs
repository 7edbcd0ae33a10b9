//! Interaction-model provider library.
//!
//! Answers the capability-tree queries and read/write/invoke dispatch a
//! Matter-style protocol engine needs, on top of a static registry and
//! per-cluster server objects.

pub mod config;
pub mod error;
pub mod matter;

pub use error::{ProviderError, Result};
