//! kvlb-core: Core types for kvlb
//!
//! This crate provides the fundamental types shared by the discovery and
//! balancing layers:
//! - Address records, discovery keys and snapshots
//! - Weight parsing for published values
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
