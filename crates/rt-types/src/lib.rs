//! # rt-types
//!
//! Core types shared by every RTune crate: tagged values and typed sample
//! histories, per-kind lifecycles, update schedules, provider/applier
//! capabilities, errors and configuration.

pub mod config;
pub mod errors;
pub mod schedule;
pub mod slot;
pub mod status;
pub mod value;

pub use config::*;
pub use errors::*;
pub use schedule::*;
pub use slot::*;
pub use status::*;
pub use value::*;
