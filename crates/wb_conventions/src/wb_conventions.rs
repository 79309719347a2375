//! Wiren Board Conventions - Static tables for the sensor/actuator topic convention
//!
//! This crate contains the pure lookup data the discovery bridge consumes:
//! - The closed set of control types and their measurement metadata
//! - Identifier normalization for discovery unique ids
//! - Topic builders for the `/devices/...` namespace
//!
//! Nothing in here performs I/O or holds state.

mod control_type;
mod ids;
mod topics;

pub use control_type::*;
pub use ids::*;
pub use topics::*;
