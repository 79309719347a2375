//! Wiren Board → Home Assistant discovery bridge
//!
//! This crate provides the Discovery Synchronization Engine and its plumbing:
//! - Topic classification and metadata parsing (`router`, `meta`)
//! - The live device/control model (`registry`)
//! - Control → entity mapping and light compositing (`mapper`, `compositor`)
//! - Discovery documents (`payload`)
//! - Debounced publishing and stale topic cleanup (`scheduler`, `reconciler`)
//! - The single-writer event loop (`engine`)
//! - The message bus seam and its MQTT implementation (`transport`)

mod error;

pub mod compositor;
pub mod config;
pub mod engine;
pub mod logging;
pub mod mapper;
pub mod meta;
pub mod payload;
pub mod reconciler;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod transport;

pub use config::Config;
pub use engine::DiscoveryEngine;
pub use error::{Error, Result};
