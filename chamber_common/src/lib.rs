//! Chamber Common Library
//!
//! Shared constants, configuration loading, process-variable types and the
//! device port contract used by every crate in the chamber workspace.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and the chamber config tree
//! - [`consts`] - Default register map, limits and timings
//! - [`port`] - `DevicePort` trait, `PortError` and the shared port handle
//! - [`types`] - Process variables, bounds and register value encoding
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use chamber_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod port;
pub mod prelude;
pub mod types;
