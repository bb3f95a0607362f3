//! Core abstractions for the pagelet lifecycle engine.
//!
//! This crate provides the fundamental types and traits:
//! - `PageletConfig` - Immutable per-kind configuration
//! - `DataSource` / `Template` - Capabilities a pagelet kind is built from
//! - `RequestContext` - Typed request parameters
//! - `PageletId` - Process-unique instance ids
//! - `LifecyclePhase` - Response lifecycle tracking

mod capability;
mod config;
mod context;
mod error;
mod id;
mod lifecycle;

pub use capability::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use id::*;
pub use lifecycle::*;
