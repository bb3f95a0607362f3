//! Discovery, rendering and dispatch of pagelet trees.
//!
//! This crate drives pagelets through a request:
//! - `PageletKind` / `PageletTree` - Declared kinds composed into an arena
//! - `InstancePool` - Reusable per-request instances
//! - `discover` - Resolve candidate groups into enabled and disabled children
//! - `render` - Data, template and error view for one pagelet
//! - `Engine` - Sync, async and ordered streaming of whole responses

mod config;
mod discovery;
mod engine;
mod fallback;
mod kind;
mod ordering;
mod pagelet;
mod pipeline;
mod pool;
mod tree;

pub use config::*;
pub use discovery::*;
pub use engine::*;
pub use fallback::*;
pub use kind::*;
pub use ordering::*;
pub use pagelet::*;
pub use pipeline::*;
pub use pool::*;
pub use tree::*;
