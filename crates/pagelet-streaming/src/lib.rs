//! Shell-first response streaming for pagelet fragments.
//!
//! This crate enforces the write protocol of a pagelet response:
//! - `FragmentSink` - Shell first, then fragments, close once nothing is outstanding
//! - `Shell` - Document wrapper around the root pagelet
//! - `FlushPolicy` - Explicit flush control

mod flush;
mod shell;
mod sink;

pub use flush::*;
pub use shell::*;
pub use sink::*;
