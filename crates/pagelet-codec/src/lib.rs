//! Fragment envelope encoding for the pagelet client runtime.
//!
//! This crate provides:
//! - `encode` - Package rendered markup and state into an `Envelope`
//! - `strip_comments` / `escape_html` - Markup sanitation
//! - `to_safe_value` - Serializer that tolerates failing `Serialize` impls

mod envelope;
mod safe;
mod sanitize;

pub use envelope::*;
pub use safe::*;
pub use sanitize::*;
