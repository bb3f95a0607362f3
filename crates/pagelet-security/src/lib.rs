//! Authorization and allow-listing for pagelets.
//!
//! This crate provides:
//! - `Condition` - Declared authorization check, simple or alternates-aware
//! - `Activation` - Memoized tri-state authorization result
//! - `authorize` - The resolver that memoizes a condition's verdict
//! - `MethodAllowlist` - Which methods a substream may invoke
//!
//! # Example
//!
//! ```ignore
//! use pagelet_security::{authorize, Activation, Condition, MethodAllowlist};
//!
//! let condition = Condition::when(|req| req.header("x-user").is_some());
//! let mut activation = Activation::Unresolved;
//! let verdict = authorize(Some(&condition), &mut activation, &req, &[]).await;
//!
//! let allowlist = MethodAllowlist::new()
//!     .allow_method("refresh")
//!     .allow_pattern("cart.*");
//! allowlist.check("cart.add")?;
//! ```

mod activation;
mod allowlist;

pub use activation::*;
pub use allowlist::*;
