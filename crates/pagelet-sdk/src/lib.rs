//! Public SDK for the pagelet lifecycle engine.
//!
//! This crate re-exports the whole engine:
//!
//! ```ignore
//! use pagelet_sdk::prelude::*;
//!
//! let reviews = PageletKind::builder("reviews")
//!     .with_data(ReviewSource::new(client))
//!     .with_view(template_fn(|d| Ok(render_reviews(d))))
//!     .with_condition(Condition::when(|req| req.header("x-user").is_some()))
//!     .build()?;
//! let page = PageletKind::builder("product")
//!     .configure(|c| c.with_mode(RenderMode::AsyncStream))
//!     .with_view(template_fn(|d| Ok(render_product(d))))
//!     .with_child(reviews)
//!     .build()?;
//!
//! let tree = PageletTree::compose(page)?;
//! let report = Engine::default().serve(&tree, &req, response_sink).await?;
//! ResponseMetrics::from_report(&req, "product", &report).record();
//! ```

pub use pagelet_codec;
pub use pagelet_core;
pub use pagelet_executor;
pub use pagelet_observability;
pub use pagelet_rpc;
pub use pagelet_security;
pub use pagelet_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use pagelet_codec::*;
    pub use pagelet_core::*;
    pub use pagelet_executor::*;
    pub use pagelet_observability::*;
    pub use pagelet_rpc::*;
    pub use pagelet_security::*;
    pub use pagelet_streaming::*;
}
