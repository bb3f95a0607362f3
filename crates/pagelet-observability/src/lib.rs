//! Observability for the pagelet lifecycle engine.
//!
//! This crate provides:
//! - `init_logging` - Install a `tracing` subscriber (human or JSON output)
//! - `ResponseMetrics` - Per-response timing derived from a `ServeReport`

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;

// Re-export the timing types metrics are built from
pub use pagelet_core::{RequestId, TimingContext};
