//! Per-pagelet RPC substreams.
//!
//! This crate routes client messages to a connected pagelet:
//! - `RpcMessage` - JSON wire message, correlated by `id`
//! - `connect` - Authorize a pagelet and open its substream
//! - `Connection` - Dispatch `rpc`, `emit`, `get`, `post` and `put` messages
//! - `RpcError` - Failures reported back as correlated error replies

mod dispatcher;
mod error;
mod message;

pub use dispatcher::*;
pub use error::*;
pub use message::*;
