//! Substream errors.

use pagelet_core::PageletError;
use pagelet_executor::Pagelet;
use pagelet_security::AllowlistError;

/// A pagelet that refused its substream. It comes back destroyed so the
/// caller can return it to its pool.
#[derive(Debug, thiserror::Error)]
#[error("pagelet '{}' rejected the substream", .pagelet.name())]
pub struct Rejected {
    pagelet: Pagelet,
}

impl Rejected {
    pub(crate) fn new(pagelet: Pagelet) -> Self {
        Self { pagelet }
    }

    pub fn name(&self) -> &str {
        self.pagelet.name()
    }

    pub fn into_pagelet(self) -> Pagelet {
        self.pagelet
    }
}

impl From<Rejected> for RpcError {
    fn from(rejected: Rejected) -> Self {
        Self::Unauthorized(rejected.name().to_string())
    }
}

/// Errors from connecting or dispatching. Everything except
/// [`RpcError::Unauthorized`], converted from [`Rejected`], is answered on
/// the channel, never raised.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("pagelet '{0}' rejected the substream")]
    Unauthorized(String),

    #[error(transparent)]
    NotAllowed(#[from] AllowlistError),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("message has no method")]
    MissingMethod,

    #[error("pagelet '{pagelet}' has no {verb} handler")]
    MissingHandler { pagelet: String, verb: &'static str },

    #[error("unsupported message type: {0}")]
    Unsupported(String),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Render(#[from] PageletError),

    #[error("{0}")]
    Handler(anyhow::Error),
}

impl RpcError {
    /// Error name sent to the client.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "Unauthorized",
            Self::NotAllowed(_) => "MethodNotAllowed",
            Self::UnknownMethod(_) => "UnknownMethod",
            Self::MissingMethod => "MissingMethod",
            Self::MissingHandler { .. } => "MissingHandler",
            Self::Unsupported(_) => "UnsupportedMessage",
            Self::Malformed(_) => "MalformedFrame",
            Self::Render(_) => "RenderError",
            Self::Handler(_) => "Error",
        }
    }
}
