//! Error taxonomy shared by the engine crates.

use crate::config::ConfigError;

/// Error type for pagelet operations.
#[derive(Debug, thiserror::Error)]
pub enum PageletError {
    #[error("invalid pagelet configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("The {0} pagelet should have a view")]
    MissingView(String),

    #[error("pagelet '{0}' declares an empty candidate group")]
    EmptyGroup(String),

    /// Rendering failed and the kind has no error view. `source` is the
    /// original fetch or template error, untouched.
    #[error("failed to render pagelet '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Shell not sent before fragments")]
    ShellNotSent,

    #[error("Streaming error: {0}")]
    Stream(String),
}

impl PageletError {
    /// Take back the original render error, if this is one.
    pub fn into_render_source(self) -> Option<anyhow::Error> {
        match self {
            Self::Render { source, .. } => Some(source),
            _ => None,
        }
    }
}
