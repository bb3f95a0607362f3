//! Explicit flush control - no implicit buffering.

use serde::{Deserialize, Serialize};

/// When the sink flushes the underlying response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush once the shell is written; fragments ride the next flush.
    AfterShell,
    /// Flush after the shell and after every fragment.
    #[default]
    AfterEachFragment,
    /// Only flush on explicit request or close.
    Manual,
}

impl FlushPolicy {
    pub fn flush_after_shell(&self) -> bool {
        matches!(self, Self::AfterShell | Self::AfterEachFragment)
    }

    pub fn flush_after_fragment(&self) -> bool {
        matches!(self, Self::AfterEachFragment)
    }
}
