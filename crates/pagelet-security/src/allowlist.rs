//! Allow-list of methods a substream may invoke.

use serde::{Deserialize, Serialize};

/// Result type for allowlist operations.
pub type AllowlistResult<T> = Result<T, AllowlistError>;

/// Errors from allowlist operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllowlistError {
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Methods callable over an RPC substream. Anything not listed is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodAllowlist {
    /// Allowed exact method names.
    allowed_methods: Vec<String>,
    /// Allowed method patterns (one `*` wildcard).
    allowed_patterns: Vec<String>,
}

impl MethodAllowlist {
    /// Create an empty allowlist (deny everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from declared names; entries containing `*` become patterns.
    pub fn from_names(names: &[String]) -> AllowlistResult<Self> {
        names.iter().try_fold(Self::new(), |list, name| {
            if name.contains('*') {
                validate_pattern(name)?;
                Ok(list.allow_pattern(name.clone()))
            } else {
                Ok(list.allow_method(name.clone()))
            }
        })
    }

    /// Allow a specific method.
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Allow a method pattern, e.g. `cart.*`.
    pub fn allow_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_patterns.push(pattern.into());
        self
    }

    /// Check whether a method may be invoked.
    pub fn check(&self, method: &str) -> AllowlistResult<()> {
        if self.allowed_methods.iter().any(|m| m == method) {
            return Ok(());
        }

        if self
            .allowed_patterns
            .iter()
            .any(|p| matches_pattern(method, p))
        {
            return Ok(());
        }

        Err(AllowlistError::MethodNotAllowed(method.to_string()))
    }

    pub fn is_allowed(&self, method: &str) -> bool {
        self.check(method).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed_methods.is_empty() && self.allowed_patterns.is_empty()
    }
}

fn validate_pattern(pattern: &str) -> AllowlistResult<()> {
    if pattern.matches('*').count() > 1 {
        return Err(AllowlistError::InvalidPattern(pattern.to_string()));
    }
    Ok(())
}

fn matches_pattern(method: &str, pattern: &str) -> bool {
    match pattern.split_once('*') {
        None => method == pattern,
        Some((prefix, suffix)) => {
            method.len() >= prefix.len() + suffix.len()
                && method.starts_with(prefix)
                && method.ends_with(suffix)
        }
    }
}
