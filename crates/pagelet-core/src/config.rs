//! Pagelet kind configuration.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How a pagelet and its children are written to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Render the whole tree, then write one document.
    #[serde(rename = "sync")]
    Sync,
    /// Write the shell, then each fragment as soon as it is ready.
    #[default]
    #[serde(rename = "async")]
    AsyncStream,
    /// Like `AsyncStream`, but fragments are released in declaration order.
    #[serde(rename = "pipeline")]
    OrderedStream,
}

impl RenderMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::AsyncStream => "async",
            Self::OrderedStream => "pipeline",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment tag forwarded to error views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Read `PAGELET_ENV`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("PAGELET_ENV")
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    /// Parse an environment name; unknown names mean development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    /// Whether verbose failure details should be logged.
    pub fn is_verbose(&self) -> bool {
        !matches!(self, Self::Production)
    }
}

/// Immutable configuration of one pagelet kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageletConfig {
    /// Name shared by every instance of the kind.
    pub name: String,
    /// Dispatch mode used when this kind is the root of a response.
    #[serde(default)]
    pub mode: RenderMode,
    /// Ask the client to remove the placeholder when inactive.
    #[serde(default = "default_remove")]
    pub remove: bool,
    /// Append the fragment client-side instead of replacing.
    #[serde(default)]
    pub append: bool,
    /// Dot-paths of the data forwarded to the client as state.
    #[serde(default)]
    pub query: Vec<String>,
    /// Method names callable over the RPC substream.
    #[serde(default)]
    pub rpc: Vec<String>,
    /// Status code sent when this kind is the response root.
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_remove() -> bool {
    true
}

fn default_status_code() -> u16 {
    200
}

fn default_charset() -> String {
    "UTF-8".to_string()
}

fn default_content_type() -> String {
    "text/html".to_string()
}

impl PageletConfig {
    /// Create a configuration with defaults for the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: RenderMode::default(),
            remove: default_remove(),
            append: false,
            query: Vec::new(),
            rpc: Vec::new(),
            status_code: default_status_code(),
            charset: default_charset(),
            content_type: default_content_type(),
        }
    }

    /// Parse a configuration from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the render mode.
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the remove-when-inactive flag.
    pub fn with_remove(mut self, remove: bool) -> Self {
        self.remove = remove;
        self
    }

    /// Set the append flag.
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Set the state query keys.
    pub fn with_query(mut self, keys: &[&str]) -> Self {
        self.query = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the RPC allow-list.
    pub fn with_rpc(mut self, methods: &[&str]) -> Self {
        self.rpc = methods.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the response status code.
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(key) = self.query.iter().find(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "query",
                reason: format!("empty key {:?}", key),
            });
        }
        if self.rpc.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "rpc",
                reason: "method names must not be empty".to_string(),
            });
        }
        StatusCode::from_u16(self.status_code).map_err(|e| ConfigError::Invalid {
            field: "status_code",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Status code as a typed value.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK)
    }

    /// Full `Content-Type` header value.
    pub fn content_type_header(&self) -> String {
        format!("{};charset={}", self.content_type, self.charset)
    }
}
