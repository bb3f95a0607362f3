//! Generic failure fragments for errors no error view absorbed.

use pagelet_codec::{encode, escape_html, Envelope, FragmentMeta};
use pagelet_core::{Environment, PageletError};
use serde_json::json;

/// Markup standing in for a pagelet whose render failed unrecoverably.
///
/// The error message is only included outside production.
pub fn failure_markup(name: &str, error: &PageletError, env: Environment) -> String {
    let detail = if env.is_verbose() {
        format!(": {}", escape_html(&error.to_string()))
    } else {
        String::new()
    };
    format!(
        r#"<div class="pagelet-error" data-pagelet="{name}">Failed to render {name}{detail}</div>"#,
        name = escape_html(name),
    )
}

/// Envelope carrying [`failure_markup`] for a streamed response.
pub fn failure_envelope(meta: &FragmentMeta, error: &PageletError, env: Environment) -> Envelope {
    tracing::error!(pagelet = %meta.name, id = %meta.id, error = %error, "render failed without error view");
    encode(meta, &failure_markup(&meta.name, error, env), &json!({}))
}
