//! Fragment envelope: the wire unit consumed by the client runtime.

use pagelet_core::{PageletId, RenderMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::safe::to_safe_value;
use crate::sanitize::{escape_html, escape_state, strip_comments};

/// Errors from encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity and flags of the pagelet a fragment belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentMeta {
    pub id: PageletId,
    pub name: String,
    pub mode: RenderMode,
    pub remove: bool,
    pub append: bool,
    pub parent: Option<String>,
}

/// One encoded fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub name: String,
    pub mode: RenderMode,
    pub remove: bool,
    #[serde(default)]
    pub append: bool,
    pub parent: Option<String>,
    /// Fragments still owed to the client when this one was written,
    /// itself included. Zero until the response writer fills it in.
    #[serde(default)]
    pub remaining: usize,
    pub state: Value,
    pub markup: String,
}

/// Everything but the markup; this is what lands in the state script.
#[derive(Serialize)]
struct StatePayload<'a> {
    id: &'a str,
    name: &'a str,
    mode: RenderMode,
    remove: bool,
    append: bool,
    parent: Option<&'a str>,
    remaining: usize,
    state: &'a Value,
}

/// Package rendered markup and client state into an envelope.
///
/// Comments are stripped from the markup. The state is serialized with
/// `serde_json`; if that fails the safe serializer is used instead. Every
/// string leaf of the resulting state is HTML-escaped.
pub fn encode<S>(meta: &FragmentMeta, markup: &str, state: &S) -> Envelope
where
    S: Serialize + ?Sized,
{
    let state = match serde_json::to_value(state) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(pagelet = %meta.name, id = %meta.id, error = %err, "state not serializable, using safe serializer");
            to_safe_value(state)
        }
    };

    Envelope {
        id: meta.id.to_string(),
        name: meta.name.clone(),
        mode: meta.mode,
        remove: meta.remove,
        append: meta.append,
        parent: meta.parent.clone(),
        remaining: 0,
        state: escape_state(state),
        markup: strip_comments(markup),
    }
}

impl Envelope {
    /// Render the client template: the markup inside a named `<template>`
    /// followed by a JSON script carrying the metadata and state.
    pub fn to_html(&self) -> String {
        let payload = StatePayload {
            id: &self.id,
            name: &self.name,
            mode: self.mode,
            remove: self.remove,
            append: self.append,
            parent: self.parent.as_deref(),
            remaining: self.remaining,
            state: &self.state,
        };
        // Serializing a struct of plain fields into a string cannot fail.
        let json = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());

        format!(
            r#"<template data-pagelet="{name}" data-pagelet-id="{id}">{markup}</template><script type="application/json" data-pagelet-state="{id}">{state}</script>"#,
            name = escape_html(&self.name),
            id = escape_html(&self.id),
            markup = self.markup,
            state = json.replace("</", "<\\/"),
        )
    }

    /// Structured JSON form.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Fragment with no content, sent for an inactive pagelet.
    pub fn is_empty(&self) -> bool {
        self.markup.is_empty()
    }
}
