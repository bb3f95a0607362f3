//! Markup sanitation applied before embedding.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static comment pattern"));

/// Remove every terminated HTML comment. Not an HTML parser: an unterminated
/// `<!--` is left as is.
pub fn strip_comments(markup: &str) -> String {
    COMMENT.replace_all(markup, "").into_owned()
}

/// Escape `& < > " '` for HTML text and attribute contexts.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape every string leaf of a state value. Keys are left alone.
pub fn escape_state(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_html(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(escape_state).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, escape_state(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("<p>a<!-- x -->b</p>"), "<p>ab</p>");
        assert_eq!(strip_comments("<!--1--><i/><!--\n2\n-->"), "<i/>");
        assert_eq!(strip_comments("<p><!-- open"), "<p><!-- open");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_escape_state_only_touches_string_leaves() {
        let state = json!({
            "<k>": "<b>",
            "n": 1,
            "list": ["&", true, null],
            "nested": {"q": "\""}
        });

        let escaped = escape_state(state);
        assert_eq!(
            escaped,
            json!({
                "<k>": "&lt;b&gt;",
                "n": 1,
                "list": ["&amp;", true, null],
                "nested": {"q": "&quot;"}
            })
        );
    }
}
