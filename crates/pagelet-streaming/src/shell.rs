//! Document shell wrapped around the root pagelet.

use pagelet_codec::escape_html;

/// Head content for the shell.
#[derive(Debug, Clone, Default)]
pub struct HeadContent {
    pub title: Option<String>,
    /// `(name, content)` meta tags.
    pub meta: Vec<(String, String)>,
    /// Stylesheet hrefs.
    pub stylesheets: Vec<String>,
    /// Script srcs, loaded before any fragment arrives.
    pub scripts: Vec<String>,
}

impl HeadContent {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.meta.push((name.to_string(), content.to_string()));
        self
    }

    pub fn with_stylesheet(mut self, href: &str) -> Self {
        self.stylesheets.push(href.to_string());
        self
    }

    /// Load a script, typically the client runtime that mounts fragments.
    pub fn with_script(mut self, src: &str) -> Self {
        self.scripts.push(src.to_string());
        self
    }

    pub fn render(&self) -> String {
        let mut html = String::new();

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
        }
        for (name, content) in &self.meta {
            html.push_str(&format!(
                "<meta name=\"{}\" content=\"{}\">\n",
                escape_html(name),
                escape_html(content)
            ));
        }
        for href in &self.stylesheets {
            html.push_str(&format!(
                "<link rel=\"stylesheet\" href=\"{}\">\n",
                escape_html(href)
            ));
        }
        for src in &self.scripts {
            html.push_str(&format!("<script src=\"{}\"></script>\n", escape_html(src)));
        }

        html
    }
}

/// Document around the root pagelet's markup.
///
/// Streaming modes write [`Shell::render_opening`] together with the root
/// markup, fragments after it, and [`Shell::render_closing`] last. Sync mode
/// writes [`Shell::wrap`] in one piece.
#[derive(Debug, Clone)]
pub struct Shell {
    pub doctype: bool,
    pub head: HeadContent,
    /// Written after `<head>`, before the root markup.
    pub body_start: String,
    /// Written after the last fragment.
    pub body_end: String,
}

impl Shell {
    pub fn new(head: HeadContent) -> Self {
        Self {
            doctype: true,
            head,
            body_start: "<body>\n".to_string(),
            body_end: "</body>\n</html>".to_string(),
        }
    }

    /// Shell that writes nothing around the markup.
    pub fn bare() -> Self {
        Self {
            doctype: false,
            head: HeadContent::default(),
            body_start: String::new(),
            body_end: String::new(),
        }
    }

    pub fn with_body_start(mut self, html: impl Into<String>) -> Self {
        self.body_start = html.into();
        self
    }

    pub fn with_body_end(mut self, html: impl Into<String>) -> Self {
        self.body_end = html.into();
        self
    }

    fn is_bare(&self) -> bool {
        !self.doctype && self.body_start.is_empty() && self.body_end.is_empty()
    }

    /// Everything before the root markup.
    pub fn render_opening(&self) -> String {
        if self.is_bare() {
            return String::new();
        }

        let mut html = String::new();
        if self.doctype {
            html.push_str("<!DOCTYPE html>\n");
        }
        html.push_str("<html>\n<head>\n");
        html.push_str(&self.head.render());
        html.push_str("</head>\n");
        html.push_str(&self.body_start);
        html
    }

    pub fn render_closing(&self) -> String {
        self.body_end.clone()
    }

    /// Full document around `markup`.
    pub fn wrap(&self, markup: &str) -> String {
        format!("{}{}{}", self.render_opening(), markup, self.render_closing())
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(HeadContent::default())
    }
}
