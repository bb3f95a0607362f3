//! Pagelet kinds: immutable declarations shared by every instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use pagelet_core::{
    ConfigError, Data, DataSource, EmptyData, EventListener, FormHandler, PageletConfig,
    PageletError, RpcMethod, Template,
};
use pagelet_security::{Condition, MethodAllowlist};

use crate::pagelet::Pagelet;

/// Hook run on every enabled child right after discovery.
pub type InitializeHook = Arc<dyn Fn(&mut Pagelet) + Send + Sync>;

/// A declared pagelet kind.
///
/// Built once with [`PageletKind::builder`] and validated there; cloning is
/// cheap and every clone refers to the same declaration.
#[derive(Clone)]
pub struct PageletKind {
    inner: Arc<KindInner>,
}

struct KindInner {
    config: PageletConfig,
    allowlist: MethodAllowlist,
    condition: Option<Condition>,
    data: Arc<dyn DataSource>,
    view: Option<Arc<dyn Template>>,
    error_view: Option<Arc<dyn Template>>,
    initialize: Option<InitializeHook>,
    methods: HashMap<String, Arc<dyn RpcMethod>>,
    listeners: HashMap<String, Arc<dyn EventListener>>,
    post: Option<Arc<dyn FormHandler>>,
    put: Option<Arc<dyn FormHandler>>,
    groups: Vec<Vec<PageletKind>>,
}

impl PageletKind {
    pub fn builder(name: impl Into<String>) -> PageletKindBuilder {
        PageletKindBuilder::new(PageletConfig::new(name))
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &PageletConfig {
        &self.inner.config
    }

    /// Methods callable over the substream, compiled from `config.rpc`.
    pub fn allowlist(&self) -> &MethodAllowlist {
        &self.inner.allowlist
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.inner.condition.as_ref()
    }

    pub fn data(&self) -> &Arc<dyn DataSource> {
        &self.inner.data
    }

    pub fn view(&self) -> Option<&Arc<dyn Template>> {
        self.inner.view.as_ref()
    }

    pub fn error_view(&self) -> Option<&Arc<dyn Template>> {
        self.inner.error_view.as_ref()
    }

    pub fn initialize(&self) -> Option<&InitializeHook> {
        self.inner.initialize.as_ref()
    }

    /// An exposed RPC method by name. Exposure alone does not make it
    /// callable; it must also pass the allow-list.
    pub fn method(&self, name: &str) -> Option<&Arc<dyn RpcMethod>> {
        self.inner.methods.get(name)
    }

    pub fn listener(&self, event: &str) -> Option<&Arc<dyn EventListener>> {
        self.inner.listeners.get(event)
    }

    pub fn post(&self) -> Option<&Arc<dyn FormHandler>> {
        self.inner.post.as_ref()
    }

    pub fn put(&self) -> Option<&Arc<dyn FormHandler>> {
        self.inner.put.as_ref()
    }

    /// Candidate groups of child kinds, in declaration order.
    pub fn groups(&self) -> &[Vec<PageletKind>] {
        &self.inner.groups
    }

    /// Render the primary view outside of a render cycle.
    pub fn template(&self, data: &Data) -> anyhow::Result<String> {
        match &self.inner.view {
            Some(view) => view.render(data),
            None => Ok(String::new()),
        }
    }

    /// Identity of the declaration, shared by all clones.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for PageletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageletKind")
            .field("name", &self.name())
            .field("mode", &self.inner.config.mode)
            .field("condition", &self.inner.condition)
            .field("groups", &self.inner.groups.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PageletKind`].
pub struct PageletKindBuilder {
    config: PageletConfig,
    condition: Option<Condition>,
    data: Arc<dyn DataSource>,
    view: Option<Arc<dyn Template>>,
    error_view: Option<Arc<dyn Template>>,
    initialize: Option<InitializeHook>,
    methods: HashMap<String, Arc<dyn RpcMethod>>,
    listeners: HashMap<String, Arc<dyn EventListener>>,
    post: Option<Arc<dyn FormHandler>>,
    put: Option<Arc<dyn FormHandler>>,
    groups: Vec<Vec<PageletKind>>,
}

impl PageletKindBuilder {
    pub fn new(config: PageletConfig) -> Self {
        Self {
            config,
            condition: None,
            data: Arc::new(EmptyData),
            view: None,
            error_view: None,
            initialize: None,
            methods: HashMap::new(),
            listeners: HashMap::new(),
            post: None,
            put: None,
            groups: Vec::new(),
        }
    }

    /// Replace the configuration; the name comes along with it.
    pub fn with_config(mut self, config: PageletConfig) -> Self {
        self.config = config;
        self
    }

    /// Adjust the configuration in place.
    pub fn configure(mut self, f: impl FnOnce(PageletConfig) -> PageletConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_data(mut self, data: impl DataSource + 'static) -> Self {
        self.data = Arc::new(data);
        self
    }

    pub fn with_view(mut self, view: Arc<dyn Template>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn with_error_view(mut self, view: Arc<dyn Template>) -> Self {
        self.error_view = Some(view);
        self
    }

    pub fn with_initialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Pagelet) + Send + Sync + 'static,
    {
        self.initialize = Some(Arc::new(hook));
        self
    }

    pub fn with_method(mut self, name: impl Into<String>, method: impl RpcMethod + 'static) -> Self {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    pub fn with_listener(
        mut self,
        event: impl Into<String>,
        listener: impl EventListener + 'static,
    ) -> Self {
        self.listeners.insert(event.into(), Arc::new(listener));
        self
    }

    pub fn with_post(mut self, handler: impl FormHandler + 'static) -> Self {
        self.post = Some(Arc::new(handler));
        self
    }

    pub fn with_put(mut self, handler: impl FormHandler + 'static) -> Self {
        self.put = Some(Arc::new(handler));
        self
    }

    /// Add a child slot with a single candidate.
    pub fn with_child(self, kind: PageletKind) -> Self {
        self.with_group(vec![kind])
    }

    /// Add a child slot with mutually exclusive candidates, tried in order.
    pub fn with_group(mut self, candidates: Vec<PageletKind>) -> Self {
        self.groups.push(candidates);
        self
    }

    pub fn build(self) -> Result<PageletKind, PageletError> {
        self.config.validate()?;

        let name = self.config.name.clone();
        if self.view.is_none() && !self.config.status().is_redirection() {
            return Err(PageletError::MissingView(name));
        }
        if self.groups.iter().any(|g| g.is_empty()) {
            return Err(PageletError::EmptyGroup(name));
        }

        let allowlist =
            MethodAllowlist::from_names(&self.config.rpc).map_err(|e| ConfigError::Invalid {
                field: "rpc",
                reason: e.to_string(),
            })?;

        Ok(PageletKind {
            inner: Arc::new(KindInner {
                config: self.config,
                allowlist,
                condition: self.condition,
                data: self.data,
                view: self.view,
                error_view: self.error_view,
                initialize: self.initialize,
                methods: self.methods,
                listeners: self.listeners,
                post: self.post,
                put: self.put,
                groups: self.groups,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use pagelet_core::{template_fn, RenderMode};
    use serde_json::json;

    use super::*;

    fn view() -> Arc<dyn Template> {
        template_fn(|_| Ok("<p/>".to_string()))
    }

    // === Validation Tests ===

    #[test]
    fn test_build_requires_view() {
        let err = PageletKind::builder("nav").build().unwrap_err();
        assert_eq!(err.to_string(), "The nav pagelet should have a view");
    }

    #[test]
    fn test_redirect_needs_no_view() {
        let kind = PageletKind::builder("login")
            .configure(|c| c.with_status_code(302))
            .build()
            .unwrap();
        assert_eq!(kind.template(&json!({})).unwrap(), "");
    }

    #[test]
    fn test_build_rejects_empty_name_and_query_key() {
        let err = PageletKind::builder("").with_view(view()).build().unwrap_err();
        assert!(matches!(err, PageletError::Config(ConfigError::Invalid { field: "name", .. })));

        let err = PageletKind::builder("a")
            .with_view(view())
            .configure(|c| c.with_query(&[""]))
            .build()
            .unwrap_err();
        assert!(matches!(err, PageletError::Config(ConfigError::Invalid { field: "query", .. })));
    }

    #[test]
    fn test_build_rejects_empty_group_and_bad_rpc_pattern() {
        let err = PageletKind::builder("a")
            .with_view(view())
            .with_group(Vec::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, PageletError::EmptyGroup(name) if name == "a"));

        let err = PageletKind::builder("a")
            .with_view(view())
            .configure(|c| c.with_rpc(&["a*b*"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, PageletError::Config(ConfigError::Invalid { field: "rpc", .. })));
    }

    // === Declaration Tests ===

    #[test]
    fn test_single_child_is_group_of_one() {
        let child = PageletKind::builder("child").with_view(view()).build().unwrap();
        let alt = PageletKind::builder("alt").with_view(view()).build().unwrap();
        let parent = PageletKind::builder("parent")
            .with_view(view())
            .with_child(child)
            .with_group(vec![alt.clone(), alt])
            .build()
            .unwrap();

        let sizes: Vec<usize> = parent.groups().iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_clones_share_declaration() {
        let kind = PageletKind::builder("a")
            .with_view(view())
            .configure(|c| c.with_mode(RenderMode::Sync).with_rpc(&["refresh"]))
            .build()
            .unwrap();
        let copy = kind.clone();

        assert_eq!(kind.key(), copy.key());
        assert_eq!(copy.config().mode, RenderMode::Sync);
        assert!(copy.allowlist().is_allowed("refresh"));
    }
}
