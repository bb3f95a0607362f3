//! Per-request pagelet instances.

use futures::channel::mpsc::UnboundedSender;
use pagelet_codec::FragmentMeta;
use pagelet_core::{PageletId, RequestContext};
use pagelet_security::{authorize, Activation};

use crate::kind::PageletKind;
use crate::tree::NodeId;

/// Outbound half of a pagelet's substream; frames are JSON text.
pub type Substream = UnboundedSender<String>;

/// One pagelet taking part in one request cycle.
///
/// Instances come from an [`InstancePool`](crate::InstancePool). Discovery
/// fills in the enabled and disabled children once; after that they are
/// only read.
#[derive(Debug)]
pub struct Pagelet {
    id: PageletId,
    node: NodeId,
    slot: usize,
    kind: PageletKind,
    parent: Option<String>,
    activation: Activation,
    enabled: Vec<Pagelet>,
    disabled: Vec<Pagelet>,
    substream: Option<Substream>,
    released: bool,
}

impl Pagelet {
    pub(crate) fn new(node: NodeId, kind: PageletKind, parent: Option<String>) -> Self {
        Self {
            id: PageletId::next(),
            node,
            slot: 0,
            kind,
            parent,
            activation: Activation::Unresolved,
            enabled: Vec::new(),
            disabled: Vec::new(),
            substream: None,
            released: false,
        }
    }

    /// Reset a released instance for another cycle.
    pub(crate) fn recycle(&mut self, node: NodeId, parent: Option<String>) {
        self.id = PageletId::next();
        self.node = node;
        self.slot = 0;
        self.parent = parent;
        self.activation = Activation::Unresolved;
        self.released = false;
    }

    pub fn id(&self) -> PageletId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Index of the candidate group this instance occupies in its parent.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: usize) {
        self.slot = slot;
    }

    pub fn kind(&self) -> &PageletKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    /// Resolve, or return the memoized, authorization for this request.
    pub async fn resolve(&mut self, req: &RequestContext, alternates: &[String]) -> Activation {
        authorize(self.kind.condition(), &mut self.activation, req, alternates).await
    }

    pub fn enabled(&self) -> &[Pagelet] {
        &self.enabled
    }

    pub fn disabled(&self) -> &[Pagelet] {
        &self.disabled
    }

    /// An enabled child by name.
    pub fn child(&self, name: &str) -> Option<&Pagelet> {
        self.enabled.iter().find(|p| p.name() == name)
    }

    pub(crate) fn set_children(&mut self, enabled: Vec<Pagelet>, disabled: Vec<Pagelet>) {
        self.enabled = enabled;
        self.disabled = disabled;
    }

    /// Enabled and disabled children merged back into declaration order.
    pub(crate) fn take_children(&mut self) -> Vec<Pagelet> {
        let mut children: Vec<Pagelet> = self.enabled.drain(..).chain(self.disabled.drain(..)).collect();
        children.sort_by_key(|p| p.slot);
        children
    }

    pub(crate) fn children_mut(&mut self) -> impl Iterator<Item = &mut Pagelet> {
        self.enabled.iter_mut().chain(self.disabled.iter_mut())
    }

    pub fn attach_substream(&mut self, substream: Substream) {
        self.substream = Some(substream);
    }

    pub fn substream(&self) -> Option<&Substream> {
        self.substream.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Tear the instance down: destroy children, drop the substream.
    /// Destroying twice does nothing.
    pub fn destroy(&mut self) {
        if self.released {
            return;
        }
        for mut child in self.take_children() {
            child.destroy();
        }
        self.substream = None;
        self.released = true;
        tracing::trace!(pagelet = self.name(), id = %self.id, "destroyed");
    }

    /// Envelope metadata for the current activation. The mode is the one
    /// the kind declares, whatever mode the response is dispatched in.
    pub fn fragment_meta(&self) -> FragmentMeta {
        let config = self.kind.config();
        FragmentMeta {
            id: self.id,
            name: config.name.clone(),
            mode: config.mode,
            remove: !self.is_active() && config.remove,
            append: config.append,
            parent: self.parent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;
    use futures::StreamExt;
    use pagelet_core::{template_fn, RenderMode};
    use pagelet_security::Condition;

    use super::*;

    fn kind(name: &str, allowed: bool) -> PageletKind {
        PageletKind::builder(name)
            .with_view(template_fn(|_| Ok(String::new())))
            .with_condition(Condition::always(allowed))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_instances_get_fresh_ids() {
        let k = kind("a", true);
        let a = Pagelet::new(0, k.clone(), None);
        let b = Pagelet::new(0, k, None);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.activation(), Activation::Unresolved);
    }

    #[tokio::test]
    async fn test_fragment_meta_remove_only_when_inactive() {
        let mut on = Pagelet::new(1, kind("on", true), Some("page".to_string()));
        let mut off = Pagelet::new(2, kind("off", false), Some("page".to_string()));
        let req = RequestContext::get("/");
        on.resolve(&req, &[]).await;
        off.resolve(&req, &[]).await;

        let meta = on.fragment_meta();
        assert!(!meta.remove);
        assert_eq!(meta.parent.as_deref(), Some("page"));
        assert!(off.fragment_meta().remove);
    }

    #[test]
    fn test_fragment_meta_carries_declared_mode() {
        let kind = PageletKind::builder("clock")
            .with_view(template_fn(|_| Ok(String::new())))
            .configure(|c| c.with_mode(RenderMode::Sync))
            .build()
            .unwrap();
        let pagelet = Pagelet::new(1, kind, Some("page".to_string()));

        assert_eq!(pagelet.fragment_meta().mode, RenderMode::Sync);
    }

    #[test]
    fn test_child_lookup_and_order() {
        let mut parent = Pagelet::new(0, kind("page", true), None);
        let mut a = Pagelet::new(1, kind("a", true), None);
        let mut b = Pagelet::new(2, kind("b", false), None);
        a.set_slot(1);
        b.set_slot(0);
        parent.set_children(vec![a], vec![b]);

        assert!(parent.child("a").is_some());
        assert!(parent.child("b").is_none());

        let names: Vec<String> = parent.take_children().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_closes_substream() {
        let (tx, mut rx) = mpsc::unbounded();
        let mut pagelet = Pagelet::new(0, kind("page", true), None);
        pagelet.attach_substream(tx);
        pagelet.set_children(vec![Pagelet::new(1, kind("a", true), None)], Vec::new());

        pagelet.destroy();
        pagelet.destroy();

        assert!(pagelet.is_released());
        assert!(pagelet.substream().is_none());
        assert!(pagelet.enabled().is_empty());
        assert_eq!(rx.next().await, None);
    }
}
