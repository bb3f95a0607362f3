//! Resolving a pagelet's candidate groups into enabled and disabled children.

use pagelet_core::RequestContext;

use crate::pagelet::Pagelet;
use crate::pool::InstancePool;
use crate::tree::{NodeId, PageletTree};

/// Outcome of discovering one pagelet's children.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Group winners, in group order.
    pub enabled: Vec<Pagelet>,
    /// Last rejected candidate of every group without a winner, in group order.
    pub disabled: Vec<Pagelet>,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }

    /// Hand the children to their parent.
    pub fn attach(self, parent: &mut Pagelet) {
        parent.set_children(self.enabled, self.disabled);
    }
}

/// Discover the children of `node` for this request.
///
/// Groups are resolved one after another; inside a group candidates are
/// tried strictly in declaration order and the first active one wins. Each
/// candidate's check sees the names of the candidates after it. Rejected
/// candidates go back to the pool as soon as they are superseded, except the
/// last one of a group without a winner, which becomes the group's disabled
/// placeholder. Enabled children have their `initialize` hook run before
/// this returns.
pub async fn discover(
    tree: &PageletTree,
    node: NodeId,
    pool: &InstancePool,
    req: &RequestContext,
) -> Discovery {
    let groups = tree.node(node).groups();
    let mut discovery = Discovery::default();
    if groups.is_empty() {
        return discovery;
    }

    for (slot, group) in groups.iter().enumerate() {
        let mut last: Option<Pagelet> = None;
        let mut winner: Option<Pagelet> = None;

        for (i, &candidate) in group.iter().enumerate() {
            let alternates: Vec<String> = group[i + 1..]
                .iter()
                .map(|id| tree.node(*id).name().to_string())
                .collect();

            let mut pagelet = pool.acquire(tree, candidate);
            pagelet.set_slot(slot);
            let accepted = pagelet.resolve(req, &alternates).await.is_active();

            if let Some(previous) = last.take() {
                pool.release(previous);
            }
            if accepted {
                winner = Some(pagelet);
                break;
            }
            last = Some(pagelet);
        }

        match (winner, last) {
            (Some(pagelet), _) => discovery.enabled.push(pagelet),
            (None, Some(pagelet)) => discovery.disabled.push(pagelet),
            (None, None) => {}
        }
    }

    for child in &mut discovery.enabled {
        if let Some(hook) = child.kind().initialize().cloned() {
            hook(child);
        }
    }

    tracing::debug!(
        pagelet = tree.node(node).name(),
        enabled = discovery.enabled.len(),
        disabled = discovery.disabled.len(),
        "discovered children"
    );
    discovery
}
