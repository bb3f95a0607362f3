//! Composed pagelet trees stored as an arena of nodes.

use pagelet_core::PageletError;

use crate::kind::PageletKind;

/// Index of a node inside its [`PageletTree`].
pub type NodeId = usize;

/// One position in a composed tree.
#[derive(Debug, Clone)]
pub struct Node {
    kind: PageletKind,
    parent: Option<String>,
    groups: Vec<Vec<NodeId>>,
}

impl Node {
    pub fn kind(&self) -> &PageletKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Name of the parent pagelet, fixed at composition.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Candidate groups of this node, in declaration order.
    pub fn groups(&self) -> &[Vec<NodeId>] {
        &self.groups
    }
}

/// A root kind flattened into nodes.
///
/// Every occurrence of a kind gets its own node, so a kind used under two
/// parents ends up in two nodes with different parent names.
#[derive(Debug, Clone)]
pub struct PageletTree {
    nodes: Vec<Node>,
}

impl PageletTree {
    /// Flatten `root` and its descendants into an arena.
    pub fn compose(root: PageletKind) -> Result<Self, PageletError> {
        let mut nodes = vec![Node {
            kind: root,
            parent: None,
            groups: Vec::new(),
        }];

        let mut cursor = 0;
        while cursor < nodes.len() {
            let kind = nodes[cursor].kind.clone();
            let parent = kind.name().to_string();
            let mut groups = Vec::with_capacity(kind.groups().len());

            for group in kind.groups() {
                if group.is_empty() {
                    return Err(PageletError::EmptyGroup(parent));
                }
                let mut ids = Vec::with_capacity(group.len());
                for child in group {
                    ids.push(nodes.len());
                    nodes.push(Node {
                        kind: child.clone(),
                        parent: Some(parent.clone()),
                        groups: Vec::new(),
                    });
                }
                groups.push(ids);
            }

            nodes[cursor].groups = groups;
            cursor += 1;
        }

        tracing::debug!(root = nodes[0].name(), nodes = nodes.len(), "composed pagelet tree");
        Ok(Self { nodes })
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// # Panics
    ///
    /// If `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// First node, in breadth-first order, whose kind has this name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pagelet_core::template_fn;

    use super::*;

    fn kind(name: &str) -> PageletKind {
        PageletKind::builder(name)
            .with_view(template_fn(|_| Ok(String::new())))
            .build()
            .unwrap()
    }

    fn parent(name: &str, groups: Vec<Vec<PageletKind>>) -> PageletKind {
        groups
            .into_iter()
            .fold(
                PageletKind::builder(name).with_view(template_fn(|_| Ok(String::new()))),
                |b, g| b.with_group(g),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_compose_sets_parent_names() {
        let tree = PageletTree::compose(parent(
            "page",
            vec![vec![kind("a"), kind("b")], vec![kind("c")]],
        ))
        .unwrap();

        assert_eq!(tree.len(), 4);
        let root = tree.node(tree.root());
        assert_eq!(root.parent(), None);
        assert_eq!(root.groups(), &[vec![1, 2], vec![3]]);
        assert_eq!(tree.node(2).name(), "b");
        assert_eq!(tree.node(2).parent(), Some("page"));
    }

    #[test]
    fn test_shared_kind_gets_one_node_per_parent() {
        let shared = kind("avatar");
        let left = parent("left", vec![vec![shared.clone()]]);
        let right = parent("right", vec![vec![shared]]);
        let tree = PageletTree::compose(parent("page", vec![vec![left], vec![right]])).unwrap();

        let parents: Vec<Option<&str>> = (0..tree.len())
            .filter(|id| tree.node(*id).name() == "avatar")
            .map(|id| tree.node(id).parent())
            .collect();
        assert_eq!(parents, vec![Some("left"), Some("right")]);
    }

    #[test]
    fn test_find() {
        let tree = PageletTree::compose(parent("page", vec![vec![kind("a")]])).unwrap();
        assert_eq!(tree.find("a"), Some(1));
        assert_eq!(tree.find("page"), Some(0));
        assert_eq!(tree.find("missing"), None);
        assert!(tree.get(7).is_none());
    }
}
