//! Release order of streamed fragments.

use std::collections::VecDeque;

use pagelet_core::PageletId;

/// Holds completed fragments until every fragment before them in tree
/// pre-order has been released.
///
/// Pre-order means a parent before its children, siblings in declaration
/// order, and a child's whole subtree before its next sibling. Children only
/// become known when their parent completes, so their slots are inserted
/// right after the parent's.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    slots: VecDeque<(PageletId, Option<T>)>,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            slots: VecDeque::new(),
        }
    }

    /// Reserve a slot at the end.
    pub fn reserve(&mut self, id: PageletId) {
        self.slots.push_back((id, None));
    }

    /// Fill the slot of `id` and reserve slots for its children right after.
    ///
    /// Unknown ids are appended as already complete.
    pub fn complete(&mut self, id: PageletId, item: T, children: &[PageletId]) {
        let position = match self.slots.iter().position(|(slot, _)| *slot == id) {
            Some(position) => {
                self.slots[position].1 = Some(item);
                position
            }
            None => {
                self.slots.push_back((id, Some(item)));
                self.slots.len() - 1
            }
        };
        for (offset, child) in children.iter().enumerate() {
            self.slots.insert(position + 1 + offset, (*child, None));
        }
    }

    /// Everything now releasable, in order.
    pub fn drain_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while matches!(self.slots.front(), Some((_, Some(_)))) {
            if let Some((_, Some(item))) = self.slots.pop_front() {
                ready.push(item);
            }
        }
        ready
    }

    /// Slots reserved or held.
    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_sibling_waits() {
        let (a, b) = (PageletId::next(), PageletId::next());
        let mut buffer = ReorderBuffer::new();
        buffer.reserve(a);
        buffer.reserve(b);

        buffer.complete(b, "b", &[]);
        assert!(buffer.drain_ready().is_empty());

        buffer.complete(a, "a", &[]);
        assert_eq!(buffer.drain_ready(), vec!["a", "b"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_children_come_before_next_sibling() {
        let (a, b, a1, a2) = (
            PageletId::next(),
            PageletId::next(),
            PageletId::next(),
            PageletId::next(),
        );
        let mut buffer = ReorderBuffer::new();
        buffer.reserve(a);
        buffer.reserve(b);

        buffer.complete(b, "b", &[]);
        buffer.complete(a, "a", &[a1, a2]);
        assert_eq!(buffer.drain_ready(), vec!["a"]);
        assert_eq!(buffer.pending(), 3);

        buffer.complete(a2, "a2", &[]);
        assert!(buffer.drain_ready().is_empty());
        buffer.complete(a1, "a1", &[]);
        assert_eq!(buffer.drain_ready(), vec!["a1", "a2", "b"]);
    }
}
