//! Reusable pagelet instance slots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::pagelet::Pagelet;
use crate::tree::{NodeId, PageletTree};

/// Counters of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    /// Acquisitions served from a free slot.
    pub reused: u64,
}

/// Free instances kept per pagelet kind.
///
/// `acquire` hands out a ready-to-resolve instance, reusing a released one
/// of the same kind when available. `release` destroys an instance and its
/// children and keeps at most `capacity` free slots per kind.
#[derive(Debug)]
pub struct InstancePool {
    capacity: usize,
    free: Mutex<HashMap<usize, Vec<Pagelet>>>,
    acquired: AtomicU64,
    released: AtomicU64,
    reused: AtomicU64,
}

impl InstancePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(HashMap::new()),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Instance for `node`, with a fresh id and unresolved activation.
    pub fn acquire(&self, tree: &PageletTree, node: NodeId) -> Pagelet {
        let n = tree.node(node);
        let parent = n.parent().map(str::to_string);
        self.acquired.fetch_add(1, Ordering::Relaxed);

        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&n.kind().key())
            .and_then(Vec::pop);

        match recycled {
            Some(mut pagelet) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                pagelet.recycle(node, parent);
                pagelet
            }
            None => Pagelet::new(node, n.kind().clone(), parent),
        }
    }

    /// Destroy `pagelet` and its descendants and return them to the pool.
    pub fn release(&self, mut pagelet: Pagelet) {
        for child in pagelet.take_children() {
            self.release(child);
        }
        pagelet.destroy();
        self.released.fetch_add(1, Ordering::Relaxed);

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        let slots = free.entry(pagelet.kind().key()).or_default();
        if slots.len() < self.capacity {
            slots.push(pagelet);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }

    /// Free slots currently held for the kind at `node`.
    pub fn free_slots(&self, tree: &PageletTree, node: NodeId) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tree.node(node).kind().key())
            .map_or(0, Vec::len)
    }
}

impl Default for InstancePool {
    fn default() -> Self {
        Self::new(16)
    }
}
