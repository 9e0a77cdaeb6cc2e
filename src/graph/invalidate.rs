//! Invalidation sweep and callback collection.
//!
//! Entering a write-like call at the outermost nesting level invalidates
//! the written node and every transitive dependent *before* the write is
//! applied, so readers mid-chain never observe a half-updated graph.
//! Nested calls inside an already-active chain do not re-invalidate —
//! the sweep is idempotent per logical write, preventing re-invalidation
//! storms when one write cascades through several converters.
//!
//! After the write succeeds, the pending callbacks of every invalidated
//! node are collected exactly once into a `CallbackList` and handed back
//! for two-phase firing: first inside the map lock, then outside it.

use smallvec::SmallVec;

use crate::node::core::{CallbackFn, CallbackPhase};
use crate::node::Node;
use super::NodeId;

// ============================================================================
// Pending callbacks
// ============================================================================

/// A callback queued for one logical write.
pub struct PendingCallback {
    pub node: NodeId,
    pub phase: CallbackPhase,
    pub(crate) func: CallbackFn,
}

impl PendingCallback {
    pub fn fire(&self) {
        (self.func)(self.node);
    }
}

/// Ordered, deduplicated callbacks collected for one logical write.
#[derive(Default)]
pub struct CallbackList {
    items: Vec<PendingCallback>,
}

impl CallbackList {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Callbacks of one phase, in collection order.
    pub fn phase(&self, phase: CallbackPhase) -> impl Iterator<Item = &PendingCallback> {
        self.items.iter().filter(move |cb| cb.phase == phase)
    }

    pub(crate) fn merge(&mut self, other: CallbackList) {
        self.items.extend(other.items);
    }
}

// ============================================================================
// Invalidation
// ============================================================================

/// Invalidate `id` and every node in its precomputed dependent closure,
/// flagging their callbacks as pending.
pub fn invalidate_from(nodes: &mut [Node], id: NodeId) {
    tracing::debug!(
        node = nodes[id.index()].name(),
        dependents = nodes[id.index()].edges.all_depending.len(),
        "invalidate"
    );
    nodes[id.index()].invalidate_for_write();
    let deps: SmallVec<[NodeId; 8]> = nodes[id.index()].edges.all_depending.clone();
    for dep in deps {
        nodes[dep.index()].invalidate_for_write();
    }
}

/// Invalidate caches without queueing callbacks (imposed-property changes,
/// bulk invalidation).
pub fn invalidate_quietly(nodes: &mut [Node], id: NodeId) {
    nodes[id.index()].invalidate_caches();
    let deps: SmallVec<[NodeId; 8]> = nodes[id.index()].edges.all_depending.clone();
    for dep in deps {
        nodes[dep.index()].invalidate_caches();
    }
}

/// Collect the pending callbacks of `id` and its dependent closure.
///
/// Each node's pending flag is consumed, so a node reachable through
/// multiple paths — or through several merged collections in one poll —
/// contributes its callbacks at most once per logical write.
pub fn collect_callbacks(nodes: &mut [Node], id: NodeId) -> CallbackList {
    let mut list = CallbackList::default();
    collect_one(nodes, id, &mut list);
    let deps: SmallVec<[NodeId; 8]> = nodes[id.index()].edges.all_depending.clone();
    for dep in deps {
        collect_one(nodes, dep, &mut list);
    }
    list
}

/// Drop every pending flag without collecting. Used when a write fails
/// after invalidation: caches stay invalid, but no callback fires for a
/// failed write.
pub fn clear_pending(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        node.core.callback_pending = false;
    }
}

fn collect_one(nodes: &mut [Node], id: NodeId, list: &mut CallbackList) {
    let node = &mut nodes[id.index()];
    if !node.core.callback_pending {
        return;
    }
    node.core.callback_pending = false;
    for cb in &node.core.callbacks {
        list.items.push(PendingCallback {
            node: id,
            phase: cb.phase,
            func: cb.func.clone(),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
