//! # Dependency / Invalidation Graph
//!
//! Nodes live in an arena owned by the node map and refer to each other
//! by `NodeId` index only. Direct edges are wired during construction;
//! the two transitively-closed sets (`all_depending`, `all_terminals`)
//! are computed once at finalization and never change afterwards.

pub mod finalize;
pub mod invalidate;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use finalize::finalize_graph;
pub use invalidate::{collect_callbacks, invalidate_from};

// ============================================================================
// NodeId
// ============================================================================

/// Opaque node identifier — a stable index into the node map's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Edge sets
// ============================================================================

/// Per-node adjacency sets.
///
/// `parents`, and the derived `all_depending` / `all_terminals`, are
/// filled in by `finalize_graph`; the three children sets are wired by the
/// graph-construction collaborator.
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    /// Nodes that list this node among their invalidating children.
    pub parents: SmallVec<[NodeId; 4]>,
    /// Nodes this node reads (value source, min/max/inc, formula inputs).
    pub reading_children: SmallVec<[NodeId; 4]>,
    /// Nodes this node writes (converter target, backing value).
    pub writing_children: SmallVec<[NodeId; 4]>,
    /// Nodes whose change invalidates this node: reading children plus
    /// explicitly wired invalidators.
    pub invalidating_children: SmallVec<[NodeId; 4]>,
    /// Every node invalidated, directly or indirectly, by a change here.
    /// Transitively closed; excludes this node.
    pub all_depending: SmallVec<[NodeId; 8]>,
    /// Leaf nodes ultimately written to by a write originating here.
    pub all_terminals: SmallVec<[NodeId; 4]>,
}

impl EdgeSet {
    pub(crate) fn push_unique(list: &mut SmallVec<[NodeId; 4]>, id: NodeId) {
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

// ============================================================================
// Visit marks
// ============================================================================

/// Tri-state marker used by the closure walks.
///
/// Meeting `BeingVisited` again signals a cycle: the walk truncates there
/// instead of recursing further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitMark {
    NotVisited,
    BeingVisited,
    Done,
}
