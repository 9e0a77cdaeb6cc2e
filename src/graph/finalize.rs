//! Graph finalization — runs exactly once, after construction and before
//! the map is exposed to clients.
//!
//! Wires parent edges from the children sets, then computes the two
//! transitively-closed sets per node. The directly-wired graph may
//! legally contain cycles in read edges (access-mode caching breaks them
//! at evaluation time); the closure walks tolerate cycles by truncating
//! at a `BeingVisited` mark instead of recursing.

use smallvec::SmallVec;

use crate::node::Node;
use crate::{Error, Result};
use super::{EdgeSet, NodeId, VisitMark};

/// Wire parents and compute `all_depending` / `all_terminals` for every
/// node.
pub fn finalize_graph(nodes: &mut Vec<Node>) -> Result<()> {
    validate_edges(nodes)?;
    merge_reading_into_invalidating(nodes);
    wire_parents(nodes);

    for i in 0..nodes.len() {
        let start = NodeId(i as u32);
        let depending = depending_walk(nodes, start);
        let terminals = terminal_walk(nodes, start);
        let edges = &mut nodes[i].edges;
        edges.all_depending = depending;
        edges.all_terminals = terminals;
    }

    tracing::debug!(nodes = nodes.len(), "graph finalized");
    Ok(())
}

fn validate_edges(nodes: &[Node]) -> Result<()> {
    let len = nodes.len() as u32;
    for node in nodes {
        let edges = &node.edges;
        for list in [
            &edges.reading_children,
            &edges.writing_children,
            &edges.invalidating_children,
        ] {
            if let Some(bad) = list.iter().find(|id| id.0 >= len) {
                return Err(Error::Logical(format!(
                    "node '{}' references non-existent node {bad}",
                    node.name()
                )));
            }
        }
    }
    Ok(())
}

/// A node is invalidated by everything it reads, plus any explicitly
/// wired invalidators already present in `invalidating_children`.
fn merge_reading_into_invalidating(nodes: &mut Vec<Node>) {
    for node in nodes.iter_mut() {
        let reading = node.edges.reading_children.clone();
        for id in reading {
            EdgeSet::push_unique(&mut node.edges.invalidating_children, id);
        }
    }
}

fn wire_parents(nodes: &mut Vec<Node>) {
    for i in 0..nodes.len() {
        let parent = NodeId(i as u32);
        let children = nodes[i].edges.invalidating_children.clone();
        for child in children {
            EdgeSet::push_unique(&mut nodes[child.index()].edges.parents, parent);
        }
    }
}

// ============================================================================
// Closure walks
// ============================================================================

enum Frame {
    Enter(NodeId),
    Exit(NodeId),
}

/// Every node invalidated, directly or indirectly, by a change at
/// `start`: the closure over parents (nodes reading `start`) and writing
/// children (nodes `start` writes). Excludes `start` itself.
fn depending_walk(nodes: &[Node], start: NodeId) -> SmallVec<[NodeId; 8]> {
    let mut marks = vec![VisitMark::NotVisited; nodes.len()];
    let mut out: SmallVec<[NodeId; 8]> = SmallVec::new();
    let mut stack = vec![Frame::Enter(start)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(id) => {
                if marks[id.index()] != VisitMark::NotVisited {
                    // Done, or a cycle back into the active path: truncate.
                    continue;
                }
                marks[id.index()] = VisitMark::BeingVisited;
                stack.push(Frame::Exit(id));
                let edges = &nodes[id.index()].edges;
                for n in edges.parents.iter().chain(edges.writing_children.iter()) {
                    stack.push(Frame::Enter(*n));
                }
                if id != start {
                    out.push(id);
                }
            }
            Frame::Exit(id) => marks[id.index()] = VisitMark::Done,
        }
    }
    out
}

/// Leaf nodes reached from `start` along writing children. A node with no
/// writing children is its own terminal.
fn terminal_walk(nodes: &[Node], start: NodeId) -> SmallVec<[NodeId; 4]> {
    let mut marks = vec![VisitMark::NotVisited; nodes.len()];
    let mut out: SmallVec<[NodeId; 4]> = SmallVec::new();
    let mut stack = vec![Frame::Enter(start)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(id) => {
                if marks[id.index()] != VisitMark::NotVisited {
                    continue;
                }
                marks[id.index()] = VisitMark::BeingVisited;
                stack.push(Frame::Exit(id));
                let writing = &nodes[id.index()].edges.writing_children;
                if writing.is_empty() {
                    EdgeSet::push_unique(&mut out, id);
                } else {
                    for n in writing {
                        stack.push(Frame::Enter(*n));
                    }
                }
            }
            Frame::Exit(id) => marks[id.index()] = VisitMark::Done,
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{IntSource, IntegerNode, NodeBody, NodeCore};

    fn literal_node(name: &str) -> Node {
        Node::new(
            NodeCore::new(name),
            NodeBody::Integer(IntegerNode::new(IntSource::Value(0))),
        )
    }

    fn build(n: usize) -> Vec<Node> {
        (0..n).map(|i| literal_node(&format!("N{i}"))).collect()
    }

    #[test]
    fn test_parents_are_inverse_of_invalidating_children() {
        let mut nodes = build(3);
        // N1 reads N0; N2 reads N0.
        nodes[1].edges.reading_children.push(NodeId(0));
        nodes[2].edges.reading_children.push(NodeId(0));
        finalize_graph(&mut nodes).unwrap();

        assert_eq!(nodes[0].edges.parents.as_slice(), &[NodeId(1), NodeId(2)]);
        assert!(nodes[1].edges.parents.is_empty());
    }

    #[test]
    fn test_all_depending_is_transitive() {
        let mut nodes = build(4);
        // Chain: N3 reads N2 reads N1 reads N0.
        nodes[1].edges.reading_children.push(NodeId(0));
        nodes[2].edges.reading_children.push(NodeId(1));
        nodes[3].edges.reading_children.push(NodeId(2));
        finalize_graph(&mut nodes).unwrap();

        let mut deps: Vec<_> = nodes[0].edges.all_depending.to_vec();
        deps.sort();
        assert_eq!(deps, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert!(nodes[3].edges.all_depending.is_empty());
    }

    #[test]
    fn test_all_depending_excludes_self() {
        let mut nodes = build(2);
        nodes[1].edges.reading_children.push(NodeId(0));
        finalize_graph(&mut nodes).unwrap();
        assert!(!nodes[0].edges.all_depending.contains(&NodeId(0)));
    }

    #[test]
    fn test_diamond_dependency_listed_once() {
        let mut nodes = build(4);
        // N1 and N2 read N0; N3 reads both N1 and N2.
        nodes[1].edges.reading_children.push(NodeId(0));
        nodes[2].edges.reading_children.push(NodeId(0));
        nodes[3].edges.reading_children.push(NodeId(1));
        nodes[3].edges.reading_children.push(NodeId(2));
        finalize_graph(&mut nodes).unwrap();

        let count = nodes[0]
            .edges
            .all_depending
            .iter()
            .filter(|id| **id == NodeId(3))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_read_cycle_terminates() {
        let mut nodes = build(2);
        // N0 and N1 read each other.
        nodes[0].edges.reading_children.push(NodeId(1));
        nodes[1].edges.reading_children.push(NodeId(0));
        finalize_graph(&mut nodes).unwrap();

        assert_eq!(nodes[0].edges.all_depending.as_slice(), &[NodeId(1)]);
        assert_eq!(nodes[1].edges.all_depending.as_slice(), &[NodeId(0)]);
    }

    #[test]
    fn test_writing_children_propagate_invalidation() {
        let mut nodes = build(3);
        // N0 writes N1 (converter over a register); N2 reads N1.
        nodes[0].edges.reading_children.push(NodeId(1));
        nodes[0].edges.writing_children.push(NodeId(1));
        nodes[2].edges.reading_children.push(NodeId(1));
        finalize_graph(&mut nodes).unwrap();

        let mut deps: Vec<_> = nodes[0].edges.all_depending.to_vec();
        deps.sort();
        assert_eq!(deps, vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_terminals_of_leaf_is_self() {
        let mut nodes = build(1);
        finalize_graph(&mut nodes).unwrap();
        assert_eq!(nodes[0].edges.all_terminals.as_slice(), &[NodeId(0)]);
    }

    #[test]
    fn test_terminals_follow_write_chain() {
        let mut nodes = build(3);
        // N0 writes N1 writes N2.
        nodes[0].edges.writing_children.push(NodeId(1));
        nodes[1].edges.writing_children.push(NodeId(2));
        finalize_graph(&mut nodes).unwrap();

        assert_eq!(nodes[0].edges.all_terminals.as_slice(), &[NodeId(2)]);
    }

    #[test]
    fn test_write_cycle_truncates() {
        let mut nodes = build(2);
        nodes[0].edges.writing_children.push(NodeId(1));
        nodes[1].edges.writing_children.push(NodeId(0));
        finalize_graph(&mut nodes).unwrap();
        // No leaf exists on the cycle; the walk must still terminate.
        assert!(nodes[0].edges.all_terminals.is_empty());
    }

    #[test]
    fn test_dangling_edge_is_a_logical_error() {
        let mut nodes = build(1);
        nodes[0].edges.reading_children.push(NodeId(9));
        assert!(matches!(finalize_graph(&mut nodes), Err(Error::Logical(_))));
    }
}
