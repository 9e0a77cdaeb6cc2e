//! Category node body.

use crate::graph::NodeId;

/// Typed payload of a category: an ordered list of feature children for
/// presentation clients.
#[derive(Debug)]
pub struct CategoryNode {
    pub features: Vec<NodeId>,
}

impl CategoryNode {
    pub fn new(features: Vec<NodeId>) -> Self {
        Self { features }
    }
}
