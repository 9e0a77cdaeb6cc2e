//! String node body.

use super::sources::StrSource;

/// Typed payload of a string feature.
///
/// Register-backed strings occupy a fixed-length NUL-padded span; literal
/// strings are bounded only by `max_length` when one is declared.
#[derive(Debug)]
pub struct StringNode {
    pub source: StrSource,
    pub max_length: Option<usize>,
}

impl StringNode {
    pub fn new(source: StrSource) -> Self {
        Self { source, max_length: None }
    }

    /// Longest value this node accepts.
    pub(crate) fn capacity(&self) -> Option<usize> {
        match &self.source {
            StrSource::Register(reg) => Some(self.max_length.map_or(reg.length, |m| m.min(reg.length))),
            StrSource::Value(_) => self.max_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MemoryPort;
    use std::sync::Arc;

    #[test]
    fn test_literal_capacity() {
        let node = StringNode::new(StrSource::Value("x".into()));
        assert_eq!(node.capacity(), None);
    }

    #[test]
    fn test_register_capacity_is_span_length() {
        let port = Arc::new(MemoryPort::new(64));
        let node = StringNode::new(StrSource::register(&port, 0x0, 16));
        assert_eq!(node.capacity(), Some(16));
    }
}
