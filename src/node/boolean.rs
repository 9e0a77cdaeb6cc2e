//! Boolean node body.

use super::sources::IntSource;

/// Typed payload of a boolean feature.
///
/// Backed by any integer source; `on_value` / `off_value` map the device
/// encoding onto true / false.
#[derive(Debug)]
pub struct BooleanNode {
    pub source: IntSource,
    pub on_value: i64,
    pub off_value: i64,
}

impl BooleanNode {
    pub fn new(source: IntSource) -> Self {
        Self { source, on_value: 1, off_value: 0 }
    }

    pub(crate) fn encode(&self, v: bool) -> i64 {
        if v { self.on_value } else { self.off_value }
    }

    pub(crate) fn decode(&self, raw: i64) -> Option<bool> {
        if raw == self.on_value {
            Some(true)
        } else if raw == self.off_value {
            Some(false)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoding() {
        let node = BooleanNode::new(IntSource::Value(0));
        assert_eq!(node.encode(true), 1);
        assert_eq!(node.encode(false), 0);
        assert_eq!(node.decode(1), Some(true));
        assert_eq!(node.decode(0), Some(false));
        assert_eq!(node.decode(7), None);
    }

    #[test]
    fn test_custom_encoding() {
        let mut node = BooleanNode::new(IntSource::Value(0));
        node.on_value = 0xFF;
        node.off_value = 0x00;
        assert_eq!(node.encode(true), 0xFF);
        assert_eq!(node.decode(0xFF), Some(true));
        assert_eq!(node.decode(1), None);
    }
}
