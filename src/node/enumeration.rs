//! Enumeration node body.

use crate::model::Ref;
use super::sources::IntSource;

/// One enumeration entry.
#[derive(Debug)]
pub struct EnumEntry {
    pub symbolic: String,
    pub display_name: Option<String>,
    pub value: i64,
    /// Availability gate; `None` means always available.
    pub is_available: Option<Ref<bool>>,
}

impl EnumEntry {
    pub fn new(symbolic: impl Into<String>, value: i64) -> Self {
        Self {
            symbolic: symbolic.into(),
            display_name: None,
            value,
            is_available: None,
        }
    }
}

/// Typed payload of an enumeration feature.
///
/// Entries keep declaration order; that order is also the sweep order of
/// enum selector digits.
#[derive(Debug)]
pub struct EnumerationNode {
    pub source: IntSource,
    pub entries: Vec<EnumEntry>,
}

impl EnumerationNode {
    pub fn new(source: IntSource, entries: Vec<EnumEntry>) -> Self {
        Self { source, entries }
    }

    pub(crate) fn entry_by_symbolic(&self, symbolic: &str) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.symbolic == symbolic)
    }

    pub(crate) fn entry_by_value(&self, value: i64) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.value == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnumerationNode {
        EnumerationNode::new(
            IntSource::Value(0),
            vec![
                EnumEntry::new("Off", 0),
                EnumEntry::new("Once", 1),
                EnumEntry::new("Continuous", 2),
            ],
        )
    }

    #[test]
    fn test_lookup_by_symbolic() {
        let node = sample();
        assert_eq!(node.entry_by_symbolic("Once").unwrap().value, 1);
        assert!(node.entry_by_symbolic("Never").is_none());
    }

    #[test]
    fn test_lookup_by_value() {
        let node = sample();
        assert_eq!(node.entry_by_value(2).unwrap().symbolic, "Continuous");
        assert!(node.entry_by_value(9).is_none());
    }

    #[test]
    fn test_declaration_order_preserved() {
        let node = sample();
        let symbolics: Vec<_> = node.entries.iter().map(|e| e.symbolic.as_str()).collect();
        assert_eq!(symbolics, vec!["Off", "Once", "Continuous"]);
    }
}
