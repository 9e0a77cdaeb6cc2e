//! Value sources — where a node's payload actually lives.
//!
//! Every typed node wraps one of these: a mutable literal, a delegation
//! to another node, a port-backed register span, a read-only formula, or
//! a bidirectional converter. The map's accessor internals dispatch on
//! the source; the source itself carries no locking.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::cache::ValueCache;
use crate::formula::Program;
use crate::graph::NodeId;
use crate::model::AccessMode;
use crate::port::{Endianness, Port};

// ============================================================================
// RegisterRef
// ============================================================================

/// A bound register span: port + cache + layout.
#[derive(Clone)]
pub struct RegisterRef {
    pub port: Arc<dyn Port>,
    pub cache: Arc<ValueCache>,
    pub address: u64,
    pub length: usize,
    pub endianness: Endianness,
    pub signed: bool,
    /// Schema-declared access to the span; combined with port availability
    /// into the natural access mode.
    pub declared_access: AccessMode,
}

impl RegisterRef {
    pub fn new<P: Port + 'static>(
        port: &Arc<P>,
        address: u64,
        length: usize,
        endianness: Endianness,
    ) -> Self {
        Self {
            port: port.clone() as Arc<dyn Port>,
            cache: Arc::new(ValueCache::new()),
            address,
            length,
            endianness,
            signed: false,
            declared_access: AccessMode::RW,
        }
    }

    /// Share a value cache with other spans on the same port.
    pub fn with_cache(mut self, cache: &Arc<ValueCache>) -> Self {
        self.cache = cache.clone();
        self
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.declared_access = access;
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub(crate) fn drop_cached_bytes(&self) {
        self.cache.invalidate(self.address, self.length);
    }
}

impl std::fmt::Debug for RegisterRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRef")
            .field("address", &self.address)
            .field("length", &self.length)
            .field("endianness", &self.endianness)
            .field("signed", &self.signed)
            .field("declared_access", &self.declared_access)
            .finish()
    }
}

// ============================================================================
// Formula bindings
// ============================================================================

/// Formula variable bindings: name → node, shared between evaluations.
pub type Bindings = Arc<Vec<(String, NodeId)>>;

/// A read-only computed source.
#[derive(Debug, Clone)]
pub struct FormulaSource {
    pub program: Arc<Program>,
    pub bindings: Bindings,
}

/// A bidirectional computed source over another node.
///
/// Reading evaluates `from_device` with the target's value bound as `TO`;
/// writing evaluates `to_device` with the incoming value bound as `FROM`
/// and writes the result to the target.
#[derive(Debug, Clone)]
pub struct ConverterSource {
    pub from_device: Arc<Program>,
    pub to_device: Arc<Program>,
    pub target: NodeId,
    pub bindings: Bindings,
}

// ============================================================================
// Typed sources
// ============================================================================

/// Backing of an integer-valued node (also used by booleans,
/// enumerations and commands).
#[derive(Debug, Clone)]
pub enum IntSource {
    /// Mutable literal.
    Value(i64),
    /// Delegate to another integer node.
    Node(NodeId),
    /// Port-backed register span.
    Register(RegisterRef),
    /// Read-only formula.
    Formula(FormulaSource),
    /// Bidirectional formula pair.
    Converter(ConverterSource),
}

impl IntSource {
    pub fn register<P: Port + 'static>(
        port: &Arc<P>,
        address: u64,
        length: usize,
        endianness: Endianness,
    ) -> Self {
        IntSource::Register(RegisterRef::new(port, address, length, endianness))
    }

    pub fn formula(program: Program, bindings: Vec<(String, NodeId)>) -> Self {
        IntSource::Formula(FormulaSource {
            program: Arc::new(program),
            bindings: Arc::new(bindings),
        })
    }

    pub fn converter(
        from_device: Program,
        to_device: Program,
        target: NodeId,
        bindings: Vec<(String, NodeId)>,
    ) -> Self {
        IntSource::Converter(ConverterSource {
            from_device: Arc::new(from_device),
            to_device: Arc::new(to_device),
            target,
            bindings: Arc::new(bindings),
        })
    }

    /// Nodes read when this source is read.
    pub(crate) fn reading_refs(&self, out: &mut SmallVec<[NodeId; 4]>) {
        match self {
            IntSource::Value(_) | IntSource::Register(_) => {}
            IntSource::Node(id) => out.push(*id),
            IntSource::Formula(f) => out.extend(f.bindings.iter().map(|(_, id)| *id)),
            IntSource::Converter(c) => {
                out.push(c.target);
                out.extend(c.bindings.iter().map(|(_, id)| *id));
            }
        }
    }

    /// Nodes written when this source is written.
    pub(crate) fn writing_refs(&self, out: &mut SmallVec<[NodeId; 4]>) {
        match self {
            IntSource::Value(_) | IntSource::Register(_) | IntSource::Formula(_) => {}
            IntSource::Node(id) => out.push(*id),
            IntSource::Converter(c) => out.push(c.target),
        }
    }

    pub(crate) fn drop_cached_bytes(&self) {
        if let IntSource::Register(reg) = self {
            reg.drop_cached_bytes();
        }
    }
}

/// Backing of a float-valued node.
#[derive(Debug, Clone)]
pub enum FloatSource {
    /// Mutable literal.
    Value(f64),
    /// Delegate to another float or integer node.
    Node(NodeId),
    /// Port-backed IEEE register span (4 or 8 bytes).
    Register(RegisterRef),
    /// Read-only formula.
    Formula(FormulaSource),
    /// Bidirectional formula pair.
    Converter(ConverterSource),
}

impl FloatSource {
    pub fn register<P: Port + 'static>(
        port: &Arc<P>,
        address: u64,
        length: usize,
        endianness: Endianness,
    ) -> Self {
        FloatSource::Register(RegisterRef::new(port, address, length, endianness))
    }

    pub fn formula(program: Program, bindings: Vec<(String, NodeId)>) -> Self {
        FloatSource::Formula(FormulaSource {
            program: Arc::new(program),
            bindings: Arc::new(bindings),
        })
    }

    pub fn converter(
        from_device: Program,
        to_device: Program,
        target: NodeId,
        bindings: Vec<(String, NodeId)>,
    ) -> Self {
        FloatSource::Converter(ConverterSource {
            from_device: Arc::new(from_device),
            to_device: Arc::new(to_device),
            target,
            bindings: Arc::new(bindings),
        })
    }

    pub(crate) fn reading_refs(&self, out: &mut SmallVec<[NodeId; 4]>) {
        match self {
            FloatSource::Value(_) | FloatSource::Register(_) => {}
            FloatSource::Node(id) => out.push(*id),
            FloatSource::Formula(f) => out.extend(f.bindings.iter().map(|(_, id)| *id)),
            FloatSource::Converter(c) => {
                out.push(c.target);
                out.extend(c.bindings.iter().map(|(_, id)| *id));
            }
        }
    }

    pub(crate) fn writing_refs(&self, out: &mut SmallVec<[NodeId; 4]>) {
        match self {
            FloatSource::Value(_) | FloatSource::Register(_) | FloatSource::Formula(_) => {}
            FloatSource::Node(id) => out.push(*id),
            FloatSource::Converter(c) => out.push(c.target),
        }
    }

    pub(crate) fn drop_cached_bytes(&self) {
        if let FloatSource::Register(reg) = self {
            reg.drop_cached_bytes();
        }
    }
}

/// Backing of a string-valued node.
#[derive(Debug, Clone)]
pub enum StrSource {
    /// Mutable literal.
    Value(String),
    /// Fixed-length NUL-padded register span.
    Register(RegisterRef),
}

impl StrSource {
    pub fn register<P: Port + 'static>(port: &Arc<P>, address: u64, length: usize) -> Self {
        // Byte order is irrelevant for character data.
        StrSource::Register(RegisterRef::new(port, address, length, Endianness::Little))
    }

    pub(crate) fn drop_cached_bytes(&self) {
        if let StrSource::Register(reg) = self {
            reg.drop_cached_bytes();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MemoryPort;

    #[test]
    fn test_reading_refs_of_formula() {
        let src = IntSource::formula(
            Program::parse("A + B").unwrap(),
            vec![("A".into(), NodeId(1)), ("B".into(), NodeId(2))],
        );
        let mut refs = SmallVec::new();
        src.reading_refs(&mut refs);
        assert_eq!(refs.as_slice(), &[NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_converter_reads_and_writes_target() {
        let src = IntSource::converter(
            Program::parse("TO * 2").unwrap(),
            Program::parse("FROM / 2").unwrap(),
            NodeId(5),
            vec![],
        );
        let mut reads = SmallVec::new();
        let mut writes = SmallVec::new();
        src.reading_refs(&mut reads);
        src.writing_refs(&mut writes);
        assert_eq!(reads.as_slice(), &[NodeId(5)]);
        assert_eq!(writes.as_slice(), &[NodeId(5)]);
    }

    #[test]
    fn test_register_source_has_no_node_refs() {
        let port = Arc::new(MemoryPort::new(64));
        let src = IntSource::register(&port, 0x0, 4, Endianness::Little);
        let mut refs = SmallVec::new();
        src.reading_refs(&mut refs);
        src.writing_refs(&mut refs);
        assert!(refs.is_empty());
    }
}
