//! # Node Capability Stack
//!
//! Every feature is one `Node`: shared `NodeCore` state (identity,
//! access-mode cache, caching mode, callbacks), an `EdgeSet` of graph
//! wiring, and a typed `NodeBody`. Cross-cutting behavior — locking,
//! access-mode resolution, value caching, range imposition — lives once,
//! in the core and in the map's accessor internals; the bodies carry only
//! type-specific payload.

pub mod core;
mod boolean;
mod category;
mod command;
mod enumeration;
mod float;
mod integer;
mod register;
mod sources;
mod string_node;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::graph::{EdgeSet, NodeId};

pub use boolean::BooleanNode;
pub use category::CategoryNode;
pub use command::CommandNode;
pub use self::core::{CallbackId, CallbackPhase, NodeCore};
pub use enumeration::{EnumEntry, EnumerationNode};
pub use float::FloatNode;
pub use integer::IntegerNode;
pub use register::RegisterNode;
pub use sources::{Bindings, ConverterSource, FormulaSource, FloatSource, IntSource, RegisterRef, StrSource};
pub use string_node::StringNode;
pub use crate::port::Endianness;

pub(crate) use float::format_float;
pub(crate) use integer::{format_int, parse_int};

// ============================================================================
// InterfaceType
// ============================================================================

/// Which typed accessor surface a node exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceType {
    Integer,
    Float,
    Boolean,
    Enumeration,
    String,
    Register,
    Command,
    Category,
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InterfaceType::Integer => "IInteger",
            InterfaceType::Float => "IFloat",
            InterfaceType::Boolean => "IBoolean",
            InterfaceType::Enumeration => "IEnumeration",
            InterfaceType::String => "IString",
            InterfaceType::Register => "IRegister",
            InterfaceType::Command => "ICommand",
            InterfaceType::Category => "ICategory",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// NodeBody
// ============================================================================

/// Typed payload of a node.
#[derive(Debug)]
pub enum NodeBody {
    Integer(IntegerNode),
    Float(FloatNode),
    Boolean(BooleanNode),
    Enumeration(EnumerationNode),
    String(StringNode),
    Register(RegisterNode),
    Command(CommandNode),
    Category(CategoryNode),
}

impl NodeBody {
    pub fn interface_type(&self) -> InterfaceType {
        match self {
            NodeBody::Integer(_) => InterfaceType::Integer,
            NodeBody::Float(_) => InterfaceType::Float,
            NodeBody::Boolean(_) => InterfaceType::Boolean,
            NodeBody::Enumeration(_) => InterfaceType::Enumeration,
            NodeBody::String(_) => InterfaceType::String,
            NodeBody::Register(_) => InterfaceType::Register,
            NodeBody::Command(_) => InterfaceType::Command,
            NodeBody::Category(_) => InterfaceType::Category,
        }
    }

    /// Nodes read when this body is read: value delegations, formula
    /// inputs, bound range properties.
    pub(crate) fn reading_refs(&self) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeBody::Integer(n) => {
                n.source.reading_refs(&mut out);
                for r in [&n.min, &n.max, &n.inc] {
                    if let Some(id) = r.node() {
                        out.push(id);
                    }
                }
            }
            NodeBody::Float(n) => {
                n.source.reading_refs(&mut out);
                for r in [&n.min, &n.max] {
                    if let Some(id) = r.node() {
                        out.push(id);
                    }
                }
                if let Some(inc) = &n.inc {
                    if let Some(id) = inc.node() {
                        out.push(id);
                    }
                }
            }
            NodeBody::Boolean(n) => n.source.reading_refs(&mut out),
            NodeBody::Enumeration(n) => {
                n.source.reading_refs(&mut out);
                for entry in &n.entries {
                    if let Some(r) = &entry.is_available {
                        if let Some(id) = r.node() {
                            out.push(id);
                        }
                    }
                }
            }
            NodeBody::String(_) | NodeBody::Register(_) | NodeBody::Category(_) => {}
            NodeBody::Command(n) => n.source.reading_refs(&mut out),
        }
        out
    }

    /// Nodes written when this body is written.
    pub(crate) fn writing_refs(&self) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeBody::Integer(n) => n.source.writing_refs(&mut out),
            NodeBody::Float(n) => n.source.writing_refs(&mut out),
            NodeBody::Boolean(n) => n.source.writing_refs(&mut out),
            NodeBody::Enumeration(n) => n.source.writing_refs(&mut out),
            NodeBody::Command(n) => n.source.writing_refs(&mut out),
            NodeBody::String(_) | NodeBody::Register(_) | NodeBody::Category(_) => {}
        }
        out
    }

    /// Drop any register bytes this body holds in a value cache.
    pub(crate) fn drop_cached_bytes(&self) {
        match self {
            NodeBody::Integer(n) => n.source.drop_cached_bytes(),
            NodeBody::Float(n) => n.source.drop_cached_bytes(),
            NodeBody::Boolean(n) => n.source.drop_cached_bytes(),
            NodeBody::Enumeration(n) => n.source.drop_cached_bytes(),
            NodeBody::Command(n) => n.source.drop_cached_bytes(),
            NodeBody::String(n) => n.source.drop_cached_bytes(),
            NodeBody::Register(n) => n.reg.drop_cached_bytes(),
            NodeBody::Category(_) => {}
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// One feature in the graph: shared core + wiring + typed payload.
#[derive(Debug)]
pub struct Node {
    pub(crate) core: NodeCore,
    pub(crate) edges: EdgeSet,
    pub(crate) body: NodeBody,
}

impl Node {
    pub(crate) fn new(core: NodeCore, body: NodeBody) -> Self {
        Self { core, edges: EdgeSet::default(), body }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn interface_type(&self) -> InterfaceType {
        self.body.interface_type()
    }

    /// Invalidate for a write chain: drop caches and flag the node's
    /// callbacks as pending collection.
    pub(crate) fn invalidate_for_write(&mut self) {
        self.invalidate_caches();
        self.core.callback_pending = true;
    }

    /// Drop every cache this node holds, without queueing callbacks.
    pub(crate) fn invalidate_caches(&mut self) {
        self.core.invalidate_caches();
        self.body.drop_cached_bytes();
        if let NodeBody::Integer(n) = &mut self.body {
            n.valid_values_cache = None;
        }
    }
}
