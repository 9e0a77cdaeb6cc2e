//! Programmatic graph construction.
//!
//! `NodeMapBuilder` is the stand-in for the XML device-description
//! loader: it creates nodes, wires dependency edges, and finalizes the
//! graph exactly once before the map is handed to clients. Construction
//! is a pure, single-threaded phase — nothing locks until `finalize`
//! returns the sealed `NodeMap`.
//!
//! Cyclic wiring (a node whose availability gate reads a node that reads
//! it back) uses `reserve` to allocate an id first and a matching
//! `define_*` call later.

use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::graph::{finalize_graph, EdgeSet, NodeId};
use crate::map::inner::MapInner;
use crate::map::NodeMap;
use crate::model::{
    AccessMode, CachingMode, DisplayNotation, IncMode, Namespace, Ref, Representation, Visibility,
};
use crate::node::{
    BooleanNode, CategoryNode, CommandNode, EnumEntry, EnumerationNode, FloatNode, FloatSource,
    IntSource, IntegerNode, Node, NodeBody, NodeCore, RegisterNode, RegisterRef, StrSource,
    StringNode,
};
use crate::port::Port;
use crate::{Error, Result};

// ============================================================================
// Shared node options
// ============================================================================

/// Options common to every node type.
#[derive(Debug, Default)]
pub struct NodeOpts {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub tool_tip: Option<String>,
    pub namespace: Option<Namespace>,
    pub visibility: Option<Visibility>,
    pub caching: Option<CachingMode>,
    pub polling_interval: Option<u64>,
    pub access_cacheable: Option<bool>,
    pub is_implemented: Option<Ref<bool>>,
    pub is_available: Option<Ref<bool>>,
    pub is_locked: Option<Ref<bool>>,
    /// Nodes whose change explicitly invalidates this one, beyond what it
    /// already reads.
    pub invalidators: Vec<NodeId>,
}

impl NodeOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn with_tool_tip(mut self, text: impl Into<String>) -> Self {
        self.tool_tip = Some(text.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_caching(mut self, caching: CachingMode) -> Self {
        self.caching = Some(caching);
        self
    }

    pub fn with_polling(mut self, interval_ms: u64) -> Self {
        self.polling_interval = Some(interval_ms);
        self
    }

    pub fn with_access_cacheable(mut self, cacheable: bool) -> Self {
        self.access_cacheable = Some(cacheable);
        self
    }

    pub fn with_availability(mut self, gate: Ref<bool>) -> Self {
        self.is_available = Some(gate);
        self
    }

    pub fn with_implemented(mut self, gate: Ref<bool>) -> Self {
        self.is_implemented = Some(gate);
        self
    }

    pub fn with_locked(mut self, gate: Ref<bool>) -> Self {
        self.is_locked = Some(gate);
        self
    }

    pub fn with_invalidators(mut self, invalidators: Vec<NodeId>) -> Self {
        self.invalidators = invalidators;
        self
    }

    fn apply(self, core: &mut NodeCore) -> Vec<NodeId> {
        if let Some(v) = self.display_name {
            core.display_name = Some(v);
        }
        if let Some(v) = self.description {
            core.description = Some(v);
        }
        if let Some(v) = self.tool_tip {
            core.tool_tip = Some(v);
        }
        if let Some(v) = self.namespace {
            core.namespace = v;
        }
        if let Some(v) = self.visibility {
            core.visibility = v;
        }
        if let Some(v) = self.caching {
            core.caching_mode = v;
        }
        if let Some(v) = self.polling_interval {
            core.polling_interval = Some(v);
        }
        if let Some(v) = self.access_cacheable {
            core.access_cacheable = v;
        }
        core.is_implemented = self.is_implemented;
        core.is_available = self.is_available;
        core.is_locked = self.is_locked;
        self.invalidators
    }
}

// ============================================================================
// Typed definitions
// ============================================================================

/// Definition of an integer feature.
#[derive(Debug)]
pub struct IntegerDef {
    pub name: String,
    pub source: IntSource,
    pub min: Ref<i64>,
    pub max: Ref<i64>,
    pub inc: Ref<i64>,
    pub inc_mode: IncMode,
    pub value_list: Vec<i64>,
    pub representation: Representation,
    pub unit: Option<String>,
    pub opts: NodeOpts,
}

impl IntegerDef {
    pub fn new(name: impl Into<String>, source: IntSource) -> Self {
        Self {
            name: name.into(),
            source,
            min: Ref::Literal(i64::MIN),
            max: Ref::Literal(i64::MAX),
            inc: Ref::Literal(1),
            inc_mode: IncMode::Fixed,
            value_list: Vec::new(),
            representation: Representation::Linear,
            unit: None,
            opts: NodeOpts::default(),
        }
    }

    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.min = Ref::Literal(min);
        self.max = Ref::Literal(max);
        self
    }

    pub fn with_range_refs(mut self, min: Ref<i64>, max: Ref<i64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_inc(mut self, inc: i64) -> Self {
        self.inc = Ref::Literal(inc);
        self
    }

    pub fn with_inc_ref(mut self, inc: Ref<i64>) -> Self {
        self.inc = inc;
        self
    }

    /// Constrain legal values to an explicit list.
    pub fn with_value_list(mut self, list: Vec<i64>) -> Self {
        self.value_list = list;
        self.inc_mode = IncMode::List;
        self
    }

    pub fn with_representation(mut self, repr: Representation) -> Self {
        self.representation = repr;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// Definition of a float feature.
#[derive(Debug)]
pub struct FloatDef {
    pub name: String,
    pub source: FloatSource,
    pub min: Ref<f64>,
    pub max: Ref<f64>,
    pub inc: Option<Ref<f64>>,
    pub representation: Representation,
    pub unit: Option<String>,
    pub notation: DisplayNotation,
    pub precision: Option<usize>,
    pub opts: NodeOpts,
}

impl FloatDef {
    pub fn new(name: impl Into<String>, source: FloatSource) -> Self {
        Self {
            name: name.into(),
            source,
            min: Ref::Literal(f64::MIN),
            max: Ref::Literal(f64::MAX),
            inc: None,
            representation: Representation::Linear,
            unit: None,
            notation: DisplayNotation::Automatic,
            precision: None,
            opts: NodeOpts::default(),
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Ref::Literal(min);
        self.max = Ref::Literal(max);
        self
    }

    pub fn with_range_refs(mut self, min: Ref<f64>, max: Ref<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_notation(mut self, notation: DisplayNotation, precision: Option<usize>) -> Self {
        self.notation = notation;
        self.precision = precision;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// Definition of a boolean feature.
#[derive(Debug)]
pub struct BooleanDef {
    pub name: String,
    pub source: IntSource,
    pub on_value: i64,
    pub off_value: i64,
    pub opts: NodeOpts,
}

impl BooleanDef {
    pub fn new(name: impl Into<String>, source: IntSource) -> Self {
        Self { name: name.into(), source, on_value: 1, off_value: 0, opts: NodeOpts::default() }
    }

    pub fn with_on_off(mut self, on: i64, off: i64) -> Self {
        self.on_value = on;
        self.off_value = off;
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// Definition of one enumeration entry.
#[derive(Debug)]
pub struct EnumEntryDef {
    pub symbolic: String,
    pub display_name: Option<String>,
    pub value: i64,
    pub is_available: Option<Ref<bool>>,
}

impl EnumEntryDef {
    pub fn new(symbolic: impl Into<String>, value: i64) -> Self {
        Self { symbolic: symbolic.into(), display_name: None, value, is_available: None }
    }

    pub fn with_display(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_availability(mut self, gate: Ref<bool>) -> Self {
        self.is_available = Some(gate);
        self
    }
}

/// Definition of an enumeration feature.
#[derive(Debug)]
pub struct EnumerationDef {
    pub name: String,
    pub source: IntSource,
    pub entries: Vec<EnumEntryDef>,
    pub opts: NodeOpts,
}

impl EnumerationDef {
    pub fn new(name: impl Into<String>, source: IntSource) -> Self {
        Self { name: name.into(), source, entries: Vec::new(), opts: NodeOpts::default() }
    }

    pub fn with_entries(mut self, entries: Vec<EnumEntryDef>) -> Self {
        self.entries = entries;
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// Definition of a string feature.
#[derive(Debug)]
pub struct StringDef {
    pub name: String,
    pub source: StrSource,
    pub max_length: Option<usize>,
    pub opts: NodeOpts,
}

impl StringDef {
    pub fn new(name: impl Into<String>, source: StrSource) -> Self {
        Self { name: name.into(), source, max_length: None, opts: NodeOpts::default() }
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// Definition of a raw register feature.
#[derive(Debug)]
pub struct RegisterDef {
    pub name: String,
    pub reg: RegisterRef,
    pub opts: NodeOpts,
}

impl RegisterDef {
    pub fn new<P: Port + 'static>(
        name: impl Into<String>,
        port: &Arc<P>,
        address: u64,
        length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            reg: RegisterRef::new(port, address, length, crate::port::Endianness::Little),
            opts: NodeOpts::default(),
        }
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.reg = self.reg.with_access(access);
        self
    }

    pub fn with_cache(mut self, cache: &Arc<crate::cache::ValueCache>) -> Self {
        self.reg = self.reg.with_cache(cache);
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// Definition of a command feature.
#[derive(Debug)]
pub struct CommandDef {
    pub name: String,
    pub source: IntSource,
    pub command_value: i64,
    pub opts: NodeOpts,
}

impl CommandDef {
    pub fn new(name: impl Into<String>, source: IntSource) -> Self {
        Self { name: name.into(), source, command_value: 1, opts: NodeOpts::default() }
    }

    pub fn with_command_value(mut self, value: i64) -> Self {
        self.command_value = value;
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// Definition of a category.
#[derive(Debug)]
pub struct CategoryDef {
    pub name: String,
    pub features: Vec<NodeId>,
    pub opts: NodeOpts,
}

impl CategoryDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), features: Vec::new(), opts: NodeOpts::default() }
    }

    pub fn with_features(mut self, features: Vec<NodeId>) -> Self {
        self.features = features;
        self
    }

    pub fn with_opts(mut self, opts: NodeOpts) -> Self {
        self.opts = opts;
        self
    }
}

// ============================================================================
// NodeMapBuilder
// ============================================================================

struct Slot {
    core: NodeCore,
    body: Option<NodeBody>,
    invalidators: Vec<NodeId>,
}

/// Builds a `NodeMap`. Consumed by `finalize`.
pub struct NodeMapBuilder {
    name: String,
    slots: Vec<Slot>,
    name_index: HashMap<String, NodeId>,
}

impl NodeMapBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), slots: Vec::new(), name_index: HashMap::new() }
    }

    /// Allocate an id for `name` without defining the node yet. Needed
    /// for cyclic wiring; every reserved id must be defined before
    /// `finalize`.
    pub fn reserve(&mut self, name: &str) -> Result<NodeId> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("node name must not be empty".into()));
        }
        if self.name_index.contains_key(name) {
            return Err(Error::Logical(format!("duplicate node name '{name}'")));
        }
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot {
            core: NodeCore::new(name),
            body: None,
            invalidators: Vec::new(),
        });
        self.name_index.insert(name.to_string(), id);
        Ok(id)
    }

    fn define(&mut self, id: NodeId, name: &str, opts: NodeOpts, body: NodeBody) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or_else(|| Error::Logical(format!("node id {id} was never reserved")))?;
        if slot.core.name != name {
            return Err(Error::Logical(format!(
                "definition '{name}' does not match reserved name '{}'",
                slot.core.name
            )));
        }
        if slot.body.is_some() {
            return Err(Error::Logical(format!("node '{name}' is already defined")));
        }
        slot.invalidators = opts.apply(&mut slot.core);
        slot.body = Some(body);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // add_* — reserve and define in one step
    // ------------------------------------------------------------------------

    pub fn add_integer(&mut self, def: IntegerDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_integer(id, def)?;
        Ok(id)
    }

    pub fn add_float(&mut self, def: FloatDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_float(id, def)?;
        Ok(id)
    }

    pub fn add_boolean(&mut self, def: BooleanDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_boolean(id, def)?;
        Ok(id)
    }

    pub fn add_enumeration(&mut self, def: EnumerationDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_enumeration(id, def)?;
        Ok(id)
    }

    pub fn add_string(&mut self, def: StringDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_string(id, def)?;
        Ok(id)
    }

    pub fn add_register(&mut self, def: RegisterDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_register(id, def)?;
        Ok(id)
    }

    pub fn add_command(&mut self, def: CommandDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_command(id, def)?;
        Ok(id)
    }

    pub fn add_category(&mut self, def: CategoryDef) -> Result<NodeId> {
        let id = self.reserve(&def.name)?;
        self.define_category(id, def)?;
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // define_* — complete a reserved node
    // ------------------------------------------------------------------------

    pub fn define_integer(&mut self, id: NodeId, def: IntegerDef) -> Result<()> {
        if let IntSource::Register(reg) = &def.source {
            if reg.length == 0 || reg.length > 8 {
                return Err(Error::InvalidArgument(format!(
                    "integer register length must be 1..=8, got {}",
                    reg.length
                )));
            }
        }
        let mut node = IntegerNode::new(def.source);
        node.min = def.min;
        node.max = def.max;
        node.inc = def.inc;
        node.inc_mode = def.inc_mode;
        node.value_list = def.value_list;
        node.representation = def.representation;
        node.unit = def.unit;
        self.define(id, &def.name, def.opts, NodeBody::Integer(node))
    }

    pub fn define_float(&mut self, id: NodeId, def: FloatDef) -> Result<()> {
        if let FloatSource::Register(reg) = &def.source {
            if reg.length != 4 && reg.length != 8 {
                return Err(Error::InvalidArgument(format!(
                    "float register length must be 4 or 8, got {}",
                    reg.length
                )));
            }
        }
        let mut node = FloatNode::new(def.source);
        node.min = def.min;
        node.max = def.max;
        node.inc = def.inc;
        node.representation = def.representation;
        node.unit = def.unit;
        node.notation = def.notation;
        node.precision = def.precision;
        self.define(id, &def.name, def.opts, NodeBody::Float(node))
    }

    pub fn define_boolean(&mut self, id: NodeId, def: BooleanDef) -> Result<()> {
        let mut node = BooleanNode::new(def.source);
        node.on_value = def.on_value;
        node.off_value = def.off_value;
        self.define(id, &def.name, def.opts, NodeBody::Boolean(node))
    }

    pub fn define_enumeration(&mut self, id: NodeId, def: EnumerationDef) -> Result<()> {
        if def.entries.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "enumeration '{}' has no entries",
                def.name
            )));
        }
        let mut entries = Vec::with_capacity(def.entries.len());
        for e in def.entries {
            if entries.iter().any(|x: &EnumEntry| x.symbolic == e.symbolic) {
                return Err(Error::Logical(format!(
                    "duplicate enumeration entry '{}' in '{}'",
                    e.symbolic, def.name
                )));
            }
            let mut entry = EnumEntry::new(e.symbolic, e.value);
            entry.display_name = e.display_name;
            entry.is_available = e.is_available;
            entries.push(entry);
        }
        let node = EnumerationNode::new(def.source, entries);
        self.define(id, &def.name, def.opts, NodeBody::Enumeration(node))
    }

    pub fn define_string(&mut self, id: NodeId, def: StringDef) -> Result<()> {
        let mut node = StringNode::new(def.source);
        node.max_length = def.max_length;
        self.define(id, &def.name, def.opts, NodeBody::String(node))
    }

    pub fn define_register(&mut self, id: NodeId, def: RegisterDef) -> Result<()> {
        if def.reg.length == 0 {
            return Err(Error::InvalidArgument("register length must not be zero".into()));
        }
        let node = RegisterNode::new(def.reg);
        self.define(id, &def.name, def.opts, NodeBody::Register(node))
    }

    pub fn define_command(&mut self, id: NodeId, def: CommandDef) -> Result<()> {
        let mut node = CommandNode::new(def.source);
        node.command_value = def.command_value;
        self.define(id, &def.name, def.opts, NodeBody::Command(node))
    }

    pub fn define_category(&mut self, id: NodeId, def: CategoryDef) -> Result<()> {
        let node = CategoryNode::new(def.features);
        self.define(id, &def.name, def.opts, NodeBody::Category(node))
    }

    // ------------------------------------------------------------------------
    // Finalize
    // ------------------------------------------------------------------------

    /// Wire edges, compute the derived dependency sets, and seal the map.
    pub fn finalize(self) -> Result<NodeMap> {
        let mut nodes = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            let body = slot.body.ok_or_else(|| {
                Error::Logical(format!(
                    "node '{}' was reserved but never defined",
                    slot.core.name
                ))
            })?;
            let mut node = Node::new(slot.core, body);

            let mut reading = node.body.reading_refs();
            for gate in [
                node.core.is_implemented,
                node.core.is_available,
                node.core.is_locked,
            ]
            .into_iter()
            .flatten()
            {
                if let Ref::Node(t) = gate {
                    EdgeSet::push_unique(&mut reading, t);
                }
            }
            node.edges.writing_children = node.body.writing_refs();
            node.edges.reading_children = reading;
            node.edges.invalidating_children = SmallVec::from_vec(slot.invalidators);
            nodes.push(node);
        }

        finalize_graph(&mut nodes)?;
        tracing::debug!(map = %self.name, nodes = nodes.len(), "node map finalized");

        Ok(NodeMap::new(
            self.name,
            MapInner {
                nodes,
                name_index: self.name_index,
                depth: 0,
                entry_point: None,
                next_callback_id: 1,
            },
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
