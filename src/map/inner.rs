//! Node-map internals — everything that runs under the central lock.
//!
//! All cross-node recursion (delegated values, bound range properties,
//! formula inputs, converter targets) happens here, on `&mut MapInner`,
//! so one logical call chain touches the graph through exactly one
//! mutable borrow. The re-entrancy depth counter tracks nesting of
//! write-like calls: only the outermost write runs the invalidation
//! sweep, nested writes inside an active chain are no-ops for it.

use hashbrown::HashMap;

use crate::formula::VarResolver;
use crate::graph::invalidate::{self, CallbackList};
use crate::graph::NodeId;
use crate::model::{AccessMode, IncMode, Ref, Value, Visibility};
use crate::node::core::{AccessCacheState, CallbackEntry, CallbackFn};
use crate::node::{
    format_float, format_int, parse_int, CallbackId, CallbackPhase, FloatSource, IntSource,
    InterfaceType, Node, NodeBody, StrSource,
};
use crate::port::{decode_float, decode_int, encode_float, encode_int};
use crate::{Error, Result};

// ============================================================================
// MapInner
// ============================================================================

/// Which top-level client call started the current chain. Attached to
/// every error that crosses the public accessor boundary.
pub(crate) struct EntryPoint {
    pub node: NodeId,
    pub method: &'static str,
}

pub(crate) struct MapInner {
    pub(crate) nodes: Vec<Node>,
    pub(crate) name_index: HashMap<String, NodeId>,
    /// Write-like call nesting depth within the current chain.
    pub(crate) depth: u32,
    pub(crate) entry_point: Option<EntryPoint>,
    pub(crate) next_callback_id: u64,
}

impl MapInner {
    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| Error::Logical(format!("node id {id} out of range")))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| Error::Logical(format!("node id {id} out of range")))
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<NodeId> {
        self.name_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("no node named '{name}'")))
    }

    /// Attach entry-point context to an error leaving the map.
    pub(crate) fn decorate(&self, e: Error) -> Error {
        match &self.entry_point {
            Some(ep) => {
                let name = self
                    .nodes
                    .get(ep.node.index())
                    .map(|n| n.name().to_string())
                    .unwrap_or_else(|| ep.node.to_string());
                e.with_node_context(&name, ep.method)
            }
            None => e,
        }
    }

    fn cast_error(&self, id: NodeId, expected: InterfaceType) -> Error {
        let (name, actual) = match self.node(id) {
            Ok(n) => (n.name().to_string(), n.interface_type().to_string()),
            Err(_) => (id.to_string(), "?".into()),
        };
        Error::InterfaceCast(format!("node '{name}' is {actual}, not {expected}"))
    }

    /// Run a write-like call one nesting level deeper.
    fn write_like<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Invalidate the written node and its dependents, but only at the
    /// outermost nesting level of the chain.
    fn pre_write(&mut self, id: NodeId) {
        if self.depth == 1 {
            invalidate::invalidate_from(&mut self.nodes, id);
        }
    }

    fn refresh_cache_after_write(&mut self, id: NodeId, value: Value) {
        let node = &mut self.nodes[id.index()];
        if node.core.caching_mode.caches_on_write() {
            node.core.cached_value = Some(value);
        }
    }

    pub(crate) fn collect_callbacks(&mut self, id: NodeId) -> CallbackList {
        invalidate::collect_callbacks(&mut self.nodes, id)
    }

    pub(crate) fn clear_pending(&mut self) {
        invalidate::clear_pending(&mut self.nodes);
    }

    // ========================================================================
    // Access mode
    // ========================================================================

    /// Resolved access mode: natural mode (body + gating refs) combined
    /// with the imposed one. Cached per node until invalidation when the
    /// node declares itself access-mode-cacheable.
    pub(crate) fn access_mode(&mut self, id: NodeId) -> Result<AccessMode> {
        match self.node(id)?.core.access_cache {
            AccessCacheState::Cached(mode) => return Ok(mode),
            // Cycle sentinel: a self-referential access-mode computation
            // resolves to RW. Compatibility approximation, not a verified
            // invariant.
            AccessCacheState::InProgress => return Ok(AccessMode::RW),
            AccessCacheState::Invalid => {}
        }

        self.node_mut(id)?.core.access_cache = AccessCacheState::InProgress;
        let computed = self.compute_access_mode(id);
        match computed {
            Ok(mode) => {
                let node = self.node_mut(id)?;
                node.core.access_cache = if node.core.access_cacheable {
                    AccessCacheState::Cached(mode)
                } else {
                    AccessCacheState::Invalid
                };
                Ok(mode)
            }
            Err(e) => {
                self.node_mut(id)?.core.access_cache = AccessCacheState::Invalid;
                Err(e)
            }
        }
    }

    fn compute_access_mode(&mut self, id: NodeId) -> Result<AccessMode> {
        let (implemented, available, locked, imposed) = {
            let core = &self.node(id)?.core;
            (core.is_implemented, core.is_available, core.is_locked, core.imposed_access)
        };

        if let Some(r) = implemented {
            if !self.resolve_bool_ref(r)? {
                return Ok(AccessMode::NI);
            }
        }
        if let Some(r) = available {
            if !self.resolve_bool_ref(r)? {
                return Ok(AccessMode::NA);
            }
        }

        let mut mode = self.natural_body_access(id)?;
        if let Some(r) = locked {
            if self.resolve_bool_ref(r)? {
                mode = mode.combine(AccessMode::RO);
            }
        }
        Ok(mode.combine(imposed))
    }

    fn natural_body_access(&mut self, id: NodeId) -> Result<AccessMode> {
        enum Probe {
            Fixed(AccessMode),
            Delegate(NodeId),
        }

        fn probe_int(source: &IntSource) -> Probe {
            match source {
                IntSource::Value(_) => Probe::Fixed(AccessMode::RW),
                IntSource::Node(t) => Probe::Delegate(*t),
                IntSource::Register(r) => Probe::Fixed(r.declared_access),
                IntSource::Formula(_) => Probe::Fixed(AccessMode::RO),
                IntSource::Converter(c) => Probe::Delegate(c.target),
            }
        }

        fn probe_float(source: &FloatSource) -> Probe {
            match source {
                FloatSource::Value(_) => Probe::Fixed(AccessMode::RW),
                FloatSource::Node(t) => Probe::Delegate(*t),
                FloatSource::Register(r) => Probe::Fixed(r.declared_access),
                FloatSource::Formula(_) => Probe::Fixed(AccessMode::RO),
                FloatSource::Converter(c) => Probe::Delegate(c.target),
            }
        }

        let probe = match &self.node(id)?.body {
            NodeBody::Integer(n) => probe_int(&n.source),
            NodeBody::Boolean(n) => probe_int(&n.source),
            NodeBody::Enumeration(n) => probe_int(&n.source),
            NodeBody::Command(n) => probe_int(&n.source),
            NodeBody::Float(n) => probe_float(&n.source),
            NodeBody::String(n) => match &n.source {
                StrSource::Value(_) => Probe::Fixed(AccessMode::RW),
                StrSource::Register(r) => Probe::Fixed(r.declared_access),
            },
            NodeBody::Register(n) => Probe::Fixed(n.reg.declared_access),
            NodeBody::Category(_) => Probe::Fixed(AccessMode::RO),
        };

        match probe {
            Probe::Fixed(mode) => Ok(mode),
            Probe::Delegate(target) => self.access_mode(target),
        }
    }

    fn require_readable(&mut self, id: NodeId) -> Result<()> {
        let mode = self.access_mode(id)?;
        if mode.is_readable() {
            Ok(())
        } else {
            Err(Error::Access(format!("node is not readable (access mode {mode})")))
        }
    }

    fn require_writable(&mut self, id: NodeId) -> Result<()> {
        let mode = self.access_mode(id)?;
        if mode.is_writable() {
            Ok(())
        } else {
            Err(Error::Access(format!("node is not writable (access mode {mode})")))
        }
    }

    fn resolve_bool_ref(&mut self, r: Ref<bool>) -> Result<bool> {
        match r {
            Ref::Literal(b) => Ok(b),
            Ref::Node(t) => match self.value_of(t)? {
                Value::Bool(b) => Ok(b),
                Value::Int(i) => Ok(i != 0),
                v => Err(Error::Runtime(format!("gating node is not boolean: {v}"))),
            },
        }
    }

    fn resolve_int_ref(&mut self, r: Ref<i64>) -> Result<i64> {
        match r {
            Ref::Literal(v) => Ok(v),
            Ref::Node(t) => {
                let v = self.value_of(t)?;
                v.as_int()
                    .ok_or_else(|| Error::Runtime(format!("bound property is not integral: {v}")))
            }
        }
    }

    fn resolve_float_ref(&mut self, r: Ref<f64>) -> Result<f64> {
        match r {
            Ref::Literal(v) => Ok(v),
            Ref::Node(t) => {
                let v = self.value_of(t)?;
                v.as_float()
                    .ok_or_else(|| Error::Runtime(format!("bound property is not numeric: {v}")))
            }
        }
    }

    /// Generic typed read, used by formula variables and gating refs.
    pub(crate) fn value_of(&mut self, id: NodeId) -> Result<Value> {
        match self.node(id)?.body.interface_type() {
            InterfaceType::Integer => Ok(Value::Int(self.get_int_impl(id, false, false)?)),
            InterfaceType::Float => Ok(Value::Float(self.get_float_impl(id, false, false)?)),
            InterfaceType::Boolean => Ok(Value::Bool(self.get_bool_impl(id, false, false)?)),
            InterfaceType::Enumeration => Ok(Value::Int(self.get_enum_int_impl(id, false, false)?)),
            InterfaceType::String => Ok(Value::Str(self.get_str_impl(id, false, false)?)),
            other => Err(Error::InterfaceCast(format!("{other} node has no plain value"))),
        }
    }

    // ========================================================================
    // Register spans
    // ========================================================================

    fn read_register_bytes(
        &self,
        id: NodeId,
        reg: &crate::node::RegisterRef,
        bypass_cache: bool,
    ) -> Result<Vec<u8>> {
        if !bypass_cache {
            if let Some(bytes) = reg.cache.lookup(reg.address, reg.length) {
                return Ok(bytes);
            }
        }
        let mut buf = vec![0u8; reg.length];
        reg.port.read(&mut buf, reg.address)?;
        if self.node(id)?.core.caching_mode.caches_on_read() {
            reg.cache.update(reg.address, &buf);
        }
        Ok(buf)
    }

    fn write_register_bytes(
        &self,
        id: NodeId,
        reg: &crate::node::RegisterRef,
        bytes: &[u8],
    ) -> Result<()> {
        reg.port.write(bytes, reg.address)?;
        if self.node(id)?.core.caching_mode.caches_on_write() {
            reg.cache.update(reg.address, bytes);
        } else {
            reg.cache.invalidate(reg.address, reg.length);
        }
        Ok(())
    }

    // ========================================================================
    // Integer accessors
    // ========================================================================

    pub(crate) fn get_int_impl(&mut self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<i64> {
        self.require_readable(id)?;
        let bypass = verify || ignore_cache;
        if !bypass {
            if let Some(Value::Int(v)) = self.node(id)?.core.cached_value() {
                return Ok(*v);
            }
        }
        let source = match &self.node(id)?.body {
            NodeBody::Integer(n) => n.source.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Integer)),
        };
        let v = self.int_from_source(id, &source, bypass)?;
        if verify {
            self.check_int_range(id, v)?;
        }
        if self.node(id)?.core.caching_mode.caches_on_read() {
            self.node_mut(id)?.core.cached_value = Some(Value::Int(v));
        }
        Ok(v)
    }

    pub(crate) fn set_int_impl(&mut self, id: NodeId, value: i64, verify: bool) -> Result<()> {
        self.write_like(|inner| inner.do_set_int(id, value, verify))
    }

    fn do_set_int(&mut self, id: NodeId, value: i64, verify: bool) -> Result<()> {
        self.require_writable(id)?;
        let source = match &self.node(id)?.body {
            NodeBody::Integer(n) => n.source.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Integer)),
        };
        if verify {
            self.check_int_range(id, value)?;
        }
        tracing::debug!(node = self.node(id)?.name(), value, "set integer");
        self.pre_write(id);
        self.write_int_source(id, &source, value, verify)?;
        self.refresh_cache_after_write(id, Value::Int(value));
        Ok(())
    }

    fn int_from_source(&mut self, id: NodeId, source: &IntSource, bypass_cache: bool) -> Result<i64> {
        match source {
            IntSource::Value(v) => Ok(*v),
            IntSource::Node(t) => self.get_int_impl(*t, false, bypass_cache),
            IntSource::Register(reg) => {
                let bytes = self.read_register_bytes(id, reg, bypass_cache)?;
                decode_int(&bytes, reg.endianness, reg.signed)
            }
            IntSource::Formula(f) => {
                let program = f.program.clone();
                let bindings = f.bindings.clone();
                let mut resolver = NodeResolver { inner: self, bindings: &bindings, extra: &[] };
                program.eval_int(&mut resolver)
            }
            IntSource::Converter(c) => {
                let raw = self.value_of(c.target)?;
                let program = c.from_device.clone();
                let bindings = c.bindings.clone();
                let extra = [("TO".to_string(), raw)];
                let mut resolver = NodeResolver { inner: self, bindings: &bindings, extra: &extra };
                program.eval_int(&mut resolver)
            }
        }
    }

    fn write_int_source(&mut self, id: NodeId, source: &IntSource, value: i64, verify: bool) -> Result<()> {
        match source {
            IntSource::Value(_) => {
                match int_source_slot(&mut self.node_mut(id)?.body) {
                    Some(IntSource::Value(slot)) => {
                        *slot = value;
                        Ok(())
                    }
                    _ => Err(Error::Logical("literal backing disappeared".into())),
                }
            }
            IntSource::Node(t) => self.set_int_impl(*t, value, verify),
            IntSource::Register(reg) => {
                let bytes = encode_int(value, reg.length, reg.endianness)?;
                self.write_register_bytes(id, reg, &bytes)
            }
            IntSource::Formula(_) => {
                Err(Error::Access("computed feature is read-only".into()))
            }
            IntSource::Converter(c) => {
                let program = c.to_device.clone();
                let bindings = c.bindings.clone();
                let extra = [("FROM".to_string(), Value::Int(value))];
                let device = {
                    let mut resolver =
                        NodeResolver { inner: self, bindings: &bindings, extra: &extra };
                    program.eval_int(&mut resolver)?
                };
                self.write_converted_int(c.target, device, verify)
            }
        }
    }

    fn write_converted_int(&mut self, target: NodeId, device: i64, verify: bool) -> Result<()> {
        match self.node(target)?.body.interface_type() {
            InterfaceType::Integer => self.set_int_impl(target, device, verify),
            InterfaceType::Enumeration => self.set_enum_int_impl(target, device, verify),
            InterfaceType::Boolean => self.set_bool_impl(target, device != 0, verify),
            InterfaceType::Float => self.set_float_impl(target, device as f64, verify),
            _ => Err(self.cast_error(target, InterfaceType::Integer)),
        }
    }

    pub(crate) fn int_min_impl(&mut self, id: NodeId) -> Result<i64> {
        let min_ref = match &self.node(id)?.body {
            NodeBody::Integer(n) => n.min,
            _ => return Err(self.cast_error(id, InterfaceType::Integer)),
        };
        let natural = self.resolve_int_ref(min_ref)?;
        match &self.node(id)?.body {
            NodeBody::Integer(n) => Ok(n.effective_min(natural)),
            _ => unreachable!("checked above"),
        }
    }

    pub(crate) fn int_max_impl(&mut self, id: NodeId) -> Result<i64> {
        let max_ref = match &self.node(id)?.body {
            NodeBody::Integer(n) => n.max,
            _ => return Err(self.cast_error(id, InterfaceType::Integer)),
        };
        let natural = self.resolve_int_ref(max_ref)?;
        match &self.node(id)?.body {
            NodeBody::Integer(n) => Ok(n.effective_max(natural)),
            _ => unreachable!("checked above"),
        }
    }

    pub(crate) fn int_inc_impl(&mut self, id: NodeId) -> Result<i64> {
        let inc_ref = match &self.node(id)?.body {
            NodeBody::Integer(n) => n.inc,
            _ => return Err(self.cast_error(id, InterfaceType::Integer)),
        };
        self.resolve_int_ref(inc_ref)
    }

    /// Legal values for list-constrained integers, clamped to the
    /// effective range and cached until invalidation. Empty for nodes
    /// without a value list.
    pub(crate) fn int_valid_values_impl(&mut self, id: NodeId) -> Result<Vec<i64>> {
        let (mode, list, cached) = match &self.node(id)?.body {
            NodeBody::Integer(n) => (n.inc_mode, n.value_list.clone(), n.valid_values_cache.clone()),
            _ => return Err(self.cast_error(id, InterfaceType::Integer)),
        };
        if let Some(values) = cached {
            return Ok(values);
        }
        let values = if mode == IncMode::List {
            let min = self.int_min_impl(id)?;
            let max = self.int_max_impl(id)?;
            list.into_iter().filter(|v| *v >= min && *v <= max).collect()
        } else {
            Vec::new()
        };
        if let NodeBody::Integer(n) = &mut self.node_mut(id)?.body {
            n.valid_values_cache = Some(values.clone());
        }
        Ok(values)
    }

    fn check_int_range(&mut self, id: NodeId, v: i64) -> Result<()> {
        let min = self.int_min_impl(id)?;
        let max = self.int_max_impl(id)?;
        if v < min || v > max {
            return Err(Error::OutOfRange(format!("value {v} outside [{min}, {max}]")));
        }
        let inc_mode = match &self.node(id)?.body {
            NodeBody::Integer(n) => n.inc_mode,
            _ => return Ok(()),
        };
        match inc_mode {
            IncMode::Fixed => {
                let inc = self.int_inc_impl(id)?;
                if inc > 1 && (v as i128 - min as i128) % inc as i128 != 0 {
                    return Err(Error::OutOfRange(format!(
                        "value {v} is not reachable from {min} with increment {inc}"
                    )));
                }
            }
            IncMode::List => {
                if !self.int_valid_values_impl(id)?.contains(&v) {
                    return Err(Error::OutOfRange(format!("value {v} is not in the value list")));
                }
            }
            IncMode::None => {}
        }
        Ok(())
    }

    // ========================================================================
    // Float accessors
    // ========================================================================

    pub(crate) fn get_float_impl(&mut self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<f64> {
        self.require_readable(id)?;
        let bypass = verify || ignore_cache;
        if !bypass {
            if let Some(Value::Float(v)) = self.node(id)?.core.cached_value() {
                return Ok(*v);
            }
        }
        let source = match &self.node(id)?.body {
            NodeBody::Float(n) => n.source.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Float)),
        };
        let v = self.float_from_source(id, &source, bypass)?;
        if verify {
            self.check_float_range(id, v)?;
        }
        if self.node(id)?.core.caching_mode.caches_on_read() {
            self.node_mut(id)?.core.cached_value = Some(Value::Float(v));
        }
        Ok(v)
    }

    pub(crate) fn set_float_impl(&mut self, id: NodeId, value: f64, verify: bool) -> Result<()> {
        self.write_like(|inner| inner.do_set_float(id, value, verify))
    }

    fn do_set_float(&mut self, id: NodeId, value: f64, verify: bool) -> Result<()> {
        self.require_writable(id)?;
        let source = match &self.node(id)?.body {
            NodeBody::Float(n) => n.source.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Float)),
        };
        if verify {
            self.check_float_range(id, value)?;
        }
        tracing::debug!(node = self.node(id)?.name(), value, "set float");
        self.pre_write(id);
        self.write_float_source(id, &source, value, verify)?;
        self.refresh_cache_after_write(id, Value::Float(value));
        Ok(())
    }

    fn float_from_source(&mut self, id: NodeId, source: &FloatSource, bypass_cache: bool) -> Result<f64> {
        match source {
            FloatSource::Value(v) => Ok(*v),
            FloatSource::Node(t) => {
                let v = self.value_of(*t)?;
                v.as_float()
                    .ok_or_else(|| Error::Runtime(format!("delegated value is not numeric: {v}")))
            }
            FloatSource::Register(reg) => {
                let bytes = self.read_register_bytes(id, reg, bypass_cache)?;
                decode_float(&bytes, reg.endianness)
            }
            FloatSource::Formula(f) => {
                let program = f.program.clone();
                let bindings = f.bindings.clone();
                let mut resolver = NodeResolver { inner: self, bindings: &bindings, extra: &[] };
                program.eval_float(&mut resolver)
            }
            FloatSource::Converter(c) => {
                let raw = self.value_of(c.target)?;
                let program = c.from_device.clone();
                let bindings = c.bindings.clone();
                let extra = [("TO".to_string(), raw)];
                let mut resolver = NodeResolver { inner: self, bindings: &bindings, extra: &extra };
                program.eval_float(&mut resolver)
            }
        }
    }

    fn write_float_source(&mut self, id: NodeId, source: &FloatSource, value: f64, verify: bool) -> Result<()> {
        match source {
            FloatSource::Value(_) => {
                match float_source_slot(&mut self.node_mut(id)?.body) {
                    Some(FloatSource::Value(slot)) => {
                        *slot = value;
                        Ok(())
                    }
                    _ => Err(Error::Logical("literal backing disappeared".into())),
                }
            }
            FloatSource::Node(t) => {
                let target = *t;
                match self.node(target)?.body.interface_type() {
                    InterfaceType::Float => self.set_float_impl(target, value, verify),
                    InterfaceType::Integer => self.set_int_impl(target, value.round() as i64, verify),
                    _ => Err(self.cast_error(target, InterfaceType::Float)),
                }
            }
            FloatSource::Register(reg) => {
                let bytes = encode_float(value, reg.length, reg.endianness)?;
                self.write_register_bytes(id, reg, &bytes)
            }
            FloatSource::Formula(_) => {
                Err(Error::Access("computed feature is read-only".into()))
            }
            FloatSource::Converter(c) => {
                let program = c.to_device.clone();
                let bindings = c.bindings.clone();
                let extra = [("FROM".to_string(), Value::Float(value))];
                let device = {
                    let mut resolver =
                        NodeResolver { inner: self, bindings: &bindings, extra: &extra };
                    program.eval_float(&mut resolver)?
                };
                match self.node(c.target)?.body.interface_type() {
                    InterfaceType::Float => self.set_float_impl(c.target, device, verify),
                    InterfaceType::Integer => {
                        self.set_int_impl(c.target, device.round() as i64, verify)
                    }
                    _ => Err(self.cast_error(c.target, InterfaceType::Float)),
                }
            }
        }
    }

    pub(crate) fn float_min_impl(&mut self, id: NodeId) -> Result<f64> {
        let min_ref = match &self.node(id)?.body {
            NodeBody::Float(n) => n.min,
            _ => return Err(self.cast_error(id, InterfaceType::Float)),
        };
        let natural = self.resolve_float_ref(min_ref)?;
        match &self.node(id)?.body {
            NodeBody::Float(n) => Ok(n.effective_min(natural)),
            _ => unreachable!("checked above"),
        }
    }

    pub(crate) fn float_max_impl(&mut self, id: NodeId) -> Result<f64> {
        let max_ref = match &self.node(id)?.body {
            NodeBody::Float(n) => n.max,
            _ => return Err(self.cast_error(id, InterfaceType::Float)),
        };
        let natural = self.resolve_float_ref(max_ref)?;
        match &self.node(id)?.body {
            NodeBody::Float(n) => Ok(n.effective_max(natural)),
            _ => unreachable!("checked above"),
        }
    }

    fn check_float_range(&mut self, id: NodeId, v: f64) -> Result<()> {
        let min = self.float_min_impl(id)?;
        let max = self.float_max_impl(id)?;
        if v < min || v > max || v.is_nan() {
            return Err(Error::OutOfRange(format!("value {v} outside [{min}, {max}]")));
        }
        Ok(())
    }

    // ========================================================================
    // Boolean accessors
    // ========================================================================

    pub(crate) fn get_bool_impl(&mut self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<bool> {
        self.require_readable(id)?;
        let bypass = verify || ignore_cache;
        if !bypass {
            if let Some(Value::Bool(v)) = self.node(id)?.core.cached_value() {
                return Ok(*v);
            }
        }
        let source = match &self.node(id)?.body {
            NodeBody::Boolean(n) => n.source.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Boolean)),
        };
        let raw = self.int_from_source(id, &source, bypass)?;
        let decoded = match &self.node(id)?.body {
            NodeBody::Boolean(n) => n.decode(raw),
            _ => None,
        };
        let v = decoded.ok_or_else(|| {
            Error::Runtime(format!("device value {raw} matches neither on nor off"))
        })?;
        if self.node(id)?.core.caching_mode.caches_on_read() {
            self.node_mut(id)?.core.cached_value = Some(Value::Bool(v));
        }
        Ok(v)
    }

    pub(crate) fn set_bool_impl(&mut self, id: NodeId, value: bool, verify: bool) -> Result<()> {
        self.write_like(|inner| inner.do_set_bool(id, value, verify))
    }

    fn do_set_bool(&mut self, id: NodeId, value: bool, verify: bool) -> Result<()> {
        self.require_writable(id)?;
        let (source, raw) = match &self.node(id)?.body {
            NodeBody::Boolean(n) => (n.source.clone(), n.encode(value)),
            _ => return Err(self.cast_error(id, InterfaceType::Boolean)),
        };
        self.pre_write(id);
        self.write_int_source(id, &source, raw, verify)?;
        self.refresh_cache_after_write(id, Value::Bool(value));
        Ok(())
    }

    // ========================================================================
    // Enumeration accessors
    // ========================================================================

    pub(crate) fn get_enum_int_impl(&mut self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<i64> {
        self.require_readable(id)?;
        let bypass = verify || ignore_cache;
        if !bypass {
            if let Some(Value::Int(v)) = self.node(id)?.core.cached_value() {
                return Ok(*v);
            }
        }
        let source = match &self.node(id)?.body {
            NodeBody::Enumeration(n) => n.source.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Enumeration)),
        };
        let raw = self.int_from_source(id, &source, bypass)?;
        if verify {
            let known = match &self.node(id)?.body {
                NodeBody::Enumeration(n) => n.entry_by_value(raw).is_some(),
                _ => false,
            };
            if !known {
                return Err(Error::Runtime(format!("device reports unknown entry value {raw}")));
            }
        }
        if self.node(id)?.core.caching_mode.caches_on_read() {
            self.node_mut(id)?.core.cached_value = Some(Value::Int(raw));
        }
        Ok(raw)
    }

    pub(crate) fn get_enum_impl(&mut self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<String> {
        let raw = self.get_enum_int_impl(id, verify, ignore_cache)?;
        match &self.node(id)?.body {
            NodeBody::Enumeration(n) => n
                .entry_by_value(raw)
                .map(|e| e.symbolic.clone())
                .ok_or_else(|| Error::Runtime(format!("no entry for device value {raw}"))),
            _ => Err(self.cast_error(id, InterfaceType::Enumeration)),
        }
    }

    pub(crate) fn set_enum_impl(&mut self, id: NodeId, symbolic: &str, verify: bool) -> Result<()> {
        let value = match &self.node(id)?.body {
            NodeBody::Enumeration(n) => n
                .entry_by_symbolic(symbolic)
                .map(|e| e.value)
                .ok_or_else(|| {
                    Error::InvalidArgument(format!("no enumeration entry '{symbolic}'"))
                })?,
            _ => return Err(self.cast_error(id, InterfaceType::Enumeration)),
        };
        self.set_enum_int_impl(id, value, verify)
    }

    pub(crate) fn set_enum_int_impl(&mut self, id: NodeId, value: i64, verify: bool) -> Result<()> {
        self.write_like(|inner| inner.do_set_enum_int(id, value, verify))
    }

    fn do_set_enum_int(&mut self, id: NodeId, value: i64, verify: bool) -> Result<()> {
        self.require_writable(id)?;
        let (source, availability) = match &self.node(id)?.body {
            NodeBody::Enumeration(n) => match n.entry_by_value(value) {
                Some(entry) => (n.source.clone(), entry.is_available),
                None => {
                    return Err(Error::InvalidArgument(format!(
                        "no enumeration entry with value {value}"
                    )))
                }
            },
            _ => return Err(self.cast_error(id, InterfaceType::Enumeration)),
        };
        if verify {
            if let Some(r) = availability {
                if !self.resolve_bool_ref(r)? {
                    return Err(Error::Access(format!(
                        "enumeration entry {value} is currently not available"
                    )));
                }
            }
        }
        self.pre_write(id);
        self.write_int_source(id, &source, value, verify)?;
        self.refresh_cache_after_write(id, Value::Int(value));
        Ok(())
    }

    /// Entry values that are currently available, in declaration order.
    pub(crate) fn available_enum_values_impl(&mut self, id: NodeId) -> Result<Vec<i64>> {
        let entries: Vec<(i64, Option<Ref<bool>>)> = match &self.node(id)?.body {
            NodeBody::Enumeration(n) => {
                n.entries.iter().map(|e| (e.value, e.is_available)).collect()
            }
            _ => return Err(self.cast_error(id, InterfaceType::Enumeration)),
        };
        let mut out = Vec::with_capacity(entries.len());
        for (value, availability) in entries {
            let available = match availability {
                Some(r) => self.resolve_bool_ref(r)?,
                None => true,
            };
            if available {
                out.push(value);
            }
        }
        Ok(out)
    }

    pub(crate) fn enum_symbolics_impl(&self, id: NodeId) -> Result<Vec<String>> {
        match &self.node(id)?.body {
            NodeBody::Enumeration(n) => {
                Ok(n.entries.iter().map(|e| e.symbolic.clone()).collect())
            }
            _ => Err(self.cast_error(id, InterfaceType::Enumeration)),
        }
    }

    pub(crate) fn enum_entry_value_impl(&self, id: NodeId, symbolic: &str) -> Result<i64> {
        match &self.node(id)?.body {
            NodeBody::Enumeration(n) => n
                .entry_by_symbolic(symbolic)
                .map(|e| e.value)
                .ok_or_else(|| {
                    Error::InvalidArgument(format!("no enumeration entry '{symbolic}'"))
                }),
            _ => Err(self.cast_error(id, InterfaceType::Enumeration)),
        }
    }

    // ========================================================================
    // String accessors
    // ========================================================================

    pub(crate) fn get_str_impl(&mut self, id: NodeId, _verify: bool, ignore_cache: bool) -> Result<String> {
        self.require_readable(id)?;
        if !ignore_cache {
            if let Some(Value::Str(v)) = self.node(id)?.core.cached_value() {
                return Ok(v.clone());
            }
        }
        let source = match &self.node(id)?.body {
            NodeBody::String(n) => n.source.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::String)),
        };
        let v = match &source {
            StrSource::Value(s) => s.clone(),
            StrSource::Register(reg) => {
                let bytes = self.read_register_bytes(id, reg, ignore_cache)?;
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                String::from_utf8(bytes[..end].to_vec())
                    .map_err(|_| Error::Runtime("register holds invalid UTF-8".into()))?
            }
        };
        if self.node(id)?.core.caching_mode.caches_on_read() {
            self.node_mut(id)?.core.cached_value = Some(Value::Str(v.clone()));
        }
        Ok(v)
    }

    pub(crate) fn set_str_impl(&mut self, id: NodeId, value: &str, verify: bool) -> Result<()> {
        self.write_like(|inner| inner.do_set_str(id, value, verify))
    }

    fn do_set_str(&mut self, id: NodeId, value: &str, _verify: bool) -> Result<()> {
        self.require_writable(id)?;
        let (source, capacity) = match &self.node(id)?.body {
            NodeBody::String(n) => (n.source.clone(), n.capacity()),
            _ => return Err(self.cast_error(id, InterfaceType::String)),
        };
        if let Some(cap) = capacity {
            if value.len() > cap {
                return Err(Error::OutOfRange(format!(
                    "string of {} bytes exceeds capacity {cap}",
                    value.len()
                )));
            }
        }
        self.pre_write(id);
        match &source {
            StrSource::Value(_) => match &mut self.node_mut(id)?.body {
                NodeBody::String(n) => {
                    if let StrSource::Value(slot) = &mut n.source {
                        *slot = value.to_string();
                    }
                }
                _ => return Err(Error::Logical("literal backing disappeared".into())),
            },
            StrSource::Register(reg) => {
                let mut buf = vec![0u8; reg.length];
                buf[..value.len()].copy_from_slice(value.as_bytes());
                self.write_register_bytes(id, reg, &buf)?;
            }
        }
        self.refresh_cache_after_write(id, Value::Str(value.to_string()));
        Ok(())
    }

    // ========================================================================
    // Raw register accessors
    // ========================================================================

    pub(crate) fn get_register_impl(&mut self, id: NodeId, ignore_cache: bool) -> Result<Vec<u8>> {
        self.require_readable(id)?;
        let reg = match &self.node(id)?.body {
            NodeBody::Register(n) => n.reg.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Register)),
        };
        self.read_register_bytes(id, &reg, ignore_cache)
    }

    pub(crate) fn set_register_impl(&mut self, id: NodeId, bytes: &[u8]) -> Result<()> {
        self.write_like(|inner| inner.do_set_register(id, bytes))
    }

    fn do_set_register(&mut self, id: NodeId, bytes: &[u8]) -> Result<()> {
        self.require_writable(id)?;
        let reg = match &self.node(id)?.body {
            NodeBody::Register(n) => n.reg.clone(),
            _ => return Err(self.cast_error(id, InterfaceType::Register)),
        };
        if bytes.len() != reg.length {
            return Err(Error::OutOfRange(format!(
                "{} bytes written to a {}-byte register",
                bytes.len(),
                reg.length
            )));
        }
        self.pre_write(id);
        self.write_register_bytes(id, &reg, bytes)
    }

    // ========================================================================
    // Command accessors
    // ========================================================================

    pub(crate) fn execute_impl(&mut self, id: NodeId, verify: bool) -> Result<()> {
        self.write_like(|inner| inner.do_execute(id, verify))
    }

    fn do_execute(&mut self, id: NodeId, verify: bool) -> Result<()> {
        self.require_writable(id)?;
        let (source, command_value) = match &self.node(id)?.body {
            NodeBody::Command(n) => (n.source.clone(), n.command_value),
            _ => return Err(self.cast_error(id, InterfaceType::Command)),
        };
        tracing::debug!(node = self.node(id)?.name(), "execute command");
        self.pre_write(id);
        self.write_int_source(id, &source, command_value, verify)
    }

    /// Self-resetting commands report done once the device clears the
    /// command value. Literal and write-only backings have nothing to
    /// poll and report done immediately.
    pub(crate) fn is_done_impl(&mut self, id: NodeId) -> Result<bool> {
        let (source, command_value) = match &self.node(id)?.body {
            NodeBody::Command(n) => (n.source.clone(), n.command_value),
            _ => return Err(self.cast_error(id, InterfaceType::Command)),
        };
        if matches!(source, IntSource::Value(_)) || !self.access_mode(id)?.is_readable() {
            return Ok(true);
        }
        let raw = self.int_from_source(id, &source, true)?;
        Ok(raw != command_value)
    }

    // ========================================================================
    // Generic string conversion
    // ========================================================================

    pub(crate) fn to_string_impl(&mut self, id: NodeId) -> Result<String> {
        match self.node(id)?.body.interface_type() {
            InterfaceType::Integer => {
                let v = self.get_int_impl(id, false, false)?;
                let repr = match &self.node(id)?.body {
                    NodeBody::Integer(n) => n.representation,
                    _ => unreachable!("checked above"),
                };
                Ok(format_int(v, repr))
            }
            InterfaceType::Float => {
                let v = self.get_float_impl(id, false, false)?;
                let (notation, precision) = match &self.node(id)?.body {
                    NodeBody::Float(n) => (n.notation, n.precision),
                    _ => unreachable!("checked above"),
                };
                let min = self.float_min_impl(id)?;
                let max = self.float_max_impl(id)?;
                Ok(format_float(v, notation, precision, min, max))
            }
            InterfaceType::Boolean => Ok(self.get_bool_impl(id, false, false)?.to_string()),
            InterfaceType::Enumeration => self.get_enum_impl(id, false, false),
            InterfaceType::String => self.get_str_impl(id, false, false),
            InterfaceType::Command => {
                Ok(if self.is_done_impl(id)? { "1" } else { "0" }.to_string())
            }
            InterfaceType::Register => {
                let bytes = self.get_register_impl(id, false)?;
                let mut s = String::with_capacity(2 + 2 * bytes.len());
                s.push_str("0x");
                for b in &bytes {
                    s.push_str(&format!("{b:02X}"));
                }
                Ok(s)
            }
            InterfaceType::Category => {
                Err(Error::InterfaceCast("category has no value".into()))
            }
        }
    }

    pub(crate) fn from_string_impl(&mut self, id: NodeId, s: &str, verify: bool) -> Result<()> {
        let s = s.trim();
        match self.node(id)?.body.interface_type() {
            InterfaceType::Integer => {
                let repr = match &self.node(id)?.body {
                    NodeBody::Integer(n) => n.representation,
                    _ => unreachable!("checked above"),
                };
                let v = parse_int(s, repr)?;
                self.set_int_impl(id, v, verify)
            }
            InterfaceType::Float => {
                let v = s.parse::<f64>().map_err(|_| {
                    Error::InvalidArgument(format!("'{s}' is not a float"))
                })?;
                self.set_float_impl(id, v, verify)
            }
            InterfaceType::Boolean => {
                let v = match s {
                    "1" | "true" | "True" | "TRUE" => true,
                    "0" | "false" | "False" | "FALSE" => false,
                    _ => {
                        return Err(Error::InvalidArgument(format!("'{s}' is not a boolean")))
                    }
                };
                self.set_bool_impl(id, v, verify)
            }
            InterfaceType::Enumeration => self.set_enum_impl(id, s, verify),
            InterfaceType::String => self.set_str_impl(id, s, verify),
            InterfaceType::Command => {
                if s == "1" {
                    self.execute_impl(id, verify)
                } else {
                    Err(Error::InvalidArgument(format!(
                        "'{s}' does not trigger a command (use \"1\")"
                    )))
                }
            }
            InterfaceType::Register => {
                let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
                if hex.len() % 2 != 0 {
                    return Err(Error::InvalidArgument("odd-length hex string".into()));
                }
                let mut bytes = Vec::with_capacity(hex.len() / 2);
                for chunk in hex.as_bytes().chunks(2) {
                    let pair = std::str::from_utf8(chunk).unwrap_or("");
                    bytes.push(u8::from_str_radix(pair, 16).map_err(|_| {
                        Error::InvalidArgument(format!("'{s}' is not a hex byte string"))
                    })?);
                }
                self.set_register_impl(id, &bytes)
            }
            InterfaceType::Category => {
                Err(Error::InterfaceCast("category has no value".into()))
            }
        }
    }

    // ========================================================================
    // Imposed restrictions
    // ========================================================================

    pub(crate) fn impose_access_impl(&mut self, id: NodeId, mode: AccessMode) -> Result<()> {
        self.node_mut(id)?.core.imposed_access = mode;
        invalidate::invalidate_quietly(&mut self.nodes, id);
        Ok(())
    }

    pub(crate) fn impose_visibility_impl(&mut self, id: NodeId, visibility: Visibility) -> Result<()> {
        self.node_mut(id)?.core.imposed_visibility = visibility;
        Ok(())
    }

    pub(crate) fn impose_int_range_impl(
        &mut self,
        id: NodeId,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Result<()> {
        match &mut self.node_mut(id)?.body {
            NodeBody::Integer(n) => {
                n.imposed_min = min;
                n.imposed_max = max;
            }
            _ => return Err(self.cast_error(id, InterfaceType::Integer)),
        }
        invalidate::invalidate_quietly(&mut self.nodes, id);
        Ok(())
    }

    pub(crate) fn impose_float_range_impl(
        &mut self,
        id: NodeId,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<()> {
        match &mut self.node_mut(id)?.body {
            NodeBody::Float(n) => {
                n.imposed_min = min;
                n.imposed_max = max;
            }
            _ => return Err(self.cast_error(id, InterfaceType::Float)),
        }
        invalidate::invalidate_quietly(&mut self.nodes, id);
        Ok(())
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    pub(crate) fn register_callback_impl(
        &mut self,
        id: NodeId,
        phase: CallbackPhase,
        func: CallbackFn,
    ) -> Result<CallbackId> {
        let cb_id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        self.node_mut(id)?.core.callbacks.push(CallbackEntry { id: cb_id, phase, func });
        Ok(cb_id)
    }

    pub(crate) fn deregister_callback_impl(&mut self, id: NodeId, cb_id: CallbackId) -> Result<bool> {
        let callbacks = &mut self.node_mut(id)?.core.callbacks;
        let before = callbacks.len();
        callbacks.retain(|cb| cb.id != cb_id);
        Ok(callbacks.len() != before)
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Advance every polled node's elapsed time; invalidate those that
    /// are due and hand back their callbacks for two-phase firing.
    pub(crate) fn poll_impl(&mut self, elapsed_ms: u64) -> CallbackList {
        let mut due: Vec<NodeId> = Vec::new();
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if let Some(interval) = node.core.polling_interval {
                node.core.poll_elapsed += elapsed_ms;
                if node.core.poll_elapsed >= interval {
                    node.core.poll_elapsed = 0;
                    due.push(NodeId(i as u32));
                }
            }
        }
        let mut list = CallbackList::default();
        for id in &due {
            invalidate::invalidate_from(&mut self.nodes, *id);
        }
        for id in &due {
            list.merge(invalidate::collect_callbacks(&mut self.nodes, *id));
        }
        list
    }
}

// ============================================================================
// Formula variable resolution against the graph
// ============================================================================

struct NodeResolver<'a> {
    inner: &'a mut MapInner,
    bindings: &'a [(String, NodeId)],
    extra: &'a [(String, Value)],
}

impl VarResolver for NodeResolver<'_> {
    fn lookup(&mut self, name: &str) -> Result<Value> {
        if let Some((_, v)) = self.extra.iter().find(|(n, _)| n == name) {
            return Ok(v.clone());
        }
        if let Some((_, id)) = self.bindings.iter().find(|(n, _)| n == name) {
            return self.inner.value_of(*id);
        }
        Err(Error::Runtime(format!("unresolved formula variable '{name}'")))
    }
}

// ============================================================================
// Body slot helpers
// ============================================================================

fn int_source_slot(body: &mut NodeBody) -> Option<&mut IntSource> {
    match body {
        NodeBody::Integer(n) => Some(&mut n.source),
        NodeBody::Boolean(n) => Some(&mut n.source),
        NodeBody::Enumeration(n) => Some(&mut n.source),
        NodeBody::Command(n) => Some(&mut n.source),
        _ => None,
    }
}

fn float_source_slot(body: &mut NodeBody) -> Option<&mut FloatSource> {
    match body {
        NodeBody::Float(n) => Some(&mut n.source),
        _ => None,
    }
}
