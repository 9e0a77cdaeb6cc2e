//! # Node Map Container
//!
//! `NodeMap` owns the node arena, the name index, and the single central
//! lock serializing all graph access. Every public accessor acquires the
//! lock on entry and releases it on scope exit; re-entrancy within one
//! logical call chain is tracked by an explicit depth counter, not by
//! lock recursion.
//!
//! ## Callback protocol
//!
//! A successful write collects the pending callbacks of every node it
//! invalidated into an explicit list. All `InsideLock` callbacks fire
//! while the guard is still held, then the guard drops and the
//! `OutsideLock` callbacks fire — so an outside-lock callback may safely
//! re-enter the node map. Callbacks never fire for a failed write.

pub(crate) mod inner;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::invalidate::{self, CallbackList};
use crate::graph::NodeId;
use crate::model::{AccessMode, Value, Visibility};
use crate::node::InterfaceType;
use crate::{Error, Result};

use inner::{EntryPoint, MapInner};

pub use crate::node::{CallbackId, CallbackPhase};

// ============================================================================
// NodeMap
// ============================================================================

/// The container owning all nodes of one device's schema.
pub struct NodeMap {
    pub(crate) inner: Mutex<MapInner>,
    name: String,
}

impl NodeMap {
    pub(crate) fn new(name: String, inner: MapInner) -> Self {
        Self { inner: Mutex::new(inner), name }
    }

    /// The device/schema name this map was built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Lock discipline
    // ========================================================================

    fn read_op<R>(
        &self,
        id: NodeId,
        method: &'static str,
        f: impl FnOnce(&mut MapInner) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.lock();
        inner.entry_point = Some(EntryPoint { node: id, method });
        let result = f(&mut inner).map_err(|e| inner.decorate(e));
        inner.entry_point = None;
        result
    }

    fn write_op(
        &self,
        id: NodeId,
        method: &'static str,
        f: impl FnOnce(&mut MapInner) -> Result<()>,
    ) -> Result<()> {
        let (result, callbacks) = {
            let mut inner = self.inner.lock();
            inner.entry_point = Some(EntryPoint { node: id, method });
            let result = f(&mut inner);
            let callbacks = match &result {
                Ok(()) => inner.collect_callbacks(id),
                Err(_) => {
                    // Caches stay invalid, but nothing fires for a failed
                    // write.
                    inner.clear_pending();
                    CallbackList::default()
                }
            };
            let result = result.map_err(|e| inner.decorate(e));
            inner.entry_point = None;

            for cb in callbacks.phase(CallbackPhase::InsideLock) {
                cb.fire();
            }
            (result, callbacks)
        };

        for cb in callbacks.phase(CallbackPhase::OutsideLock) {
            cb.fire();
        }
        result
    }

    fn fire_two_phase(&self, callbacks: CallbackList) {
        {
            let _guard = self.inner.lock();
            for cb in callbacks.phase(CallbackPhase::InsideLock) {
                cb.fire();
            }
        }
        for cb in callbacks.phase(CallbackPhase::OutsideLock) {
            cb.fire();
        }
    }

    // ========================================================================
    // Lookup and metadata
    // ========================================================================

    /// Look a node up by qualified name.
    pub fn node(&self, name: &str) -> Result<NodeId> {
        self.inner.lock().lookup(name)
    }

    /// Every node id, in arena order.
    pub fn nodes(&self) -> Vec<NodeId> {
        let inner = self.inner.lock();
        (0..inner.nodes.len() as u32).map(NodeId).collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn node_name(&self, id: NodeId) -> Result<String> {
        Ok(self.inner.lock().node(id)?.name().to_string())
    }

    pub fn interface_type(&self, id: NodeId) -> Result<InterfaceType> {
        Ok(self.inner.lock().node(id)?.interface_type())
    }

    pub fn display_name(&self, id: NodeId) -> Result<String> {
        let inner = self.inner.lock();
        let node = inner.node(id)?;
        Ok(node
            .core
            .display_name
            .clone()
            .unwrap_or_else(|| node.name().to_string()))
    }

    pub fn description(&self, id: NodeId) -> Result<Option<String>> {
        Ok(self.inner.lock().node(id)?.core.description.clone())
    }

    pub fn tool_tip(&self, id: NodeId) -> Result<Option<String>> {
        Ok(self.inner.lock().node(id)?.core.tool_tip.clone())
    }

    /// Effective visibility: schema visibility combined with the imposed
    /// one.
    pub fn visibility(&self, id: NodeId) -> Result<Visibility> {
        Ok(self.inner.lock().node(id)?.core.effective_visibility())
    }

    /// Resolved access mode.
    pub fn access_mode(&self, id: NodeId) -> Result<AccessMode> {
        self.read_op(id, "GetAccessMode", |inner| inner.access_mode(id))
    }

    /// Feature children of a category node.
    pub fn category_features(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let inner = self.inner.lock();
        match &inner.node(id)?.body {
            crate::node::NodeBody::Category(c) => Ok(c.features.clone()),
            _ => Err(Error::InterfaceCast(format!(
                "node '{}' is not a category",
                inner.node(id)?.name()
            ))),
        }
    }

    // ========================================================================
    // Integer interface
    // ========================================================================

    pub fn get_int(&self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<i64> {
        self.read_op(id, "GetValue", |inner| inner.get_int_impl(id, verify, ignore_cache))
    }

    /// `get_int` with verification off and caching honored.
    pub fn int_value(&self, id: NodeId) -> Result<i64> {
        self.get_int(id, false, false)
    }

    pub fn set_int(&self, id: NodeId, value: i64, verify: bool) -> Result<()> {
        self.write_op(id, "SetValue", |inner| inner.set_int_impl(id, value, verify))
    }

    pub fn int_min(&self, id: NodeId) -> Result<i64> {
        self.read_op(id, "GetMin", |inner| inner.int_min_impl(id))
    }

    pub fn int_max(&self, id: NodeId) -> Result<i64> {
        self.read_op(id, "GetMax", |inner| inner.int_max_impl(id))
    }

    pub fn int_inc(&self, id: NodeId) -> Result<i64> {
        self.read_op(id, "GetInc", |inner| inner.int_inc_impl(id))
    }

    /// Legal values of a list-constrained integer; empty when the node is
    /// not list-constrained.
    pub fn int_valid_values(&self, id: NodeId) -> Result<Vec<i64>> {
        self.read_op(id, "GetListOfValidValues", |inner| inner.int_valid_values_impl(id))
    }

    // ========================================================================
    // Float interface
    // ========================================================================

    pub fn get_float(&self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<f64> {
        self.read_op(id, "GetValue", |inner| inner.get_float_impl(id, verify, ignore_cache))
    }

    pub fn float_value(&self, id: NodeId) -> Result<f64> {
        self.get_float(id, false, false)
    }

    pub fn set_float(&self, id: NodeId, value: f64, verify: bool) -> Result<()> {
        self.write_op(id, "SetValue", |inner| inner.set_float_impl(id, value, verify))
    }

    pub fn float_min(&self, id: NodeId) -> Result<f64> {
        self.read_op(id, "GetMin", |inner| inner.float_min_impl(id))
    }

    pub fn float_max(&self, id: NodeId) -> Result<f64> {
        self.read_op(id, "GetMax", |inner| inner.float_max_impl(id))
    }

    // ========================================================================
    // Boolean interface
    // ========================================================================

    pub fn get_bool(&self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<bool> {
        self.read_op(id, "GetValue", |inner| inner.get_bool_impl(id, verify, ignore_cache))
    }

    pub fn bool_value(&self, id: NodeId) -> Result<bool> {
        self.get_bool(id, false, false)
    }

    pub fn set_bool(&self, id: NodeId, value: bool, verify: bool) -> Result<()> {
        self.write_op(id, "SetValue", |inner| inner.set_bool_impl(id, value, verify))
    }

    // ========================================================================
    // Enumeration interface
    // ========================================================================

    /// Current entry, as its symbolic name.
    pub fn get_enum(&self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<String> {
        self.read_op(id, "GetValue", |inner| inner.get_enum_impl(id, verify, ignore_cache))
    }

    pub fn enum_value(&self, id: NodeId) -> Result<String> {
        self.get_enum(id, false, false)
    }

    /// Select an entry by symbolic name.
    pub fn set_enum(&self, id: NodeId, symbolic: &str, verify: bool) -> Result<()> {
        self.write_op(id, "SetValue", |inner| inner.set_enum_impl(id, symbolic, verify))
    }

    /// Current entry, as its device integer value.
    pub fn enum_int_value(&self, id: NodeId) -> Result<i64> {
        self.read_op(id, "GetIntValue", |inner| inner.get_enum_int_impl(id, false, false))
    }

    /// Select an entry by device integer value.
    pub fn set_enum_int(&self, id: NodeId, value: i64, verify: bool) -> Result<()> {
        self.write_op(id, "SetIntValue", |inner| inner.set_enum_int_impl(id, value, verify))
    }

    /// All entries' symbolic names, in declaration order.
    pub fn enum_symbolics(&self, id: NodeId) -> Result<Vec<String>> {
        self.inner.lock().enum_symbolics_impl(id)
    }

    pub fn enum_entry_value(&self, id: NodeId, symbolic: &str) -> Result<i64> {
        self.inner.lock().enum_entry_value_impl(id, symbolic)
    }

    /// Entry values that are currently available, in declaration order.
    pub fn available_enum_values(&self, id: NodeId) -> Result<Vec<i64>> {
        self.read_op(id, "GetEntries", |inner| inner.available_enum_values_impl(id))
    }

    // ========================================================================
    // String interface
    // ========================================================================

    pub fn get_str(&self, id: NodeId, verify: bool, ignore_cache: bool) -> Result<String> {
        self.read_op(id, "GetValue", |inner| inner.get_str_impl(id, verify, ignore_cache))
    }

    pub fn str_value(&self, id: NodeId) -> Result<String> {
        self.get_str(id, false, false)
    }

    pub fn set_str(&self, id: NodeId, value: &str, verify: bool) -> Result<()> {
        self.write_op(id, "SetValue", |inner| inner.set_str_impl(id, value, verify))
    }

    // ========================================================================
    // Raw register interface
    // ========================================================================

    pub fn get_register(&self, id: NodeId, ignore_cache: bool) -> Result<Vec<u8>> {
        self.read_op(id, "Get", |inner| inner.get_register_impl(id, ignore_cache))
    }

    pub fn set_register(&self, id: NodeId, bytes: &[u8]) -> Result<()> {
        self.write_op(id, "Set", |inner| inner.set_register_impl(id, bytes))
    }

    // ========================================================================
    // Command interface
    // ========================================================================

    pub fn execute(&self, id: NodeId, verify: bool) -> Result<()> {
        self.write_op(id, "Execute", |inner| inner.execute_impl(id, verify))
    }

    pub fn is_done(&self, id: NodeId) -> Result<bool> {
        self.read_op(id, "IsDone", |inner| inner.is_done_impl(id))
    }

    // ========================================================================
    // Generic value interface
    // ========================================================================

    pub fn to_text(&self, id: NodeId) -> Result<String> {
        self.read_op(id, "ToString", |inner| inner.to_string_impl(id))
    }

    pub fn from_text(&self, id: NodeId, s: &str, verify: bool) -> Result<()> {
        self.write_op(id, "FromString", |inner| inner.from_string_impl(id, s, verify))
    }

    /// Generic typed read for clients that do not care about the concrete
    /// interface.
    pub fn value(&self, id: NodeId) -> Result<Value> {
        self.read_op(id, "GetValue", |inner| inner.value_of(id))
    }

    // ========================================================================
    // Imposed restrictions
    // ========================================================================

    /// Restrict the access mode on top of the natural one.
    pub fn impose_access_mode(&self, id: NodeId, mode: AccessMode) -> Result<()> {
        self.inner.lock().impose_access_impl(id, mode)
    }

    pub fn impose_visibility(&self, id: NodeId, visibility: Visibility) -> Result<()> {
        self.inner.lock().impose_visibility_impl(id, visibility)
    }

    /// Clamp an integer node's range on top of its natural bounds.
    pub fn impose_int_range(&self, id: NodeId, min: Option<i64>, max: Option<i64>) -> Result<()> {
        self.inner.lock().impose_int_range_impl(id, min, max)
    }

    pub fn impose_float_range(&self, id: NodeId, min: Option<f64>, max: Option<f64>) -> Result<()> {
        self.inner.lock().impose_float_range_impl(id, min, max)
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Register a change callback on a node. The callback receives the id
    /// of the node it was registered on.
    pub fn register_callback(
        &self,
        id: NodeId,
        phase: CallbackPhase,
        func: impl Fn(NodeId) + Send + Sync + 'static,
    ) -> Result<CallbackId> {
        self.inner
            .lock()
            .register_callback_impl(id, phase, Arc::new(func))
    }

    /// Remove a callback by handle. Returns whether it was registered.
    pub fn deregister_callback(&self, id: NodeId, cb: CallbackId) -> Result<bool> {
        self.inner.lock().deregister_callback_impl(id, cb)
    }

    // ========================================================================
    // Invalidation and polling
    // ========================================================================

    /// Invalidate one node and its dependents, firing their callbacks.
    pub fn invalidate(&self, id: NodeId) -> Result<()> {
        let callbacks = {
            let mut inner = self.inner.lock();
            inner.node(id)?; // validate the id under the lock
            invalidate::invalidate_from(&mut inner.nodes, id);
            inner.collect_callbacks(id)
        };
        self.fire_two_phase(callbacks);
        Ok(())
    }

    /// Drop every cached value and access mode in the map. No callbacks
    /// fire.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        for node in inner.nodes.iter_mut() {
            node.invalidate_caches();
        }
    }

    /// Advance polling clocks by `elapsed_ms`; nodes whose interval
    /// elapsed are invalidated and their callbacks fired.
    pub fn poll(&self, elapsed_ms: u64) {
        let callbacks = self.inner.lock().poll_impl(elapsed_ms);
        if !callbacks.is_empty() {
            self.fire_two_phase(callbacks);
        }
    }
}

impl std::fmt::Debug for NodeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMap")
            .field("name", &self.name)
            .field("nodes", &self.inner.lock().nodes.len())
            .finish()
    }
}
