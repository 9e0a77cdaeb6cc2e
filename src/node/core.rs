//! Shared per-node state: identity, access-mode resolution cache,
//! caching mode, polling, callbacks.

use std::sync::Arc;

use crate::graph::NodeId;
use crate::model::{AccessMode, CachingMode, Namespace, Ref, Value, Visibility};

// ============================================================================
// Callbacks
// ============================================================================

/// Which side of the node-map lock a callback runs on.
///
/// All `InsideLock` callbacks for one logical write complete before any
/// `OutsideLock` callback begins. Inside-lock callbacks run under the map
/// lock and must not re-enter the node map; outside-lock callbacks run
/// after the guard drops and may.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    InsideLock,
    OutsideLock,
}

/// Handle for deregistering a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

pub(crate) type CallbackFn = Arc<dyn Fn(NodeId) + Send + Sync>;

pub(crate) struct CallbackEntry {
    pub id: CallbackId,
    pub phase: CallbackPhase,
    pub func: CallbackFn,
}

impl std::fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .finish()
    }
}

// ============================================================================
// Access-mode cache
// ============================================================================

/// Access-mode cache state.
///
/// `InProgress` is the cycle sentinel: a node whose access-mode
/// computation re-enters itself (self-referential availability formulas)
/// observes `InProgress` and resolves to `RW`. This matches the original
/// engine's behavior — a compatibility approximation, not a verified
/// invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessCacheState {
    Invalid,
    InProgress,
    Cached(AccessMode),
}

// ============================================================================
// NodeCore
// ============================================================================

/// State shared by every node type.
#[derive(Debug)]
pub struct NodeCore {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub tool_tip: Option<String>,
    pub namespace: Namespace,
    pub visibility: Visibility,
    /// Client-applied restriction layered on the schema visibility.
    pub imposed_visibility: Visibility,
    /// Client-applied restriction layered on the natural access mode.
    /// `RW` is neutral under combination.
    pub imposed_access: AccessMode,
    pub caching_mode: CachingMode,
    /// Polling interval in milliseconds; `None` disables polling.
    pub polling_interval: Option<u64>,
    pub(crate) poll_elapsed: u64,
    /// Whether the resolved access mode may be cached between
    /// invalidations.
    pub access_cacheable: bool,

    pub(crate) is_implemented: Option<Ref<bool>>,
    pub(crate) is_available: Option<Ref<bool>>,
    pub(crate) is_locked: Option<Ref<bool>>,

    pub(crate) access_cache: AccessCacheState,
    pub(crate) cached_value: Option<Value>,
    pub(crate) callback_pending: bool,
    pub(crate) callbacks: Vec<CallbackEntry>,
}

impl NodeCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            tool_tip: None,
            namespace: Namespace::Custom,
            visibility: Visibility::Beginner,
            imposed_visibility: Visibility::Beginner,
            imposed_access: AccessMode::RW,
            caching_mode: CachingMode::WriteThrough,
            polling_interval: None,
            poll_elapsed: 0,
            access_cacheable: true,
            is_implemented: None,
            is_available: None,
            is_locked: None,
            access_cache: AccessCacheState::Invalid,
            cached_value: None,
            callback_pending: false,
            callbacks: Vec::new(),
        }
    }

    /// Effective visibility: schema visibility combined with the imposed
    /// one, most restrictive wins.
    pub fn effective_visibility(&self) -> Visibility {
        self.visibility.combine(self.imposed_visibility)
    }

    /// Drop the cached value and resolved access mode. Does not touch the
    /// callback-pending flag.
    pub(crate) fn invalidate_caches(&mut self) {
        self.cached_value = None;
        self.access_cache = AccessCacheState::Invalid;
    }

    pub(crate) fn cached_value(&self) -> Option<&Value> {
        self.cached_value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let core = NodeCore::new("Gain");
        assert_eq!(core.name, "Gain");
        assert_eq!(core.visibility, Visibility::Beginner);
        assert_eq!(core.imposed_access, AccessMode::RW);
        assert_eq!(core.caching_mode, CachingMode::WriteThrough);
        assert!(core.access_cacheable);
        assert_eq!(core.access_cache, AccessCacheState::Invalid);
    }

    #[test]
    fn test_effective_visibility() {
        let mut core = NodeCore::new("Gain");
        core.visibility = Visibility::Expert;
        core.imposed_visibility = Visibility::Guru;
        assert_eq!(core.effective_visibility(), Visibility::Guru);
    }

    #[test]
    fn test_invalidate_caches() {
        let mut core = NodeCore::new("Gain");
        core.cached_value = Some(Value::Int(5));
        core.access_cache = AccessCacheState::Cached(AccessMode::RW);
        core.invalidate_caches();
        assert!(core.cached_value.is_none());
        assert_eq!(core.access_cache, AccessCacheState::Invalid);
    }
}
