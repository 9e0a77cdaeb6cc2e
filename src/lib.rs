//! # genapi-rs — Clean Rust GenApi Node-Map Engine
//!
//! A reimplementation of the GenICam/GenApi feature graph in Rust.
//!
//! A node map exposes a machine-vision device's registers as named,
//! strongly-typed *features* — integers, floats, booleans, enumerations,
//! strings, raw registers, commands, categories. Clients read and write
//! features through a uniform accessor surface while the engine resolves
//! inter-feature dependencies, caches values, enforces access-mode and
//! visibility rules, and evaluates computed features through an embedded
//! formula engine.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `Port` is the contract between the engine and any
//!    register transport
//! 2. **Arena-owned graph**: the `NodeMap` owns every node; everything else
//!    holds a `NodeId` index — no pointer graphs, no lifetime puzzles
//! 3. **Parser owns nothing**: formula text → `Program` is a pure function
//! 4. **Explicit two-phase callbacks**: a write collects its pending
//!    callbacks; the in-lock phase completes before the out-of-lock phase
//!    begins
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use genapi_rs::{NodeMapBuilder, IntegerDef, IntSource, MemoryPort, Endianness};
//!
//! # fn example() -> genapi_rs::Result<()> {
//! let port = Arc::new(MemoryPort::new(0x1000));
//!
//! let mut builder = NodeMapBuilder::new("Device");
//! let gain = builder.add_integer(
//!     IntegerDef::new("Gain", IntSource::register(&port, 0x100, 4, Endianness::Little))
//!         .with_range(0, 1023),
//! )?;
//! let map = builder.finalize()?;
//!
//! map.set_int(gain, 42, true)?;
//! assert_eq!(map.int_value(gain)?, 42);
//! # Ok(())
//! # }
//! ```
//!
//! ## Node Types
//!
//! | Type | Accessors | Backing |
//! |------|-----------|---------|
//! | Integer | `get_int` / `set_int`, min/max/inc | literal, register, formula, converter, node ref |
//! | Float | `get_float` / `set_float`, min/max | literal, register, formula, converter, node ref |
//! | Boolean | `get_bool` / `set_bool` | any integer backing |
//! | Enumeration | symbolic get/set, entry listing | any integer backing |
//! | String | `get_str` / `set_str` | literal or fixed-length register |
//! | Register | raw byte get/set | port + value cache |
//! | Command | `execute` / `is_done` | any integer backing |
//! | Category | feature children listing | — |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod formula;
pub mod port;
pub mod cache;
pub mod graph;
pub mod node;
pub mod map;
pub mod builder;
pub mod selector;
pub mod export;

// ============================================================================
// Re-exports: Model (the vocabulary types)
// ============================================================================

pub use model::{
    AccessMode, CachingMode, DisplayNotation, IncMode, Namespace, Ref,
    Representation, Value, Visibility,
};

// ============================================================================
// Re-exports: Graph + Map
// ============================================================================

pub use graph::NodeId;
pub use map::{CallbackId, CallbackPhase, NodeMap};
pub use node::InterfaceType;

// ============================================================================
// Re-exports: Construction
// ============================================================================

pub use builder::{
    BooleanDef, CategoryDef, CommandDef, EnumEntryDef, EnumerationDef,
    FloatDef, IntegerDef, NodeMapBuilder, NodeOpts, RegisterDef, StringDef,
};
pub use node::{FloatSource, IntSource, RegisterRef, StrSource};

// ============================================================================
// Re-exports: Collaborator boundary
// ============================================================================

pub use cache::ValueCache;
pub use export::{dump_features, export_json, FeatureRecord};
pub use port::{Endianness, MemoryPort, Port};
pub use selector::{SelectorDigit, SelectorSet};

// ============================================================================
// Error Types
// ============================================================================

/// Engine error taxonomy.
///
/// Node-related errors carry the node name and the method that entered the
/// current call chain, so a failure deep inside a formula or a dependency
/// chain still reports which top-level client call triggered it. The node
/// map attaches that context at the public accessor boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Access error: {0}")]
    Access(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Property error: {0}")]
    Property(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Logical error: {0}")]
    Logical(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Interface cast failed: {0}")]
    InterfaceCast(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Append node + entry-point context to the message, preserving the
    /// variant. Called once, where an error crosses the node map's public
    /// accessor boundary.
    pub(crate) fn with_node_context(self, node: &str, entry: &str) -> Self {
        let tag = format!(" (node '{node}', via {entry})");
        match self {
            Error::Access(m) => Error::Access(m + &tag),
            Error::OutOfRange(m) => Error::OutOfRange(m + &tag),
            Error::InvalidArgument(m) => Error::InvalidArgument(m + &tag),
            Error::Property(m) => Error::Property(m + &tag),
            Error::Runtime(m) => Error::Runtime(m + &tag),
            Error::Logical(m) => Error::Logical(m + &tag),
            Error::Timeout(m) => Error::Timeout(m + &tag),
            Error::InterfaceCast(m) => Error::InterfaceCast(m + &tag),
            Error::NotFound(m) => Error::NotFound(m + &tag),
            Error::Io(e) => Error::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
