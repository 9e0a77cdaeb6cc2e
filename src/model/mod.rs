//! Vocabulary types shared by every node.
//!
//! Pure data — no locking, no graph references, no I/O.

mod access;
mod poly_ref;
mod value;

pub use access::{AccessMode, CachingMode, Namespace, Visibility};
pub use poly_ref::Ref;
pub use value::{DisplayNotation, IncMode, Representation, Value};
