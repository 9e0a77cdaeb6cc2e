//! Raw register node body.

use super::sources::RegisterRef;

/// Typed payload of a raw register feature: byte-exact access to one
/// span, with value-cache integration.
#[derive(Debug)]
pub struct RegisterNode {
    pub reg: RegisterRef,
}

impl RegisterNode {
    pub fn new(reg: RegisterRef) -> Self {
        Self { reg }
    }
}
