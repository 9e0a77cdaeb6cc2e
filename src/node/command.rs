//! Command node body.

use super::sources::IntSource;

/// Typed payload of a command feature.
///
/// `execute` writes `command_value` to the backing. When the backing is
/// readable, completion is detected by the device clearing the value
/// (self-resetting commands); otherwise a command is reported done
/// immediately.
#[derive(Debug)]
pub struct CommandNode {
    pub source: IntSource,
    pub command_value: i64,
}

impl CommandNode {
    pub fn new(source: IntSource) -> Self {
        Self { source, command_value: 1 }
    }
}
