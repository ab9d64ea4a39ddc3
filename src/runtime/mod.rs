//! External command execution for Slipway
//!
//! Git, npm, tar and the compose CLI are all driven through the
//! [`CommandRunner`] trait so tests can substitute scripted output.

#[cfg(test)]
pub mod scripted;
pub mod system;
pub mod types;

#[cfg(test)]
pub use scripted::ScriptedRunner;
pub use system::SystemRunner;
pub use types::{CommandOutput, CommandRunner, CommandSpec, DEFAULT_COMMAND_TIMEOUT_SECS};
