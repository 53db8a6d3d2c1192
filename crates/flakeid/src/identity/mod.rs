//! Machine identity: deciding, once per process, which machine id this
//! generator embeds.
//!
//! - [`MachineId`] - an id checked against a [`GeneratorConfig`].
//! - [`InstanceName`] - the self-chosen name a process registers under.
//! - [`Orchestrator`] - the boundary to the fleet's id allocator.
//! - [`resolve_machine_id`] - the startup precedence: orchestrator, then
//!   static id, else fail.
//!
//! [`GeneratorConfig`]: crate::GeneratorConfig

mod instance;
mod machine;
mod orchestrator;
mod resolve;
#[cfg(test)]
mod tests;

pub use instance::*;
pub use machine::*;
pub use orchestrator::*;
pub use resolve::*;
