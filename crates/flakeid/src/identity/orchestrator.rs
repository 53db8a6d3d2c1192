use crate::{InstanceName, MachineId, OrchestratorError};
use core::{future::Future, time::Duration};

/// What an instance presents to the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub instance: InstanceName,
    /// Largest id the instance's layout can encode. The orchestrator must not
    /// hand out anything above it.
    pub max_machine_id: i64,
}

/// A time-bounded grant of a machine id.
///
/// The holder must renew within `ttl` or stop generating: once the lease
/// lapses the orchestrator may give the id to another instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lease {
    /// As returned by the orchestrator; range checked by the resolver.
    pub machine_id: i64,
    pub ttl: Duration,
}

/// The fleet-wide machine id allocator, seen from one instance.
///
/// Implementations must either return an assigned id or fail; there is no
/// partial success. Timeouts and retries belong to the implementation.
pub trait Orchestrator {
    /// Asks for a machine id for `registration.instance`.
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send;

    /// Extends the lease on `machine_id`.
    ///
    /// Must fail with [`OrchestratorError::LeaseLost`] if the instance no
    /// longer holds it.
    fn renew(
        &self,
        registration: &Registration,
        machine_id: MachineId,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send;

    /// Gives `machine_id` back ahead of expiry.
    fn release(
        &self,
        registration: &Registration,
        machine_id: MachineId,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send;
}

/// Placeholder orchestrator type for processes that only use a static id.
#[derive(Clone, Copy, Debug)]
pub enum NoOrchestrator {}

impl Orchestrator for NoOrchestrator {
    fn register(
        &self,
        _: &Registration,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send {
        let never = *self;
        async move { match never {} }
    }

    fn renew(
        &self,
        _: &Registration,
        _: MachineId,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send {
        let never = *self;
        async move { match never {} }
    }

    fn release(
        &self,
        _: &Registration,
        _: MachineId,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send {
        let never = *self;
        async move { match never {} }
    }
}
