use crate::{
    ConfigError, GeneratorConfig, InstanceName, Lease, MachineId, NoOrchestrator, Orchestrator,
    Registration, Result,
};

/// Conventional "unset" value for a static machine id.
pub const STATIC_MACHINE_ID_UNSET: i64 = -1;

/// Maps the configured static machine id to `None` when it holds the unset
/// sentinel. Any other value, negative or not, is kept and range checked
/// later.
pub const fn static_machine_id(raw: i64) -> Option<i64> {
    if raw == STATIC_MACHINE_ID_UNSET {
        None
    } else {
        Some(raw)
    }
}

/// An orchestrator together with the name this instance registers under.
#[derive(Debug)]
pub struct Enrollment<'a, O> {
    pub orchestrator: &'a O,
    pub instance: InstanceName,
}

/// Everything identity resolution may draw on.
#[derive(Debug)]
pub struct IdentitySource<'a, O = NoOrchestrator> {
    pub enrollment: Option<Enrollment<'a, O>>,
    pub static_machine_id: Option<i64>,
}

impl IdentitySource<'_, NoOrchestrator> {
    /// A source that can only supply a static id.
    pub const fn static_only(static_machine_id: Option<i64>) -> Self {
        Self {
            enrollment: None,
            static_machine_id,
        }
    }
}

/// Where a resolved machine id came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// Taken verbatim from configuration; the operator vouches for it.
    Static,
    /// Leased from the orchestrator and to be kept alive by renewals.
    Leased {
        registration: Registration,
        lease: Lease,
    },
}

/// The outcome of [`resolve_machine_id`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub machine_id: MachineId,
    pub origin: IdentityOrigin,
}

/// Decides this process's machine id. Runs once, before any id is issued.
///
/// Precedence:
///
/// 1. An orchestrator, if configured. Its answer is final: on failure this
///    returns an error and never falls back to the static id.
/// 2. A static machine id, used verbatim.
/// 3. Otherwise [`ConfigError::AmbiguousIdentity`].
///
/// The chosen id is checked against `config` in every case.
///
/// # Errors
///
/// - [`ConfigError::OrchestratorUnavailable`] /
///   [`ConfigError::OrchestratorRejected`] from the orchestrator path
/// - [`ConfigError::MachineIdOutOfRange`] if the id does not fit the layout;
///   a leased id is released first
/// - [`ConfigError::AmbiguousIdentity`] if nothing is configured
pub async fn resolve_machine_id<O>(
    config: &GeneratorConfig,
    source: IdentitySource<'_, O>,
) -> Result<ResolvedIdentity>
where
    O: Orchestrator,
{
    if let Some(Enrollment {
        orchestrator,
        instance,
    }) = source.enrollment
    {
        if source.static_machine_id.is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!("both orchestrator and static machine id configured, ignoring the static id");
        }

        let registration = Registration {
            instance,
            max_machine_id: config.max_machine_id(),
        };
        #[cfg(feature = "tracing")]
        tracing::info!(instance = %registration.instance, "registering with orchestrator");

        let lease = orchestrator.register(&registration).await?;
        let machine_id = match MachineId::new(lease.machine_id, config) {
            Ok(machine_id) => machine_id,
            Err(err) => {
                // Give the unusable id back before failing.
                let _released = orchestrator
                    .release(&registration, MachineId::for_release(lease.machine_id))
                    .await;
                #[cfg(feature = "tracing")]
                {
                    if let Err(release_err) = &_released {
                        tracing::warn!(
                            machine_id = lease.machine_id,
                            "failed to release out-of-range lease: {release_err}"
                        );
                    }
                }
                return Err(err);
            }
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            machine_id = machine_id.get(),
            ttl_ms = lease.ttl.as_millis() as u64,
            "machine id leased from orchestrator"
        );

        return Ok(ResolvedIdentity {
            machine_id,
            origin: IdentityOrigin::Leased {
                registration,
                lease,
            },
        });
    }

    match source.static_machine_id {
        Some(raw) => {
            let machine_id = MachineId::new(raw, config)?;
            #[cfg(feature = "tracing")]
            tracing::info!(machine_id = machine_id.get(), "using static machine id");
            Ok(ResolvedIdentity {
                machine_id,
                origin: IdentityOrigin::Static,
            })
        }
        None => Err(ConfigError::AmbiguousIdentity),
    }
}
