use crate::{
    ConfigError, Enrollment, IdentityOrigin, IdentitySource, InstanceName, LayoutParams, Lease,
    MachineId, Orchestrator, OrchestratorError, Registration, resolve_machine_id,
    static_machine_id,
};
use core::{future::Future, time::Duration};
use std::sync::Mutex;

const NOW: i64 = 1_760_000_000_000;

struct FakeOrchestrator {
    answer: Result<Lease, OrchestratorError>,
    seen: Mutex<Vec<Registration>>,
    released: Mutex<Vec<i64>>,
}

impl FakeOrchestrator {
    fn granting(machine_id: i64) -> Self {
        Self {
            answer: Ok(Lease {
                machine_id,
                ttl: Duration::from_secs(30),
            }),
            seen: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    fn failing(err: OrchestratorError) -> Self {
        Self {
            answer: Err(err),
            seen: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }
}

impl Orchestrator for FakeOrchestrator {
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send {
        self.seen.lock().unwrap().push(registration.clone());
        let answer = self.answer.clone();
        async move { answer }
    }

    fn renew(
        &self,
        _: &Registration,
        _: MachineId,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send {
        let answer = self.answer.clone();
        async move { answer }
    }

    fn release(
        &self,
        _: &Registration,
        machine_id: MachineId,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send {
        self.released.lock().unwrap().push(machine_id.get());
        async { Ok(()) }
    }
}

fn instance() -> InstanceName {
    InstanceName::new("host", 100, 1)
}

#[tokio::test]
async fn static_id_without_orchestrator() {
    let config = LayoutParams::default().validate(NOW).unwrap();
    let resolved = resolve_machine_id(&config, IdentitySource::static_only(Some(5)))
        .await
        .unwrap();
    assert_eq!(resolved.machine_id.get(), 5);
    assert_eq!(resolved.origin, IdentityOrigin::Static);
}

#[tokio::test]
async fn nothing_configured_is_ambiguous() {
    let config = LayoutParams::default().validate(NOW).unwrap();
    let err = resolve_machine_id(&config, IdentitySource::static_only(static_machine_id(-1)))
        .await
        .unwrap_err();
    assert_eq!(err, ConfigError::AmbiguousIdentity);
}

#[tokio::test]
async fn static_id_out_of_range() {
    let config = LayoutParams::default().validate(NOW).unwrap();
    for raw in [1024, -2] {
        let err = resolve_machine_id(&config, IdentitySource::static_only(static_machine_id(raw)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MachineIdOutOfRange {
                machine_id: raw,
                max_machine_id: 1023
            }
        );
    }
}

#[tokio::test]
async fn orchestrator_takes_precedence_over_static_id() {
    let config = LayoutParams::default().validate(NOW).unwrap();
    let orchestrator = FakeOrchestrator::granting(42);
    let source = IdentitySource {
        enrollment: Some(Enrollment {
            orchestrator: &orchestrator,
            instance: instance(),
        }),
        static_machine_id: Some(5),
    };

    let resolved = resolve_machine_id(&config, source).await.unwrap();
    assert_eq!(resolved.machine_id.get(), 42);
    let IdentityOrigin::Leased {
        registration,
        lease,
    } = resolved.origin
    else {
        panic!("expected a leased identity");
    };
    assert_eq!(registration.instance, instance());
    assert_eq!(registration.max_machine_id, 1023);
    assert_eq!(lease.ttl, Duration::from_secs(30));

    let seen = orchestrator.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].max_machine_id, 1023);
    assert!(orchestrator.released.lock().unwrap().is_empty());
}

#[tokio::test]
async fn orchestrator_failure_does_not_fall_back() {
    let config = LayoutParams::default().validate(NOW).unwrap();
    let orchestrator = FakeOrchestrator::failing(OrchestratorError::Unavailable {
        reason: "connection refused".into(),
    });
    let source = IdentitySource {
        enrollment: Some(Enrollment {
            orchestrator: &orchestrator,
            instance: instance(),
        }),
        static_machine_id: Some(5),
    };

    let err = resolve_machine_id(&config, source).await.unwrap_err();
    assert_eq!(
        err,
        ConfigError::OrchestratorUnavailable {
            reason: "connection refused".into()
        }
    );
}

#[tokio::test]
async fn orchestrator_rejection_is_reported() {
    let config = LayoutParams::default().validate(NOW).unwrap();
    let orchestrator = FakeOrchestrator::failing(OrchestratorError::Rejected {
        status: 503,
        reason: "no machine ids left".into(),
    });
    let source = IdentitySource {
        enrollment: Some(Enrollment {
            orchestrator: &orchestrator,
            instance: instance(),
        }),
        static_machine_id: None,
    };

    let err = resolve_machine_id(&config, source).await.unwrap_err();
    assert_eq!(
        err,
        ConfigError::OrchestratorRejected {
            reason: "503: no machine ids left".into()
        }
    );
}

#[tokio::test]
async fn out_of_range_lease_is_released_and_rejected() {
    let config = LayoutParams {
        machine_id_bits: 4,
        ..LayoutParams::default()
    }
    .validate(NOW)
    .unwrap();
    let orchestrator = FakeOrchestrator::granting(16);
    let source = IdentitySource {
        enrollment: Some(Enrollment {
            orchestrator: &orchestrator,
            instance: instance(),
        }),
        static_machine_id: None,
    };

    let err = resolve_machine_id(&config, source).await.unwrap_err();
    assert_eq!(
        err,
        ConfigError::MachineIdOutOfRange {
            machine_id: 16,
            max_machine_id: 15
        }
    );
    assert_eq!(*orchestrator.released.lock().unwrap(), vec![16]);
}
