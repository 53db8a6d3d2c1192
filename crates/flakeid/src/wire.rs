//! JSON messages exchanged between generator processes and the orchestrator.
//!
//! | method | path | request | success |
//! |---|---|---|---|
//! | `POST` | `/v1/leases` | [`RegisterRequest`] | `201` [`LeaseResponse`] |
//! | `PUT` | `/v1/leases/{machine_id}` | [`RenewRequest`] | `200` [`LeaseResponse`] |
//! | `DELETE` | `/v1/leases/{machine_id}` | [`RenewRequest`] | `204` |
//! | `GET` | `/v1/leases` | - | `200` `Vec<`[`LeaseView`]`>` |
//!
//! Failures carry an [`ErrorResponse`]. `409 Conflict` on renew or release
//! means the caller no longer holds the lease; `503` on register means the id
//! space is exhausted.

use crate::{InstanceName, Lease};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Path of the lease collection.
pub const LEASES_PATH: &str = "/v1/leases";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub instance: InstanceName,
    pub max_machine_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewRequest {
    pub instance: InstanceName,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub machine_id: i64,
    pub ttl_ms: u64,
}

impl From<LeaseResponse> for Lease {
    fn from(resp: LeaseResponse) -> Self {
        Self {
            machine_id: resp.machine_id,
            ttl: Duration::from_millis(resp.ttl_ms),
        }
    }
}

/// One live lease as listed by `GET /v1/leases`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseView {
    pub machine_id: i64,
    pub instance: InstanceName,
    pub expires_in_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
