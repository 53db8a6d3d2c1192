//! In-memory lease table.
//!
//! Each machine id is in one of three states:
//!
//! - **leased**: held by an instance until `expires_at`, extended by renewals
//! - **quarantined**: the lease lapsed less than `grace` ago; the id is not
//!   handed out yet, because the former holder only stops generating once it
//!   has gone a full ttl without a successful renewal
//! - **free**: absent from the table
//!
//! Time is passed in by the caller so the table stays deterministic under
//! test.

use flakeid::InstanceName;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Longest accepted instance name.
const MAX_INSTANCE_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// Every id up to the requested maximum is leased or quarantined.
    #[error("no machine id available in [0, {max_machine_id}]")]
    Exhausted { max_machine_id: i64 },

    /// The caller does not hold a live lease on this id.
    #[error("lease on machine id {machine_id} is not held by this instance")]
    LeaseLost { machine_id: i64 },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

/// An id handed to an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant {
    pub machine_id: i64,
    pub ttl: Duration,
}

/// A live lease, as reported by [`LeaseTable::live`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveLease {
    pub machine_id: i64,
    pub instance: InstanceName,
    pub expires_in: Duration,
}

#[derive(Clone, Debug)]
struct Entry {
    instance: InstanceName,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct LeaseTable {
    pool_max: i64,
    ttl: Duration,
    grace: Duration,
    by_id: BTreeMap<i64, Entry>,
    by_instance: HashMap<InstanceName, i64>,
}

impl LeaseTable {
    /// Creates an empty table handing out ids in `[0, pool_max]`.
    pub fn new(pool_max: i64, ttl: Duration, grace: Duration) -> Self {
        Self {
            pool_max,
            ttl,
            grace,
            by_id: BTreeMap::new(),
            by_instance: HashMap::new(),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub const fn pool_max(&self) -> i64 {
        self.pool_max
    }

    /// Grants `instance` a machine id no greater than `max_machine_id`.
    ///
    /// An instance that already holds a live, in-range lease gets the same id
    /// back with a fresh expiry, so a retried registration is harmless.
    /// Otherwise the lowest free id is granted.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidRequest`] for an empty or oversized name, or a
    ///   negative `max_machine_id`
    /// - [`AllocError::Exhausted`] if no id is free
    pub fn register(
        &mut self,
        instance: &InstanceName,
        max_machine_id: i64,
        now: Instant,
    ) -> Result<Grant, AllocError> {
        validate_instance(instance)?;
        if max_machine_id < 0 {
            return Err(AllocError::InvalidRequest {
                reason: format!("max_machine_id must be >= 0 (got {max_machine_id})"),
            });
        }

        if let Some(&machine_id) = self.by_instance.get(instance) {
            if machine_id <= max_machine_id {
                if let Ok(grant) = self.renew(instance, machine_id, now) {
                    return Ok(grant);
                }
            }
        }

        self.reap(now);

        let limit = max_machine_id.min(self.pool_max);
        let machine_id = self
            .lowest_free(limit)
            .ok_or(AllocError::Exhausted {
                max_machine_id: limit,
            })?;

        if let Some(previous) = self.by_instance.insert(instance.clone(), machine_id) {
            // The instance's earlier lease lapsed or did not fit; it stays
            // quarantined under its old id but no longer maps back here.
            if let Some(entry) = self.by_id.get(&previous) {
                if entry.instance == *instance && entry.expires_at > now {
                    self.by_id.remove(&previous);
                }
            }
        }
        self.by_id.insert(
            machine_id,
            Entry {
                instance: instance.clone(),
                expires_at: now + self.ttl,
            },
        );

        Ok(Grant {
            machine_id,
            ttl: self.ttl,
        })
    }

    /// Extends `instance`'s lease on `machine_id`.
    ///
    /// # Errors
    ///
    /// [`AllocError::LeaseLost`] if the id is free, held by someone else, or
    /// the caller's lease already expired.
    pub fn renew(
        &mut self,
        instance: &InstanceName,
        machine_id: i64,
        now: Instant,
    ) -> Result<Grant, AllocError> {
        match self.by_id.get_mut(&machine_id) {
            Some(entry) if entry.instance == *instance && entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Ok(Grant {
                    machine_id,
                    ttl: self.ttl,
                })
            }
            _ => Err(AllocError::LeaseLost { machine_id }),
        }
    }

    /// Returns `machine_id` to the pool immediately.
    ///
    /// # Errors
    ///
    /// [`AllocError::LeaseLost`] if `instance` is not the recorded holder.
    pub fn release(&mut self, instance: &InstanceName, machine_id: i64) -> Result<(), AllocError> {
        match self.by_id.get(&machine_id) {
            Some(entry) if entry.instance == *instance => {
                self.by_id.remove(&machine_id);
                if self.by_instance.get(instance) == Some(&machine_id) {
                    self.by_instance.remove(instance);
                }
                Ok(())
            }
            _ => Err(AllocError::LeaseLost { machine_id }),
        }
    }

    /// Drops every entry whose quarantine has ended and returns the freed ids.
    pub fn reap(&mut self, now: Instant) -> Vec<i64> {
        let grace = self.grace;
        let freed: Vec<i64> = self
            .by_id
            .iter()
            .filter(|(_, entry)| entry.expires_at + grace <= now)
            .map(|(id, _)| *id)
            .collect();

        for machine_id in &freed {
            if let Some(entry) = self.by_id.remove(machine_id) {
                if self.by_instance.get(&entry.instance) == Some(machine_id) {
                    self.by_instance.remove(&entry.instance);
                }
            }
        }
        freed
    }

    /// Leases that have not yet expired, in machine id order.
    pub fn live(&self, now: Instant) -> Vec<LiveLease> {
        self.by_id
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(machine_id, entry)| LiveLease {
                machine_id: *machine_id,
                instance: entry.instance.clone(),
                expires_in: entry.expires_at - now,
            })
            .collect()
    }

    /// Lowest id in `[0, limit]` with no entry.
    fn lowest_free(&self, limit: i64) -> Option<i64> {
        let mut candidate = 0;
        for &taken in self.by_id.keys() {
            if taken > candidate || candidate > limit {
                break;
            }
            candidate = taken + 1;
        }
        (candidate <= limit).then_some(candidate)
    }
}

fn validate_instance(instance: &InstanceName) -> Result<(), AllocError> {
    let len = instance.as_str().len();
    if len == 0 || len > MAX_INSTANCE_LEN {
        return Err(AllocError::InvalidRequest {
            reason: format!("instance name must be 1..={MAX_INSTANCE_LEN} bytes (got {len})"),
        });
    }
    Ok(())
}
