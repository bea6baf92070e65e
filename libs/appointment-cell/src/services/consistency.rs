// libs/appointment-cell/src/services/consistency.rs
//
// Per-doctor scheduling locks. A booking operation holds the locks of every
// doctor whose schedule it reads or writes from the conflict check until the
// commit returns, so two operations on one doctor's schedule never interleave.
//

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Idle lock entries are dropped once the table grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct SchedulingLockManager {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    contention_events: AtomicU64,
}

/// Held scheduling locks. Dropping the guard releases them.
#[derive(Debug)]
pub struct SchedulingGuard {
    doctor_ids: Vec<Uuid>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl SchedulingGuard {
    pub fn doctor_ids(&self) -> &[Uuid] {
        &self.doctor_ids
    }
}

impl SchedulingLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the schedules of `doctor_ids`. Locks are taken in ascending id
    /// order so multi-doctor operations cannot deadlock each other.
    pub async fn acquire(&self, doctor_ids: &[Uuid]) -> SchedulingGuard {
        let mut ordered = doctor_ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for doctor_id in &ordered {
            let lock = self.lock_for(*doctor_id);
            let guard = match Arc::clone(&lock).try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    self.contention_events.fetch_add(1, Ordering::Relaxed);
                    debug!("Waiting for scheduling lock of doctor {}", doctor_id);
                    lock.lock_owned().await
                }
            };
            guards.push(guard);
        }

        SchedulingGuard {
            doctor_ids: ordered,
            _guards: guards,
        }
    }

    pub fn contention_events(&self) -> u64 {
        self.contention_events.load(Ordering::Relaxed)
    }

    fn lock_for(&self, doctor_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if locks.len() > PRUNE_THRESHOLD {
            // Only the table holds an idle entry; handles are cloned under this mutex.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        Arc::clone(locks.entry(doctor_id).or_default())
    }
}
