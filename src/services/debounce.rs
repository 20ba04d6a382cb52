//! Debounced ownership-code verification, one slot per upload attempt.
//!
//! Each submission bumps the slot's generation, aborts the previous pending
//! task and schedules a new one after the quiet period. A task only publishes
//! its result if the generation it was started with is still current, so
//! results for superseded input are dropped.

use crate::{
    models::{fingerprint::FingerprintVerdict, ownership::OwnershipCodeStatus},
    services::ownership_verifier::CodeVerification,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

struct PendingCheck {
    code: String,
    verdict: FingerprintVerdict,
    handle: JoinHandle<()>,
}

struct Slot {
    generation: u64,
    pending: Option<PendingCheck>,
    status: watch::Sender<OwnershipCodeStatus>,
}

impl Slot {
    fn new() -> Self {
        let (status, _) = watch::channel(OwnershipCodeStatus::Unset);
        Self {
            generation: 0,
            pending: None,
            status,
        }
    }
}

type Slots = Arc<Mutex<HashMap<Uuid, Slot>>>;

#[derive(Clone)]
pub struct CodeDebouncer {
    verifier: Arc<dyn CodeVerification>,
    quiet_period: Duration,
    slots: Slots,
}

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn publish(slots: &Slots, attempt_id: Uuid, generation: u64, status: OwnershipCodeStatus) {
    let mut slots = lock(slots);
    match slots.get_mut(&attempt_id) {
        Some(slot) if slot.generation == generation => {
            slot.pending = None;
            slot.status.send_replace(status);
        }
        _ => debug!(%attempt_id, generation, "dropping stale code check result"),
    }
}

impl CodeDebouncer {
    pub fn new(verifier: Arc<dyn CodeVerification>, quiet_period: Duration) -> Self {
        Self {
            verifier,
            quiet_period,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record new input for an attempt. Blank input resets the slot to `Unset`.
    pub fn submit(&self, attempt_id: Uuid, code: &str, verdict: FingerprintVerdict) {
        let mut slots = lock(&self.slots);
        let slot = slots.entry(attempt_id).or_insert_with(Slot::new);

        slot.generation += 1;
        if let Some(previous) = slot.pending.take() {
            previous.handle.abort();
        }

        let code = code.trim().to_string();
        if code.is_empty() {
            slot.status.send_replace(OwnershipCodeStatus::Unset);
            return;
        }
        slot.status.send_replace(OwnershipCodeStatus::Pending);

        let generation = slot.generation;
        let verifier = self.verifier.clone();
        let shared = self.slots.clone();
        let quiet_period = self.quiet_period;
        let task_code = code.clone();
        let task_verdict = verdict.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let check = verifier.verify(&task_code, &task_verdict).await;
            publish(&shared, attempt_id, generation, check.into());
        });

        slot.pending = Some(PendingCheck {
            code,
            verdict,
            handle,
        });
    }

    /// Run any pending check right away and return the settled status.
    pub async fn flush(&self, attempt_id: Uuid) -> OwnershipCodeStatus {
        let taken = {
            let mut slots = lock(&self.slots);
            match slots.get_mut(&attempt_id) {
                Some(slot) => slot.pending.take().map(|pending| {
                    pending.handle.abort();
                    (slot.generation, pending.code, pending.verdict)
                }),
                None => return OwnershipCodeStatus::Unset,
            }
        };

        if let Some((generation, code, verdict)) = taken {
            let check = self.verifier.verify(&code, &verdict).await;
            publish(&self.slots, attempt_id, generation, check.into());
        }
        self.status(attempt_id)
    }

    pub fn status(&self, attempt_id: Uuid) -> OwnershipCodeStatus {
        lock(&self.slots)
            .get(&attempt_id)
            .map(|slot| slot.status.borrow().clone())
            .unwrap_or_default()
    }

    /// Drop an attempt's slot, cancelling anything still pending.
    pub fn forget(&self, attempt_id: Uuid) {
        if let Some(slot) = lock(&self.slots).remove(&attempt_id) {
            if let Some(pending) = slot.pending {
                pending.handle.abort();
            }
        }
    }
}
