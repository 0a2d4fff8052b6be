//! Debounced, race-safe uniqueness check for the identifier field.
//!
//! `check` never blocks: it arms a quiescence timer and returns. Of a burst
//! of calls inside one window only the last candidate is probed. Each call
//! bumps an epoch; a probe carries the epoch it was issued under and its
//! response is dropped if the epoch has moved on, so a stale answer can never
//! overwrite the state of a newer candidate. In-flight probes are left to
//! finish; only the timer is cancelled.

use crate::config::{ClientConfig, ProbeFailurePolicy};
use crate::core::{PersonaId, StoreError};
use crate::storage::RemoteStore;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Uniqueness state of one identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationState {
    /// Nothing to check yet.
    #[default]
    Idle,
    /// Awaiting the quiescence window or a probe response.
    Pending,
    Available,
    Duplicate,
    /// The probe failed; treated as permissive.
    CheckFailed,
}

impl ValidationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ValidationState::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ValidationState::Available | ValidationState::Duplicate | ValidationState::CheckFailed
        )
    }

    /// Whether this state lets the form proceed.
    pub fn is_permissive(&self) -> bool {
        matches!(self, ValidationState::Available | ValidationState::CheckFailed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorStats {
    /// `check` calls received
    pub checks: u64,
    /// Probes sent to the store
    pub probes_issued: u64,
    /// Probe responses dropped because a newer check superseded them
    pub stale_discarded: u64,
    /// Probes that failed with something other than "not found"
    pub probe_failures: u64,
}

#[derive(Default)]
struct ProbeSlot {
    epoch: u64,
    candidate: Option<PersonaId>,
    timer: Option<JoinHandle<()>>,
    stats: ValidatorStats,
}

struct Shared {
    state: watch::Sender<ValidationState>,
    slot: Mutex<ProbeSlot>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, ProbeSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a probe for `epoch` if it is still current.
    fn begin_probe(&self, epoch: u64) -> bool {
        let mut slot = self.slot();
        if slot.epoch != epoch {
            return false;
        }
        slot.timer = None;
        slot.stats.probes_issued += 1;
        true
    }

    fn complete(&self, epoch: u64, candidate: &PersonaId, outcome: ValidationState) {
        let mut slot = self.slot();
        if slot.epoch != epoch {
            slot.stats.stale_discarded += 1;
            debug!(%candidate, ?outcome, "discarding stale uniqueness probe result");
            return;
        }
        debug!(%candidate, ?outcome, "uniqueness probe resolved");
        self.state.send_replace(outcome);
    }
}

pub struct UniquenessValidator {
    store: Arc<dyn RemoteStore>,
    quiescence: Duration,
    policy: ProbeFailurePolicy,
    shared: Arc<Shared>,
}

impl UniquenessValidator {
    pub fn new(store: Arc<dyn RemoteStore>, quiescence: Duration) -> Self {
        let (state, _) = watch::channel(ValidationState::Idle);
        Self {
            store,
            quiescence,
            policy: ProbeFailurePolicy::default(),
            shared: Arc::new(Shared {
                state,
                slot: Mutex::new(ProbeSlot::default()),
            }),
        }
    }

    pub fn from_config(store: Arc<dyn RemoteStore>, config: &ClientConfig) -> Self {
        Self::new(store, config.quiescence).with_policy(config.probe_failure)
    }

    pub fn with_policy(mut self, policy: ProbeFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn quiescence(&self) -> Duration {
        self.quiescence
    }

    pub fn state(&self) -> ValidationState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationState> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> ValidatorStats {
        self.shared.slot().stats
    }

    /// Candidate of the most recent `check`, if not reset since.
    pub fn candidate(&self) -> Option<PersonaId> {
        self.shared.slot().candidate.clone()
    }

    /// Starts a uniqueness check for `candidate`. Returns immediately.
    ///
    /// When `original` equals `candidate` the state becomes `Available`
    /// without any probe. Otherwise the state becomes `Pending` and a probe is
    /// sent once the quiescence window passes without another call.
    ///
    /// Must be called from within a tokio runtime.
    pub fn check(&self, candidate: &PersonaId, original: Option<&PersonaId>) {
        let mut slot = self.shared.slot();
        slot.epoch += 1;
        slot.stats.checks += 1;
        let epoch = slot.epoch;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.candidate = Some(candidate.clone());

        if original == Some(candidate) {
            debug!(%candidate, "identifier unchanged from original record, no probe needed");
            self.shared.state.send_replace(ValidationState::Available);
            return;
        }

        self.shared.state.send_replace(ValidationState::Pending);
        let deadline = Instant::now() + self.quiescence;
        let shared = Arc::clone(&self.shared);
        let store = Arc::clone(&self.store);
        let policy = self.policy;
        let candidate = candidate.clone();

        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if !shared.begin_probe(epoch) {
                return;
            }
            debug!(%candidate, epoch, "issuing uniqueness probe");
            // Detached so that a later `check` cancelling the timer leaves the probe running.
            tokio::spawn(probe(shared, store, candidate, epoch, policy));
        }));
    }

    /// Cancels any pending timer, invalidates in-flight probes and returns to `Idle`.
    pub fn reset(&self) {
        let mut slot = self.shared.slot();
        slot.epoch += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.candidate = None;
        self.shared.state.send_replace(ValidationState::Idle);
    }

    /// Waits until the state is no longer `Pending`.
    pub async fn resolved(&self) -> ValidationState {
        let mut rx = self.shared.state.subscribe();
        match rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }
}

impl Drop for UniquenessValidator {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.slot().timer.take() {
            timer.abort();
        }
    }
}

async fn probe(
    shared: Arc<Shared>,
    store: Arc<dyn RemoteStore>,
    candidate: PersonaId,
    epoch: u64,
    policy: ProbeFailurePolicy,
) {
    let outcome = match store.get(&candidate).await {
        Ok(_) => ValidationState::Duplicate,
        Err(StoreError::NotFound(_)) => ValidationState::Available,
        Err(err) => {
            shared.slot().stats.probe_failures += 1;
            warn!(%candidate, error = %err, %policy, "uniqueness probe failed, not blocking the form");
            match policy {
                ProbeFailurePolicy::FailOpen => ValidationState::Available,
                ProbeFailurePolicy::Surface => ValidationState::CheckFailed,
            }
        }
    };
    shared.complete(epoch, &candidate, outcome);
}
