use super::engine::{Operation, RemoteStore};
use crate::core::{Persona, PersonaId, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::RwLock;

/// In-process authoritative store.
///
/// Backs the reference server and every test suite. Besides the plain
/// contract it can delay calls, fail them on demand and count them, which is
/// how debounce, stale-probe and out-of-order reload behaviour get exercised.
pub struct InMemoryStore {
    /// Records keyed by identifier - one entry per persona
    records: RwLock<BTreeMap<PersonaId, Persona>>,
    /// Latency, failure and accounting knobs, under a short-lived lock
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct Faults {
    latency: HashMap<Operation, Duration>,
    probe_latency: HashMap<PersonaId, Duration>,
    list_latency_queue: VecDeque<Duration>,
    failures: HashMap<Operation, VecDeque<StoreError>>,
    calls: HashMap<Operation, usize>,
    probed: Vec<PersonaId>,
}

/// What one call should do before touching the records.
struct CallPlan {
    delay: Duration,
    failure: Option<StoreError>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_personas(Vec::new())
    }

    pub fn with_personas(personas: impl IntoIterator<Item = Persona>) -> Self {
        let records = personas
            .into_iter()
            .map(|p| (p.identifier.clone(), p))
            .collect();
        Self {
            records: RwLock::new(records),
            faults: Mutex::new(Faults::default()),
        }
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay every call of `op` by `latency`.
    pub fn set_latency(&self, op: Operation, latency: Duration) {
        self.faults().latency.insert(op, latency);
    }

    /// Delay `get` calls for one identifier, overriding the `Get` latency.
    pub fn set_probe_latency(&self, id: &PersonaId, latency: Duration) {
        self.faults().probe_latency.insert(id.clone(), latency);
    }

    /// Delay only the next not-yet-issued `list` call.
    pub fn push_list_latency(&self, latency: Duration) {
        self.faults().list_latency_queue.push_back(latency);
    }

    /// Fail the next call of `op` with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, op: Operation, error: StoreError) {
        self.faults().failures.entry(op).or_default().push_back(error);
    }

    /// Number of calls of `op` issued so far, failed ones included.
    pub fn calls(&self, op: Operation) -> usize {
        self.faults().calls.get(&op).copied().unwrap_or(0)
    }

    /// Identifiers passed to `get`, in issue order.
    pub fn probed(&self) -> Vec<PersonaId> {
        self.faults().probed.clone()
    }

    /// Write a record directly, as another client would.
    pub async fn insert_external(&self, persona: Persona) {
        self.records
            .write()
            .await
            .insert(persona.identifier.clone(), persona);
    }

    /// Remove a record directly, as another client would.
    pub async fn remove_external(&self, id: &PersonaId) -> Option<Persona> {
        self.records.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn contains(&self, id: &PersonaId) -> bool {
        self.records.read().await.contains_key(id)
    }

    fn plan(&self, op: Operation, probe: Option<&PersonaId>) -> CallPlan {
        let mut faults = self.faults();
        *faults.calls.entry(op).or_insert(0) += 1;

        let mut delay = faults.latency.get(&op).copied().unwrap_or_default();
        if let Some(id) = probe {
            faults.probed.push(id.clone());
            if let Some(latency) = faults.probe_latency.get(id) {
                delay = *latency;
            }
        }
        if op == Operation::List
            && let Some(latency) = faults.list_latency_queue.pop_front()
        {
            delay = latency;
        }

        let failure = faults.failures.get_mut(&op).and_then(VecDeque::pop_front);
        CallPlan { delay, failure }
    }

    async fn wait(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn list(&self) -> StoreResult<Vec<Persona>> {
        let plan = self.plan(Operation::List, None);
        // The response reflects the store at request time, not at delivery.
        let personas: Vec<Persona> = self.records.read().await.values().cloned().collect();
        Self::wait(plan.delay).await;
        match plan.failure {
            Some(err) => Err(err),
            None => Ok(personas),
        }
    }

    async fn get(&self, id: &PersonaId) -> StoreResult<Persona> {
        let plan = self.plan(Operation::Get, Some(id));
        Self::wait(plan.delay).await;
        if let Some(err) = plan.failure {
            return Err(err);
        }
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn create(&self, persona: &Persona) -> StoreResult<()> {
        let plan = self.plan(Operation::Create, None);
        Self::wait(plan.delay).await;
        if let Some(err) = plan.failure {
            return Err(err);
        }
        let mut records = self.records.write().await;
        if records.contains_key(&persona.identifier) {
            return Err(StoreError::Conflict(persona.identifier.clone()));
        }
        records.insert(persona.identifier.clone(), persona.clone());
        Ok(())
    }

    async fn update(&self, id: &PersonaId, persona: &Persona) -> StoreResult<()> {
        let plan = self.plan(Operation::Update, None);
        Self::wait(plan.delay).await;
        if let Some(err) = plan.failure {
            return Err(err);
        }
        if &persona.identifier != id {
            return Err(StoreError::IdentifierMismatch {
                path: id.clone(),
                payload: persona.identifier.clone(),
            });
        }
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(existing) => {
                *existing = persona.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn delete(&self, id: &PersonaId) -> StoreResult<()> {
        let plan = self.plan(Operation::Delete, None);
        Self::wait(plan.delay).await;
        if let Some(err) = plan.failure {
            return Err(err);
        }
        match self.records.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }
}
