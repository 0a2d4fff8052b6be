//! Locally cached view of the persona collection.
//!
//! The cache owns the canonical set exclusively. Every write goes to the
//! remote store first and is followed by a full reload, so the cache is
//! eventually (not immediately) consistent with the store.

pub mod snapshot;

pub use snapshot::{CollationKey, Snapshot, collate, compare_personas};

use crate::core::{ClientError, Persona, PersonaId, Result, StoreError};
use crate::storage::RemoteStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Canonical set as last confirmed by the store, unordered.
#[derive(Debug, Clone, Default)]
struct Canonical {
    /// Issue sequence number of the reload that produced this set
    revision: u64,
    personas: Arc<Vec<Persona>>,
}

impl Canonical {
    fn snapshot(&self) -> Snapshot {
        Snapshot::sorted(self.revision, &self.personas)
    }
}

/// A write routed through the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(Persona),
    Update { id: PersonaId, persona: Persona },
    Delete(PersonaId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => f.write_str("create"),
            MutationKind::Update => f.write_str("update"),
            MutationKind::Delete => f.write_str("delete"),
        }
    }
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Create(_) => MutationKind::Create,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::Delete(_) => MutationKind::Delete,
        }
    }

    pub fn identifier(&self) -> &PersonaId {
        match self {
            Mutation::Create(persona) => &persona.identifier,
            Mutation::Update { id, .. } | Mutation::Delete(id) => id,
        }
    }
}

/// Acknowledged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    pub kind: MutationKind,
    pub identifier: PersonaId,
    /// Whether the reload triggered by the mutation succeeded.
    pub refreshed: bool,
}

/// Live feed of snapshots.
///
/// Replays the latest snapshot on subscription. A slow subscriber skips
/// intermediate snapshots but never sees them out of order.
pub struct Subscription {
    rx: watch::Receiver<Canonical>,
}

impl Subscription {
    /// Latest snapshot; marks it as seen.
    pub fn current(&mut self) -> Snapshot {
        self.rx.borrow_and_update().snapshot()
    }

    /// True when a snapshot newer than the last seen one is available.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits for the next canonical-set change. `None` once the cache is dropped.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}

pub struct EntityCache {
    store: Arc<dyn RemoteStore>,
    canonical: watch::Sender<Canonical>,
    /// Last reload sequence number handed out
    issued: AtomicU64,
}

impl EntityCache {
    /// Empty cache; performs no I/O.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let (canonical, _) = watch::channel(Canonical::default());
        Self {
            store,
            canonical,
            issued: AtomicU64::new(0),
        }
    }

    /// Cache with its startup reload done. A failed load leaves it empty.
    pub async fn open(store: Arc<dyn RemoteStore>) -> Self {
        let cache = Self::new(store);
        if let Err(err) = cache.reload().await {
            warn!(error = %err, "initial persona load failed, starting empty");
        }
        cache
    }

    /// Store handle for read-only collaborators such as the uniqueness validator.
    pub fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.canonical.subscribe(),
        }
    }

    /// Current sorted view.
    pub fn snapshot(&self) -> Snapshot {
        self.canonical.borrow().snapshot()
    }

    /// Replaces the canonical set with a fresh listing.
    ///
    /// On failure the last known set stays in place and the error is returned
    /// once; nothing is retried. A listing that completes after a later-issued
    /// reload was already applied is dropped, so the set never moves backwards.
    pub async fn reload(&self) -> Result<Snapshot> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, "reloading personas");

        let listing = match self.store.list().await {
            Ok(listing) => listing,
            Err(err) => {
                warn!(seq, error = %err, "persona reload failed, keeping last known set");
                return Err(ClientError::LoadFailure(err));
            }
        };

        let personas = dedupe(listing);
        let count = personas.len();
        let applied = self.canonical.send_if_modified(|current| {
            if seq <= current.revision {
                return false;
            }
            *current = Canonical {
                revision: seq,
                personas: Arc::new(personas),
            };
            true
        });

        if applied {
            debug!(seq, count, "persona set replaced");
        } else {
            debug!(seq, "discarding reload superseded by a newer one");
        }
        Ok(self.snapshot())
    }

    /// Reads one persona straight from the store, e.g. to edit it.
    pub async fn fetch(&self, id: &PersonaId) -> Result<Persona> {
        self.store.get(id).await.map_err(|err| {
            warn!(%id, error = %err, "failed to fetch persona");
            ClientError::LoadFailure(err)
        })
    }

    /// Sends `mutation` to the store, then reloads before resolving.
    ///
    /// A failed mutation leaves the canonical set untouched and triggers no
    /// reload. A duplicate-key rejection comes back as `ClientError::Conflict`.
    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationReceipt> {
        let kind = mutation.kind();
        let identifier = mutation.identifier().clone();

        let outcome = match &mutation {
            Mutation::Create(persona) => self.store.create(persona).await,
            Mutation::Update { id, persona } => {
                if &persona.identifier != id {
                    return Err(ClientError::MutationFailure(StoreError::IdentifierMismatch {
                        path: id.clone(),
                        payload: persona.identifier.clone(),
                    }));
                }
                self.store.update(id, persona).await
            }
            Mutation::Delete(id) => self.store.delete(id).await,
        };

        if let Err(err) = outcome {
            warn!(%kind, id = %identifier, error = %err, "persona mutation failed");
            return Err(ClientError::from_mutation(err));
        }
        info!(%kind, id = %identifier, "persona mutation acknowledged");

        let refreshed = self.reload().await.is_ok();
        Ok(MutationReceipt {
            kind,
            identifier,
            refreshed,
        })
    }
}

/// Collapses repeated identifiers, keeping the last occurrence in place of the first.
fn dedupe(listing: Vec<Persona>) -> Vec<Persona> {
    let mut positions: HashMap<PersonaId, usize> = HashMap::with_capacity(listing.len());
    let mut personas: Vec<Persona> = Vec::with_capacity(listing.len());
    for persona in listing {
        match positions.get(&persona.identifier) {
            Some(&index) => {
                warn!(id = %persona.identifier, "store listed a duplicate identifier");
                personas[index] = persona;
            }
            None => {
                positions.insert(persona.identifier.clone(), personas.len());
                personas.push(persona);
            }
        }
    }
    personas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Phone;
    use crate::storage::{InMemoryStore, Operation};
    use chrono::NaiveDate;

    fn persona(id: &str, name: &str, surname: &str) -> Persona {
        Persona {
            identifier: PersonaId::parse(id).unwrap(),
            name: name.to_string(),
            surname: surname.to_string(),
            email: "someone@example.com".to_string(),
            phone: Phone::parse("600000000").unwrap(),
            birth_date: NaiveDate::from_ymd_opt(1985, 3, 9).unwrap(),
        }
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence() {
        let personas = dedupe(vec![
            persona("00000001", "Ana", "Old"),
            persona("00000002", "Zoe", "Alvarez"),
            persona("00000001", "Ana", "New"),
        ]);
        assert_eq!(personas.len(), 2);
        assert_eq!(personas[0].surname, "New");
    }

    #[tokio::test]
    async fn test_new_cache_is_empty_until_reloaded() {
        let store = Arc::new(InMemoryStore::with_personas([persona("00000001", "Ana", "Ruiz")]));
        let cache = EntityCache::new(store.clone());

        assert!(cache.snapshot().is_empty());
        assert_eq!(cache.snapshot().revision(), 0);
        assert_eq!(store.calls(Operation::List), 0);

        let snapshot = cache.reload().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.revision(), 1);
    }

    #[tokio::test]
    async fn test_update_with_mismatched_identifier_is_rejected_locally() {
        let store = Arc::new(InMemoryStore::with_personas([persona("00000001", "Ana", "Ruiz")]));
        let cache = EntityCache::open(store.clone()).await;

        let err = cache
            .mutate(Mutation::Update {
                id: PersonaId::parse("00000001").unwrap(),
                persona: persona("00000002", "Ana", "Ruiz"),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::MutationFailure(StoreError::IdentifierMismatch { .. })
        ));
        assert_eq!(store.calls(Operation::Update), 0);
        assert_eq!(store.calls(Operation::List), 1);
    }
}
