// ============================================================================
// Persona Client Library
// ============================================================================

pub mod cache;
pub mod config;
pub mod core;
pub mod form;
pub mod server;
pub mod storage;
pub mod validator;

// Re-export main types for convenience
pub use crate::cache::{EntityCache, Mutation, MutationKind, MutationReceipt, Snapshot, Subscription};
pub use crate::config::{ClientConfig, ProbeFailurePolicy};
pub use crate::core::{
    ClientError, Field, FieldErrorKind, FieldErrors, FieldValidationError, Persona, PersonaDraft,
    PersonaId, Phone, Result, StoreError, StoreResult,
};
pub use crate::form::{FormCoordinator, FormError, FormPhase, FormTarget, GateViolation, Notice};
pub use crate::storage::{HttpStore, InMemoryStore, RemoteStore};
pub use crate::validator::{UniquenessValidator, ValidationState, ValidatorStats};

use anyhow::{Context, anyhow};
use std::sync::Arc;

// ============================================================================
// High-level Client API
// ============================================================================

/// Persona registry client
///
/// Owns the shared [`EntityCache`] and hands out one validator and form
/// coordinator per opened form.
///
/// # Examples
///
/// ```no_run
/// use persona_client::{ClientConfig, FormTarget, PersonaClient};
///
/// # async fn run() -> anyhow::Result<()> {
/// let client = PersonaClient::connect(ClientConfig::new("http://localhost:3000/")).await?;
/// for persona in client.cache().snapshot().iter() {
///     println!("{} {}", persona.identifier, persona.surname);
/// }
///
/// let mut form = client.form(FormTarget::create());
/// form.set_identifier("12345678")?;
/// form.blur_identifier();
/// form.settle().await;
/// # Ok(())
/// # }
/// ```
pub struct PersonaClient {
    config: ClientConfig,
    cache: Arc<EntityCache>,
}

impl PersonaClient {
    /// Connect to the REST store described by `config` and load the collection.
    ///
    /// A failed initial load is not an error: the cache starts empty.
    pub async fn connect(config: ClientConfig) -> anyhow::Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;
        let store = HttpStore::new(&config).context("failed to build HTTP client")?;
        Ok(Self::with_store(config, Arc::new(store)).await)
    }

    /// Client over an arbitrary store, e.g. an [`InMemoryStore`].
    pub async fn with_store(config: ClientConfig, store: Arc<dyn RemoteStore>) -> Self {
        let cache = Arc::new(EntityCache::open(store).await);
        Self { config, cache }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Fresh validator configured from the client settings.
    pub fn validator(&self) -> UniquenessValidator {
        UniquenessValidator::from_config(self.cache.store(), &self.config)
    }

    /// Opens a create or edit form with its own validator.
    pub fn form(&self, target: FormTarget) -> FormCoordinator {
        FormCoordinator::new(Arc::clone(&self.cache), self.validator(), target)
    }
}
