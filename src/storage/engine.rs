use crate::core::{Persona, PersonaId, StoreResult};
use async_trait::async_trait;
use std::fmt;

/// Authoritative persona store, reachable only through request/response calls.
///
/// Implementations must keep `StoreError::NotFound` (from `get`, `update`,
/// `delete`) and `StoreError::Conflict` (from `create`) distinguishable from
/// every other failure.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every persona, in no particular order.
    async fn list(&self) -> StoreResult<Vec<Persona>>;

    /// One persona by identifier.
    async fn get(&self, id: &PersonaId) -> StoreResult<Persona>;

    /// Insert a new persona; an existing identifier is a conflict.
    async fn create(&self, persona: &Persona) -> StoreResult<()>;

    /// Replace the persona at `id`. The payload identifier must equal `id`.
    async fn update(&self, id: &PersonaId, persona: &Persona) -> StoreResult<()>;

    /// Remove the persona at `id`.
    async fn delete(&self, id: &PersonaId) -> StoreResult<()>;
}

/// Tag for one RemoteStore call, used for accounting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
