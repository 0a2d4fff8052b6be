use super::types::{Field, PersonaId};
use std::fmt;
use thiserror::Error;

/// Why a single form field was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    #[error("value is required")]
    Required,

    #[error("expected {expected}")]
    Pattern { expected: &'static str },

    #[error("must be at most {max} characters")]
    TooLong { max: usize },

    #[error("not a valid email address")]
    InvalidEmail,

    #[error("not a valid calendar date (expected YYYY-MM-DD)")]
    InvalidDate,

    #[error("date cannot be in the future")]
    FutureDate,
}

/// Local, synchronous validation failure for one field. Never reaches the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {kind}")]
pub struct FieldValidationError {
    pub field: Field,
    pub kind: FieldErrorKind,
}

impl FieldValidationError {
    pub fn new(field: Field, kind: FieldErrorKind) -> Self {
        Self { field, kind }
    }
}

/// Every violation found while converting a draft into an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldValidationError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: FieldValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldValidationError> {
        self.0.iter()
    }

    /// True when `field` has at least one violation.
    pub fn contains(&self, field: Field) -> bool {
        self.0.iter().any(|err| err.field == field)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl From<FieldValidationError> for FieldErrors {
    fn from(error: FieldValidationError) -> Self {
        Self(vec![error])
    }
}

/// Outcome of a failed RemoteStore call.
///
/// `NotFound` and `Conflict` are distinguished outcomes: the first is the
/// positive "available" signal of a uniqueness probe, the second is a
/// duplicate-key rejection of a create.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("persona '{0}' not found")]
    NotFound(PersonaId),

    #[error("persona '{0}' already exists")]
    Conflict(PersonaId),

    #[error("identifier mismatch: path '{path}' but payload '{payload}'")]
    IdentifierMismatch { path: PersonaId, payload: PersonaId },

    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error surfaced by the cache to its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("identifier '{0}' already exists")]
    Conflict(PersonaId),

    #[error("load failed: {0}")]
    LoadFailure(StoreError),

    #[error("mutation failed: {0}")]
    MutationFailure(StoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Classifies a failed mutation call; a store conflict stays distinguishable.
    pub fn from_mutation(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => Self::Conflict(id),
            other => Self::MutationFailure(other),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
