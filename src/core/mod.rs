pub mod error;
pub mod types;
pub mod validation;

pub use error::{
    ClientError, FieldErrorKind, FieldErrors, FieldValidationError, Result, StoreError,
    StoreResult,
};
pub use types::{Field, Persona, PersonaDraft, PersonaId, Phone};
