use crate::cache::MutationKind;
use crate::core::PersonaId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible message raised by the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The uniqueness probe found the identifier already registered.
    DuplicateIdentifier(PersonaId),
    /// The uniqueness probe could not reach the store.
    VerificationUnavailable(PersonaId),
    /// Submission was refused by the gate.
    CorrectErrors,
    Saved {
        kind: MutationKind,
        identifier: PersonaId,
    },
    /// The store rejected a create as a duplicate key.
    ConflictOnSubmit(PersonaId),
    SaveFailed(MutationKind),
    LoadFailed(PersonaId),
}

impl Notice {
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::Saved { .. } => NoticeLevel::Info,
            Notice::DuplicateIdentifier(_)
            | Notice::VerificationUnavailable(_)
            | Notice::CorrectErrors => NoticeLevel::Warning,
            Notice::ConflictOnSubmit(_) | Notice::SaveFailed(_) | Notice::LoadFailed(_) => {
                NoticeLevel::Error
            }
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::DuplicateIdentifier(id) => {
                write!(f, "identifier {id} is already registered")
            }
            Notice::VerificationUnavailable(id) => {
                write!(f, "could not verify identifier {id}")
            }
            Notice::CorrectErrors => f.write_str("please correct the form errors"),
            Notice::Saved {
                kind: MutationKind::Create,
                identifier,
            } => write!(f, "persona {identifier} was created"),
            Notice::Saved {
                kind: MutationKind::Update,
                identifier,
            } => write!(f, "persona {identifier} was updated"),
            Notice::Saved {
                kind: MutationKind::Delete,
                identifier,
            } => write!(f, "persona {identifier} was deleted"),
            Notice::ConflictOnSubmit(id) => {
                write!(f, "identifier {id} already exists in the store")
            }
            Notice::SaveFailed(kind) => write!(f, "failed to {kind} the persona"),
            Notice::LoadFailed(id) => write!(f, "failed to load persona {id}"),
        }
    }
}
