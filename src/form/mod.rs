//! Per-form state machine sequencing field enablement, the identifier
//! uniqueness check and submission.
//!
//! ```text
//! Editable --blur(valid id)--> Verifying --Available--> Available --submit--> Submitting --ok--> Closed
//!                                  |  \--Duplicate--> Duplicate              |
//!                                  \--CheckFailed--> Editable                \--err--> Available
//! any --identifier edited--> Editable
//! ```

pub mod fields;
pub mod notice;

pub use fields::{FieldState, FormFields};
pub use notice::{Notice, NoticeLevel};

use crate::cache::{EntityCache, Mutation, MutationReceipt};
use crate::core::{ClientError, Field, FieldErrors, PersonaId};
use crate::validator::{UniquenessValidator, ValidationState};
use chrono::{Local, NaiveDate};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormPhase {
    Editable,
    Verifying,
    Available,
    Duplicate,
    Submitting,
    /// Terminal.
    Closed,
}

impl fmt::Display for FormPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormPhase::Editable => "editable",
            FormPhase::Verifying => "verifying",
            FormPhase::Available => "available",
            FormPhase::Duplicate => "duplicate",
            FormPhase::Submitting => "submitting",
            FormPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What the form was opened for: no identifier creates, an identifier edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormTarget {
    pub identifier: Option<PersonaId>,
}

impl FormTarget {
    pub fn create() -> Self {
        Self { identifier: None }
    }

    pub fn edit(identifier: PersonaId) -> Self {
        Self {
            identifier: Some(identifier),
        }
    }
}

/// One reason the submission gate is closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateViolation {
    #[error("a request is still in progress")]
    Loading,
    #[error("identifier is still being verified")]
    Verifying,
    #[error("identifier is already registered")]
    Duplicate,
    #[error("identifier must be exactly 8 digits")]
    IdentifierPattern,
    #[error("form is already being submitted")]
    Submitting,
    #[error("form is closed")]
    Closed,
    #[error("{0}")]
    InvalidFields(FieldErrors),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("form cannot be submitted: {}", describe(.0))]
    Rejected(Vec<GateViolation>),

    #[error("field '{0}' is disabled")]
    FieldDisabled(Field),

    #[error("form is {0}")]
    Unavailable(FormPhase),

    #[error(transparent)]
    Client(#[from] ClientError),
}

fn describe(violations: &[GateViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct FormCoordinator {
    cache: Arc<EntityCache>,
    validator: UniquenessValidator,
    validation: watch::Receiver<ValidationState>,
    original: Option<PersonaId>,
    phase: FormPhase,
    fields: FormFields,
    loading: bool,
    /// Set on blur when the identifier is not 8 digits
    identifier_malformed: bool,
    notices: Vec<Notice>,
}

impl FormCoordinator {
    pub fn new(cache: Arc<EntityCache>, validator: UniquenessValidator, target: FormTarget) -> Self {
        let validation = validator.subscribe();
        let mut fields = FormFields::new();
        if let Some(id) = &target.identifier {
            let identifier = fields.get_mut(Field::Identifier);
            identifier.fill(id.as_str());
            identifier.disable();
        }
        Self {
            cache,
            validator,
            validation,
            original: target.identifier,
            phase: FormPhase::Editable,
            fields,
            loading: false,
            identifier_malformed: false,
            notices: Vec::new(),
        }
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn is_edit(&self) -> bool {
        self.original.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn identifier_malformed(&self) -> bool {
        self.identifier_malformed
    }

    pub fn field(&self, field: Field) -> &FieldState {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn validation_state(&self) -> ValidationState {
        self.validator.state()
    }

    pub fn validator(&self) -> &UniquenessValidator {
        &self.validator
    }

    /// Notices raised since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Info => info!(%notice, "form notice"),
            NoticeLevel::Warning | NoticeLevel::Error => warn!(%notice, "form notice"),
        }
        self.notices.push(notice);
    }

    fn ensure_open(&self) -> Result<(), FormError> {
        match self.phase {
            FormPhase::Submitting | FormPhase::Closed => Err(FormError::Unavailable(self.phase)),
            _ => Ok(()),
        }
    }

    /// Fills the form from the stored record when editing. No-op when creating.
    pub async fn load(&mut self) -> Result<(), FormError> {
        self.ensure_open()?;
        let Some(id) = self.original.clone() else {
            return Ok(());
        };

        self.loading = true;
        let result = self.cache.fetch(&id).await;
        self.loading = false;

        match result {
            Ok(persona) => {
                self.fields.fill(&persona);
                // The key always comes from the record being edited.
                self.fields.get_mut(Field::Identifier).fill(id.as_str());
                Ok(())
            }
            Err(err) => {
                self.notify(Notice::LoadFailed(id));
                Err(err.into())
            }
        }
    }

    /// Edits the identifier; a changed value re-arms the uniqueness cycle.
    pub fn set_identifier(&mut self, raw: &str) -> Result<(), FormError> {
        self.ensure_open()?;
        let identifier = self.fields.get_mut(Field::Identifier);
        if !identifier.is_enabled() {
            return Err(FormError::FieldDisabled(Field::Identifier));
        }
        if identifier.value() == raw {
            return Ok(());
        }
        identifier.edit(raw);

        self.validator.reset();
        if self.phase != FormPhase::Editable {
            debug!(from = %self.phase, "identifier edited, verification re-armed");
            self.phase = FormPhase::Editable;
        }
        Ok(())
    }

    pub fn set_field(&mut self, field: Field, value: &str) -> Result<(), FormError> {
        if field == Field::Identifier {
            return self.set_identifier(value);
        }
        self.ensure_open()?;
        let state = self.fields.get_mut(field);
        if !state.is_enabled() {
            return Err(FormError::FieldDisabled(field));
        }
        state.edit(value);
        Ok(())
    }

    /// Identifier lost focus: verify it if well-formed.
    ///
    /// A malformed identifier raises the pattern error, keeps the form
    /// `Editable` and issues no probe.
    pub fn blur_identifier(&mut self) -> FormPhase {
        if self.ensure_open().is_err() {
            return self.phase;
        }
        let identifier = self.fields.get_mut(Field::Identifier);
        identifier.touch();

        match PersonaId::parse(identifier.value()) {
            Ok(candidate) => {
                self.identifier_malformed = false;
                self.phase = FormPhase::Verifying;
                self.validator.check(&candidate, self.original.as_ref());
                self.sync_validation()
            }
            Err(err) => {
                debug!(error = %err, "identifier malformed on blur");
                self.identifier_malformed = true;
                self.validator.reset();
                self.phase = FormPhase::Editable;
                self.fields.enable_dependents();
                self.phase
            }
        }
    }

    /// Applies a resolved validation result without waiting.
    pub fn sync_validation(&mut self) -> FormPhase {
        if self.phase == FormPhase::Verifying {
            let state = *self.validation.borrow_and_update();
            self.apply_validation(state);
        }
        self.phase
    }

    /// Waits for a pending verification to resolve and applies it.
    pub async fn settle(&mut self) -> FormPhase {
        if self.phase == FormPhase::Verifying {
            let state = match self.validation.wait_for(|state| !state.is_pending()).await {
                Ok(state) => *state,
                Err(_) => ValidationState::Idle,
            };
            self.apply_validation(state);
        }
        self.phase
    }

    fn apply_validation(&mut self, state: ValidationState) {
        match state {
            ValidationState::Available => {
                self.phase = FormPhase::Available;
                self.fields.enable_dependents();
            }
            ValidationState::Duplicate => {
                self.phase = FormPhase::Duplicate;
                self.fields.lock_out_dependents();
                self.fields.get_mut(Field::Identifier).touch();
                if let Some(id) = self.validator.candidate() {
                    self.notify(Notice::DuplicateIdentifier(id));
                }
            }
            ValidationState::CheckFailed => {
                self.phase = FormPhase::Editable;
                self.fields.enable_dependents();
                if let Some(id) = self.validator.candidate() {
                    self.notify(Notice::VerificationUnavailable(id));
                }
            }
            ValidationState::Idle | ValidationState::Pending => {}
        }
    }

    /// Every reason submission is currently refused; empty when it is allowed.
    pub fn gate_violations(&self) -> Vec<GateViolation> {
        let mut violations = Vec::new();
        if self.loading {
            violations.push(GateViolation::Loading);
        }
        match self.phase {
            FormPhase::Verifying => violations.push(GateViolation::Verifying),
            FormPhase::Duplicate => violations.push(GateViolation::Duplicate),
            FormPhase::Submitting => violations.push(GateViolation::Submitting),
            FormPhase::Closed => violations.push(GateViolation::Closed),
            FormPhase::Editable | FormPhase::Available => {}
        }
        if self.identifier_malformed {
            violations.push(GateViolation::IdentifierPattern);
        }
        if let Err(errors) = self.fields.draft().into_persona(today()) {
            violations.push(GateViolation::InvalidFields(errors));
        }
        violations
    }

    pub fn can_submit(&self) -> bool {
        self.gate_violations().is_empty()
    }

    /// Creates or updates the persona through the cache.
    ///
    /// A closed gate makes no network call and raises `CorrectErrors`.
    /// On success the form closes; on failure it returns to `Available` with
    /// a notice that tells a duplicate-key conflict apart from other failures.
    pub async fn submit(&mut self) -> Result<MutationReceipt, FormError> {
        self.sync_validation();
        let violations = self.gate_violations();
        if !violations.is_empty() {
            self.notify(Notice::CorrectErrors);
            return Err(FormError::Rejected(violations));
        }

        let persona = self
            .fields
            .draft()
            .into_persona(today())
            .map_err(|errors| FormError::Rejected(vec![GateViolation::InvalidFields(errors)]))?;
        let mutation = match &self.original {
            None => Mutation::Create(persona),
            Some(id) => Mutation::Update {
                id: id.clone(),
                persona: persona.with_identifier(id.clone()),
            },
        };
        let kind = mutation.kind();

        self.phase = FormPhase::Submitting;
        self.loading = true;
        let result = self.cache.mutate(mutation).await;
        self.loading = false;

        match result {
            Ok(receipt) => {
                self.phase = FormPhase::Closed;
                self.notify(Notice::Saved {
                    kind,
                    identifier: receipt.identifier.clone(),
                });
                Ok(receipt)
            }
            Err(err) => {
                self.phase = FormPhase::Available;
                match &err {
                    ClientError::Conflict(id) => self.notify(Notice::ConflictOnSubmit(id.clone())),
                    _ => self.notify(Notice::SaveFailed(kind)),
                }
                Err(err.into())
            }
        }
    }

    /// Abandons the form.
    pub fn cancel(&mut self) {
        self.validator.reset();
        self.phase = FormPhase::Closed;
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
