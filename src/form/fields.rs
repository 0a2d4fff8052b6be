use crate::core::{Field, Persona, PersonaDraft};

/// One input of the form: its text, whether it accepts edits, and whether the
/// user has touched it since it was last reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldState {
    value: String,
    enabled: bool,
    touched: bool,
}

impl FieldState {
    fn new() -> Self {
        Self {
            value: String::new(),
            enabled: true,
            touched: false,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_pristine(&self) -> bool {
        !self.touched
    }

    pub(crate) fn edit(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.touched = true;
    }

    pub(crate) fn fill(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub(crate) fn touch(&mut self) {
        self.touched = true;
    }

    pub(crate) fn enable(&mut self) {
        self.enabled = true;
    }

    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    /// Empty, pristine and disabled.
    pub(crate) fn lock_out(&mut self) {
        self.value.clear();
        self.touched = false;
        self.enabled = false;
    }
}

/// Every input of the persona form, indexed by [`Field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    states: [FieldState; 6],
}

impl FormFields {
    pub fn new() -> Self {
        Self {
            states: std::array::from_fn(|_| FieldState::new()),
        }
    }

    pub fn get(&self, field: Field) -> &FieldState {
        &self.states[field as usize]
    }

    pub(crate) fn get_mut(&mut self, field: Field) -> &mut FieldState {
        &mut self.states[field as usize]
    }

    pub fn draft(&self) -> PersonaDraft {
        let mut draft = PersonaDraft::default();
        for field in Field::ALL {
            draft.set(field, self.get(field).value());
        }
        draft
    }

    /// Loads a stored record without marking anything touched.
    pub(crate) fn fill(&mut self, persona: &Persona) {
        let draft = PersonaDraft::from(persona);
        for field in Field::ALL {
            self.get_mut(field).fill(draft.value(field));
        }
    }

    pub(crate) fn enable_dependents(&mut self) {
        for field in Field::DEPENDENTS {
            self.get_mut(field).enable();
        }
    }

    pub(crate) fn lock_out_dependents(&mut self) {
        for field in Field::DEPENDENTS {
            self.get_mut(field).lock_out();
        }
    }
}

impl Default for FormFields {
    fn default() -> Self {
        Self::new()
    }
}
