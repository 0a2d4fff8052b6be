// ============================================================================
// src/cache/snapshot.rs - Sorted read view of the canonical persona set
// ============================================================================
//
// Ordering: surname first, given name as tiebreaker, identifier last so the
// order is total. Names compare case-insensitively under a collation that
// strips combining marks after canonical decomposition at the primary level
// and keeps the composed form as a secondary difference, the way a locale-aware comparison ranks "Álvarez" next to
// "Alvarez" rather than after "Zapata".
//
// ============================================================================

use crate::core::{Persona, PersonaId};
use crate::core::validation::DATE_FORMAT;
use std::cmp::Ordering;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

// ============================================================================
// COLLATION
// ============================================================================

/// Primary and secondary collation keys of one string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: String,
    secondary: String,
}

impl CollationKey {
    pub fn new(text: &str) -> Self {
        let primary = text
            .nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect();
        let secondary = text.nfc().flat_map(char::to_lowercase).collect();
        Self { primary, secondary }
    }
}

/// Case- and accent-insensitive comparison with an accent-sensitive tiebreak.
pub fn collate(a: &str, b: &str) -> Ordering {
    CollationKey::new(a).cmp(&CollationKey::new(b))
}

/// Display order of the persona list.
pub fn compare_personas(a: &Persona, b: &Persona) -> Ordering {
    collate(&a.surname, &b.surname)
        .then_with(|| collate(&a.name, &b.name))
        .then_with(|| a.identifier.cmp(&b.identifier))
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable, sorted view of the canonical set at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    revision: u64,
    personas: Arc<[Persona]>,
}

impl Snapshot {
    /// Sorts `personas` into a new snapshot.
    pub fn sorted(revision: u64, personas: &[Persona]) -> Self {
        let mut ordered = personas.to_vec();
        ordered.sort_by(compare_personas);
        Self {
            revision,
            personas: ordered.into(),
        }
    }

    /// Sequence number of the reload that produced this view (0 before the first).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn as_slice(&self) -> &[Persona] {
        &self.personas
    }

    pub fn get(&self, id: &PersonaId) -> Option<&Persona> {
        self.personas.iter().find(|p| &p.identifier == id)
    }

    pub fn contains(&self, id: &PersonaId) -> bool {
        self.get(id).is_some()
    }

    /// Rows whose displayed columns contain `query`, trimmed and case-insensitive.
    ///
    /// An empty query matches every row.
    pub fn filter(&self, query: &str) -> Vec<&Persona> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.personas.iter().collect();
        }
        self.personas
            .iter()
            .filter(|p| row_text(p).contains(&needle))
            .collect()
    }
}

fn row_text(persona: &Persona) -> String {
    format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
        persona.identifier,
        persona.name,
        persona.surname,
        persona.email,
        persona.phone,
        persona.birth_date.format(DATE_FORMAT)
    )
    .to_lowercase()
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Persona;
    type IntoIter = std::slice::Iter<'a, Persona>;

    fn into_iter(self) -> Self::IntoIter {
        self.personas.iter()
    }
}
