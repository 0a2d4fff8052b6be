use super::error::{FieldErrors, FieldValidationError};
use super::validation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const IDENTIFIER_LEN: usize = 8;
pub const PHONE_LEN: usize = 9;
pub const NAME_MAX_LEN: usize = 20;

// ============================================================================
// FIELDS
// ============================================================================

/// One input of the persona form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Identifier,
    Name,
    Surname,
    Email,
    Phone,
    BirthDate,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Identifier,
        Field::Name,
        Field::Surname,
        Field::Email,
        Field::Phone,
        Field::BirthDate,
    ];

    /// Every field whose enablement depends on the identifier check.
    pub const DEPENDENTS: [Field; 5] = [
        Field::Name,
        Field::Surname,
        Field::Email,
        Field::Phone,
        Field::BirthDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Identifier => "identifier",
            Field::Name => "name",
            Field::Surname => "surname",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::BirthDate => "birth_date",
        }
    }

    pub fn is_dependent(&self) -> bool {
        !matches!(self, Field::Identifier)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// IDENTIFIER / PHONE
// ============================================================================

/// Natural key of a persona: exactly 8 ASCII digits, immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonaId(String);

impl PersonaId {
    pub fn parse(raw: &str) -> Result<Self, FieldValidationError> {
        validation::fixed_digits(Field::Identifier, raw, IDENTIFIER_LEN, "8 digits")
            .map(|value| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for PersonaId {
    type Err = FieldValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PersonaId {
    type Error = FieldValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PersonaId> for String {
    fn from(value: PersonaId) -> Self {
        value.0
    }
}

/// Phone number: exactly 9 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    pub fn parse(raw: &str) -> Result<Self, FieldValidationError> {
        validation::fixed_digits(Field::Phone, raw, PHONE_LEN, "9 digits")
            .map(|value| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl TryFrom<String> for Phone {
    type Error = FieldValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(value: Phone) -> Self {
        value.0
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// The single entity type managed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub identifier: PersonaId,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: Phone,
    /// Calendar date without time of day, exchanged as `YYYY-MM-DD`.
    #[serde(with = "wire_date")]
    pub birth_date: NaiveDate,
}

/// Strict `YYYY-MM-DD` encoding of a date on the wire.
mod wire_date {
    use super::validation::{self, DATE_FORMAT};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        validation::calendar_date(&raw).map_err(de::Error::custom)
    }
}

impl Persona {
    /// Copy of this record carrying another identifier's key.
    ///
    /// Updates never change the identifier: the key always comes from the
    /// original record, whatever the edited payload says.
    pub fn with_identifier(mut self, identifier: PersonaId) -> Self {
        self.identifier = identifier;
        self
    }
}

/// Raw textual form values, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonaDraft {
    pub identifier: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub birth_date: String,
}

impl PersonaDraft {
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Identifier => &self.identifier,
            Field::Name => &self.name,
            Field::Surname => &self.surname,
            Field::Email => &self.email,
            Field::Phone => &self.phone,
            Field::BirthDate => &self.birth_date,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        match field {
            Field::Identifier => self.identifier = value,
            Field::Name => self.name = value,
            Field::Surname => self.surname = value,
            Field::Email => self.email = value,
            Field::Phone => self.phone = value,
            Field::BirthDate => self.birth_date = value,
        }
    }

    /// Validates every field, collecting all violations.
    ///
    /// `today` bounds the birth date; callers pass the local calendar date.
    pub fn into_persona(&self, today: NaiveDate) -> Result<Persona, FieldErrors> {
        let mut errors = FieldErrors::new();

        let identifier = PersonaId::parse(&self.identifier).map_err(|e| errors.push(e)).ok();
        let name = validation::name(&self.name).map_err(|e| errors.push(e)).ok();
        let surname = validation::required(Field::Surname, &self.surname)
            .map_err(|e| errors.push(e))
            .ok();
        let email = validation::email(&self.email).map_err(|e| errors.push(e)).ok();
        let phone = Phone::parse(&self.phone).map_err(|e| errors.push(e)).ok();
        let birth_date = validation::birth_date(&self.birth_date, today)
            .map_err(|e| errors.push(e))
            .ok();

        match (identifier, name, surname, email, phone, birth_date) {
            (Some(identifier), Some(name), Some(surname), Some(email), Some(phone), Some(birth_date)) => {
                Ok(Persona {
                    identifier,
                    name: name.to_string(),
                    surname: surname.to_string(),
                    email: email.to_string(),
                    phone,
                    birth_date,
                })
            }
            _ => Err(errors),
        }
    }
}

impl From<&Persona> for PersonaDraft {
    fn from(persona: &Persona) -> Self {
        Self {
            identifier: persona.identifier.to_string(),
            name: persona.name.clone(),
            surname: persona.surname.clone(),
            email: persona.email.clone(),
            phone: persona.phone.to_string(),
            birth_date: persona.birth_date.format(validation::DATE_FORMAT).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::FieldErrorKind;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn draft() -> PersonaDraft {
        PersonaDraft {
            identifier: "12345678".into(),
            name: "Ana".into(),
            surname: "Alvarez".into(),
            email: "ana@example.com".into(),
            phone: "600123456".into(),
            birth_date: "1990-04-12".into(),
        }
    }

    #[test]
    fn test_identifier_requires_eight_digits() {
        assert!(PersonaId::parse("12345678").is_ok());
        assert_eq!(
            PersonaId::parse("").unwrap_err().kind,
            FieldErrorKind::Required
        );
        assert!(PersonaId::parse("1234567").is_err());
        assert!(PersonaId::parse("123456789").is_err());
        assert!(PersonaId::parse("1234567a").is_err());
        assert!(PersonaId::parse("１２３４５６７８").is_err());
    }

    #[test]
    fn test_identifier_wire_format_is_validated() {
        let ok: PersonaId = serde_json::from_str("\"00000042\"").unwrap();
        assert_eq!(ok.as_str(), "00000042");
        assert!(serde_json::from_str::<PersonaId>("\"42\"").is_err());
        assert!(serde_json::from_str::<PersonaId>("42").is_err());
    }

    #[test]
    fn test_birth_date_wire_format_is_validated() {
        let persona = draft().into_persona(today()).unwrap();
        let mut json = serde_json::to_value(&persona).unwrap();
        assert_eq!(serde_json::from_value::<Persona>(json.clone()).unwrap(), persona);

        for bad in ["1990-4-12", "+1990-04-12", "1990-04-12T00:00:00", "12/04/1990"] {
            json["birth_date"] = serde_json::Value::from(bad);
            assert!(
                serde_json::from_value::<Persona>(json.clone()).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_draft_into_persona() {
        let persona = draft().into_persona(today()).unwrap();
        assert_eq!(persona.identifier.as_str(), "12345678");
        assert_eq!(persona.birth_date, NaiveDate::from_ymd_opt(1990, 4, 12).unwrap());

        let json = serde_json::to_value(&persona).unwrap();
        assert_eq!(json["birth_date"], "1990-04-12");
        assert_eq!(json["phone"], "600123456");
    }

    #[test]
    fn test_draft_collects_every_violation() {
        let mut bad = draft();
        bad.name = "A name that is far too long".into();
        bad.phone = "12345".into();
        bad.email = "nope".into();

        let errors = bad.into_persona(today()).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(Field::Name));
        assert!(errors.contains(Field::Phone));
        assert!(errors.contains(Field::Email));
        assert!(!errors.contains(Field::Identifier));
    }

    #[test]
    fn test_draft_from_persona_round_trips_text() {
        let persona = draft().into_persona(today()).unwrap();
        assert_eq!(PersonaDraft::from(&persona), draft());
    }
}
