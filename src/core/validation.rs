//! Synchronous field validators.
//!
//! These run locally and never touch the network; a failure here blocks
//! submission through the form gate.

use super::error::{FieldErrorKind, FieldValidationError};
use super::types::{Field, NAME_MAX_LEN};
use chrono::NaiveDate;
use regex::Regex;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const EMAIL_MAX_LEN: usize = 254;
const EMAIL_LOCAL_MAX_LEN: usize = 64;

lazy_static::lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(
        r"^[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .expect("email pattern is valid");
}

fn reject(field: Field, kind: FieldErrorKind) -> FieldValidationError {
    FieldValidationError::new(field, kind)
}

/// Non-empty after trimming surrounding whitespace.
pub fn required(field: Field, raw: &str) -> Result<&str, FieldValidationError> {
    if raw.trim().is_empty() {
        return Err(reject(field, FieldErrorKind::Required));
    }
    Ok(raw)
}

/// Exactly `len` ASCII digits.
pub fn fixed_digits<'a>(
    field: Field,
    raw: &'a str,
    len: usize,
    expected: &'static str,
) -> Result<&'a str, FieldValidationError> {
    if raw.is_empty() {
        return Err(reject(field, FieldErrorKind::Required));
    }
    if raw.len() != len || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(reject(field, FieldErrorKind::Pattern { expected }));
    }
    Ok(raw)
}

pub fn name(raw: &str) -> Result<&str, FieldValidationError> {
    let value = required(Field::Name, raw)?;
    if value.chars().count() > NAME_MAX_LEN {
        return Err(reject(Field::Name, FieldErrorKind::TooLong { max: NAME_MAX_LEN }));
    }
    Ok(value)
}

pub fn email(raw: &str) -> Result<&str, FieldValidationError> {
    let value = required(Field::Email, raw)?;
    let local_len = value.split('@').next().map(str::len).unwrap_or(0);
    if value.len() > EMAIL_MAX_LEN || local_len > EMAIL_LOCAL_MAX_LEN || !EMAIL_RE.is_match(value) {
        return Err(reject(Field::Email, FieldErrorKind::InvalidEmail));
    }
    Ok(value)
}

/// Fixed-width `YYYY-MM-DD` calendar date.
pub fn calendar_date(raw: &str) -> Result<NaiveDate, FieldValidationError> {
    let value = required(Field::BirthDate, raw)?;
    if value.len() != 10 || !value.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(reject(Field::BirthDate, FieldErrorKind::InvalidDate));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| reject(Field::BirthDate, FieldErrorKind::InvalidDate))
}

/// Fixed-width `YYYY-MM-DD`, not later than `today`.
pub fn birth_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, FieldValidationError> {
    let date = calendar_date(raw)?;
    if date > today {
        return Err(reject(Field::BirthDate, FieldErrorKind::FutureDate));
    }
    Ok(date)
}
