#![allow(dead_code)]

use chrono::NaiveDate;
use persona_client::{Persona, PersonaId, Phone};

pub fn id(raw: &str) -> PersonaId {
    PersonaId::parse(raw).unwrap()
}

pub fn persona(identifier: &str, name: &str, surname: &str) -> Persona {
    Persona {
        identifier: id(identifier),
        name: name.to_string(),
        surname: surname.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        phone: Phone::parse("600123456").unwrap(),
        birth_date: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
    }
}

pub fn names(snapshot: &persona_client::Snapshot) -> Vec<(String, String)> {
    snapshot
        .iter()
        .map(|p| (p.surname.clone(), p.name.clone()))
        .collect()
}
