
use chrono::{DateTime, Utc};
use diet_engine::{raw::RawDiet, DailyDiet, FoodDraftError};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error(transparent)]
    InvalidFood(#[from] FoodDraftError),
    #[error("invalid patient: {0}")]
    InvalidPatient(String),
    #[error("could not allocate id for {0}")]
    Counter(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn matches(&self, search: &str) -> bool {
        [Some(&self.first_name), Some(&self.last_name), self.email.as_ref()]
            .into_iter()
            .flatten()
        .any(|v| contains_ignore_case(v, search))
    }

    pub fn apply(&mut self, update: PatientUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Err(StoreError::InvalidPatient(format!("no fields to update")));
        }

        if let Some(v) = update.first_name { self.first_name = required("first_name", v)? }
        if let Some(v) = update.last_name { self.last_name = required("last_name", v)? }
        if let Some(v) = update.age { self.age = Some(v) }
        if let Some(v) = update.email { self.email = optional(v) }
        if let Some(v) = update.phone { self.phone = optional(v) }
        if let Some(v) = update.notes { self.notes = optional(v) }
        self.updated_at = Utc::now();
        Ok(())
    }
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

fn required(field: &str, value: String) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        Err(StoreError::InvalidPatient(format!("{field} must not be empty")))
    } else { Ok(value.to_string()) }
}

fn optional(value: String) -> Option<String> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value.to_string()) }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientDraft {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PatientDraft {
    pub fn into_patient(self, id: i64) -> Result<Patient, StoreError> {
        let now = Utc::now();
        Ok(Patient {
            id,
            first_name: required("first_name", self.first_name)?,
            last_name: required("last_name", self.last_name)?,
            age: self.age,
            email: self.email.and_then(optional),
            phone: self.phone.and_then(optional),
            notes: self.notes.and_then(optional),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl PatientUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none()
            && self.age.is_none() && self.email.is_none()
            && self.phone.is_none() && self.notes.is_none()
    }
}

/// A patient together with their saved plan.
#[derive(Debug, Clone, Serialize)]
pub struct PatientDiet {
    pub patient: Patient,
    pub diet: DailyDiet,
}

/// Diet document as read back from the db, shape checked on conversion.
#[derive(Debug, Deserialize)]
pub struct StoredDiet {
    pub patient_id: i64,
    pub diet: RawDiet,
}

#[derive(Debug, Serialize)]
pub struct DietRecord<'a> {
    pub patient_id: i64,
    pub diet: &'a DailyDiet,
    pub updated_at: DateTime<Utc>,
}
