use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityCategory {
    Appointment,
    MedicalRecord,
    Patient,
    Doctor,
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityCategory::Appointment => write!(f, "APPOINTMENT"),
            ActivityCategory::MedicalRecord => write!(f, "MEDICAL_RECORD"),
            ActivityCategory::Patient => write!(f, "PATIENT"),
            ActivityCategory::Doctor => write!(f, "DOCTOR"),
        }
    }
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub category: ActivityCategory,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(category: ActivityCategory, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            title: title.into(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}
