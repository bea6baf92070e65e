// libs/shared/models/src/appointment.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParseEnumError;

// ==============================================================================
// CORE APPOINTMENT MODEL
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_type: AppointmentType,
    pub scheduled_start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub location: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub patient_history: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// End of the half-open window `[start, start + duration)`.
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        window_end(self.scheduled_start_time, self.duration_minutes)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        windows_overlap(self.scheduled_start_time, self.scheduled_end_time(), start, end)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// End instant of a window, or `None` when it falls outside the representable range.
pub fn checked_window_end(start: DateTime<Utc>, duration_minutes: i32) -> Option<DateTime<Utc>> {
    start.checked_add_signed(Duration::minutes(i64::from(duration_minutes)))
}

/// Saturates at the bounds of `DateTime<Utc>`. Callers that accept input
/// validate with [`checked_window_end`] first.
pub fn window_end(start: DateTime<Utc>, duration_minutes: i32) -> DateTime<Utc> {
    checked_window_end(start, duration_minutes).unwrap_or(if duration_minutes < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Half-open interval intersection: `start1 < end2 && start2 < end1`.
/// Back-to-back windows do not overlap.
pub fn windows_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

// ==============================================================================
// STATUS AND TYPE ENUMS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    /// Active appointments hold their window and take part in conflict checks.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::new("appointment status", value))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    #[serde(alias = "checkup", alias = "check_up")]
    CheckUp,
    #[serde(alias = "followup", alias = "follow_up")]
    FollowUp,
    Consultation,
    Procedure,
    Emergency,
}

impl AppointmentType {
    pub const ALL: [AppointmentType; 5] = [
        AppointmentType::CheckUp,
        AppointmentType::FollowUp,
        AppointmentType::Consultation,
        AppointmentType::Procedure,
        AppointmentType::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::CheckUp => "check-up",
            AppointmentType::FollowUp => "follow-up",
            AppointmentType::Consultation => "consultation",
            AppointmentType::Procedure => "procedure",
            AppointmentType::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentType {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        let normalized = match normalized.as_str() {
            "checkup" => "check-up".to_string(),
            "followup" => "follow-up".to_string(),
            _ => normalized,
        };
        AppointmentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::new("appointment type", value))
    }
}

// ==============================================================================
// READ MODELS
// ==============================================================================

/// Upcoming booking annotated with display names, as listed on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpcomingAppointment {
    pub id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub scheduled_start_time: DateTime<Utc>,
    pub status: AppointmentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_back_to_back_windows_do_not_overlap() {
        assert!(!windows_overlap(at(10, 0), at(10, 30), at(10, 30), at(11, 0)));
        assert!(!windows_overlap(at(10, 30), at(11, 0), at(10, 0), at(10, 30)));
    }

    #[test]
    fn test_window_starting_earlier_and_extending_in_overlaps() {
        // Existing 09:45-10:15 against a new 10:00-10:30 window.
        assert!(windows_overlap(at(9, 45), at(10, 15), at(10, 0), at(10, 30)));
        // Containment in both directions.
        assert!(windows_overlap(at(9, 0), at(12, 0), at(10, 0), at(10, 30)));
        assert!(windows_overlap(at(10, 5), at(10, 10), at(10, 0), at(10, 30)));
    }

    #[test]
    fn test_window_end_past_the_representable_range() {
        let late = DateTime::<Utc>::MAX_UTC - Duration::minutes(10);
        assert_eq!(checked_window_end(late, 30), None);
        assert_eq!(window_end(late, 30), DateTime::<Utc>::MAX_UTC);
        assert_eq!(checked_window_end(at(10, 0), 30), Some(at(10, 30)));
    }

    #[test]
    fn test_status_parsing_accepts_any_case() {
        assert_eq!("Scheduled".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::Scheduled);
        assert_eq!(" cancelled ".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::Cancelled);
        let err = "postponed".parse::<AppointmentStatus>().unwrap_err();
        assert_eq!(err.value, "postponed");
    }

    #[test]
    fn test_type_parsing_and_wire_format() {
        assert_eq!("check-up".parse::<AppointmentType>().unwrap(), AppointmentType::CheckUp);
        assert_eq!("follow_up".parse::<AppointmentType>().unwrap(), AppointmentType::FollowUp);
        assert!("surgery".parse::<AppointmentType>().is_err());

        let json = serde_json::to_string(&AppointmentType::CheckUp).unwrap();
        assert_eq!(json, "\"check-up\"");
        let status = serde_json::to_string(&AppointmentStatus::Confirmed).unwrap();
        assert_eq!(status, "\"confirmed\"");
    }

    #[test]
    fn test_only_scheduled_and_confirmed_are_active() {
        let active: Vec<_> = AppointmentStatus::ALL.into_iter().filter(|s| s.is_active()).collect();
        assert_eq!(active, vec![AppointmentStatus::Scheduled, AppointmentStatus::Confirmed]);
    }
}
