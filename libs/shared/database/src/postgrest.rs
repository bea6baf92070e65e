// libs/shared/database/src/postgrest.rs
//
// Store backed by Supabase's PostgREST API. Reads are plain REST queries.
// Writes are buffered in the unit of work and shipped in one call to the
// `commit_scheduling_unit` database function, which applies them inside a
// single transaction and enforces the doctor/slot exclusion constraint
// (HTTP 409 on violation).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    ActivityRecord, Appointment, AppointmentStatus, StoreError, UpcomingAppointment,
};

use crate::memory::{UNKNOWN_DOCTOR, UNKNOWN_PATIENT};
use crate::store::{ClinicStore, UnitOfWork, UpcomingQuery};
use crate::supabase::{SupabaseApiError, SupabaseClient};

pub const COMMIT_FUNCTION: &str = "commit_scheduling_unit";

pub struct SupabaseClinicStore {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseClinicStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    fn token(&self) -> Option<&str> {
        Some(self.service_key.as_str())
    }
}

/// RFC 3339 with a `Z` suffix, so the value needs no escaping in a query string.
fn query_time(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn map_api_error(err: anyhow::Error) -> StoreError {
    if let Some(api) = err.downcast_ref::<SupabaseApiError>() {
        return match api.status {
            StatusCode::CONFLICT => StoreError::Conflict(api.message.clone()),
            StatusCode::NOT_FOUND => StoreError::NotFound(api.message.clone()),
            _ => StoreError::Database(api.to_string()),
        };
    }
    StoreError::Database(err.to_string())
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(StoreError::from)
}

async fn fetch_appointment(
    supabase: &SupabaseClient,
    token: Option<&str>,
    id: Uuid,
) -> Result<Option<Appointment>, StoreError> {
    let path = format!("/rest/v1/appointments?id=eq.{}", id);
    let rows: Vec<Value> = supabase.request(Method::GET, &path, token, None)
        .await
        .map_err(map_api_error)?;
    Ok(parse_rows::<Appointment>(rows)?.into_iter().next())
}

async fn row_exists(
    supabase: &SupabaseClient,
    token: Option<&str>,
    table: &str,
    id: Uuid,
) -> Result<bool, StoreError> {
    let path = format!("/rest/v1/{}?id=eq.{}&select=id", table, id);
    let rows: Vec<Value> = supabase.request(Method::GET, &path, token, None)
        .await
        .map_err(map_api_error)?;
    Ok(!rows.is_empty())
}

#[derive(Debug, Deserialize)]
struct NameRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UpcomingRow {
    id: Uuid,
    scheduled_start_time: DateTime<Utc>,
    status: AppointmentStatus,
    patient: Option<NameRef>,
    doctor: Option<NameRef>,
}

impl From<UpcomingRow> for UpcomingAppointment {
    fn from(row: UpcomingRow) -> Self {
        Self {
            id: row.id,
            patient_name: row.patient.map(|p| p.name).unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
            doctor_name: row.doctor.map(|d| d.name).unwrap_or_else(|| UNKNOWN_DOCTOR.to_string()),
            scheduled_start_time: row.scheduled_start_time,
            status: row.status,
        }
    }
}

#[async_trait]
impl ClinicStore for SupabaseClinicStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(SupabaseUnitOfWork {
            supabase: Arc::clone(&self.supabase),
            service_key: self.service_key.clone(),
            inserts: Vec::new(),
            updates: Vec::new(),
            activities: Vec::new(),
        }))
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        fetch_appointment(&self.supabase, self.token(), id).await
    }

    async fn count_appointments(&self) -> Result<u64, StoreError> {
        self.supabase.count("/rest/v1/appointments?select=id&limit=1", self.token())
            .await
            .map_err(map_api_error)
    }

    async fn count_patients(&self) -> Result<u64, StoreError> {
        self.supabase.count("/rest/v1/patients?select=id&limit=1", self.token())
            .await
            .map_err(map_api_error)
    }

    async fn count_doctors(&self) -> Result<u64, StoreError> {
        self.supabase.count("/rest/v1/doctors?select=id&limit=1", self.token())
            .await
            .map_err(map_api_error)
    }

    async fn count_medical_records(&self) -> Result<u64, StoreError> {
        self.supabase.count("/rest/v1/medical_records?select=id&limit=1", self.token())
            .await
            .map_err(map_api_error)
    }

    async fn list_upcoming_appointments(
        &self,
        query: UpcomingQuery,
    ) -> Result<Vec<UpcomingAppointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?select=id,scheduled_start_time,status,patient:patients(name),doctor:doctors(name)\
             &status=in.(scheduled,confirmed)\
             &scheduled_start_time=gte.{}&scheduled_start_time=lte.{}\
             &order=scheduled_start_time.asc&limit={}",
            query_time(query.from),
            query_time(query.until),
            query.limit,
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, self.token(), None)
            .await
            .map_err(map_api_error)?;

        Ok(parse_rows::<UpcomingRow>(rows)?
            .into_iter()
            .map(UpcomingAppointment::from)
            .collect())
    }

    async fn list_recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let path = format!("/rest/v1/activities?order=timestamp.desc&limit={}", limit);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, self.token(), None)
            .await
            .map_err(map_api_error)?;
        parse_rows(rows)
    }
}

pub struct SupabaseUnitOfWork {
    supabase: Arc<SupabaseClient>,
    service_key: String,
    inserts: Vec<Appointment>,
    updates: Vec<Appointment>,
    activities: Vec<ActivityRecord>,
}

impl SupabaseUnitOfWork {
    fn token(&self) -> Option<&str> {
        Some(self.service_key.as_str())
    }

    fn staged(&self, id: Uuid) -> Option<&Appointment> {
        self.updates.iter().rev()
            .chain(self.inserts.iter().rev())
            .find(|apt| apt.id == id)
    }
}

#[async_trait]
impl UnitOfWork for SupabaseUnitOfWork {
    async fn get_appointment(&mut self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        if let Some(apt) = self.staged(id) {
            return Ok(Some(apt.clone()));
        }
        fetch_appointment(&self.supabase, self.token(), id).await
    }

    async fn list_appointments_by_doctor_and_window(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        // `scheduled_end_time` is a generated column on the appointments table.
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&scheduled_start_time=lt.{}&scheduled_end_time=gt.{}&order=scheduled_start_time.asc",
            doctor_id,
            query_time(end),
            query_time(start),
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, self.token(), None)
            .await
            .map_err(map_api_error)?;

        let mut appointments: Vec<Appointment> = parse_rows::<Appointment>(rows)?
            .into_iter()
            .filter(|apt| self.staged(apt.id).is_none())
            .collect();
        appointments.extend(
            self.inserts.iter()
                .chain(self.updates.iter())
                .filter(|apt| apt.doctor_id == doctor_id && apt.overlaps(start, end))
                .cloned(),
        );
        Ok(appointments)
    }

    async fn patient_exists(&mut self, patient_id: Uuid) -> Result<bool, StoreError> {
        row_exists(&self.supabase, self.token(), "patients", patient_id).await
    }

    async fn doctor_exists(&mut self, doctor_id: Uuid) -> Result<bool, StoreError> {
        row_exists(&self.supabase, self.token(), "doctors", doctor_id).await
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        self.inserts.push(appointment.clone());
        Ok(())
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        if let Some(pending) = self.inserts.iter_mut().find(|apt| apt.id == appointment.id) {
            *pending = appointment.clone();
            return Ok(());
        }
        self.updates.retain(|apt| apt.id != appointment.id);
        self.updates.push(appointment.clone());
        Ok(())
    }

    async fn insert_activity(&mut self, activity: &ActivityRecord) -> Result<(), StoreError> {
        self.activities.push(activity.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let args = json!({
            "appointment_inserts": self.inserts,
            "appointment_updates": self.updates,
            "activities": self.activities,
        });

        let result: Result<Value, _> = self.supabase.rpc(COMMIT_FUNCTION, self.token(), args).await;
        match result {
            Ok(_) => {
                info!("Committed scheduling unit: {} inserts, {} updates, {} activities",
                      self.inserts.len(), self.updates.len(), self.activities.len());
                Ok(())
            }
            Err(e) => {
                error!("Scheduling unit commit failed: {}", e);
                match map_api_error(e) {
                    StoreError::Conflict(msg) => Err(StoreError::Conflict(msg)),
                    other => Err(StoreError::Transaction(other.to_string())),
                }
            }
        }
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Nothing has left the process yet.
        debug!("Discarding scheduling unit with {} inserts and {} updates",
               self.inserts.len(), self.updates.len());
        Ok(())
    }
}
