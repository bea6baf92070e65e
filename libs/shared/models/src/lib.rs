pub mod activity;
pub mod appointment;
pub mod directory;
pub mod error;

pub use activity::{ActivityCategory, ActivityRecord};
pub use appointment::{
    checked_window_end, window_end, windows_overlap, Appointment, AppointmentStatus, AppointmentType,
    UpcomingAppointment,
};
pub use directory::{DoctorRecord, MedicalRecordEntry, PatientRecord};
pub use error::{ParseEnumError, StoreError};
