// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::fmt;

use shared_config::AppConfig;

use crate::services::interval::TimeInterval;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Saturates at the latest representable instant for out-of-range durations.
    pub fn end_time(&self) -> DateTime<Utc> {
        Duration::try_minutes(self.duration_minutes)
            .and_then(|length| self.start_time.checked_add_signed(length))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The booked `[start, end)` span. Calendars only index appointments
    /// that passed `try_interval`.
    pub fn interval(&self) -> TimeInterval {
        TimeInterval::from_trusted(self.start_time, self.end_time())
    }

    /// Checked span: fails for non-positive or out-of-range durations.
    pub fn try_interval(&self) -> Result<TimeInterval, SchedulingError> {
        TimeInterval::starting_at(self.start_time, self.duration_minutes)
    }

    /// Only scheduled appointments occupy a doctor's calendar.
    pub fn is_active(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }

    pub fn conflict_details(&self) -> ConflictDetails {
        ConflictDetails {
            appointment_id: self.id,
            doctor_id: self.doctor_id,
            start_time: self.start_time,
            end_time: self.end_time(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Doctor,
    Patient,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Doctor => write!(f, "doctor"),
            EntityKind::Patient => write!(f, "patient"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
    /// Keeps the current duration when omitted.
    pub new_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
    pub notes: String,
}

/// Every state-changing operation the scheduling engine accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SchedulingCommand {
    Schedule(ScheduleAppointmentRequest),
    Reschedule {
        appointment_id: Uuid,
        new_start_time: DateTime<Utc>,
        new_duration_minutes: Option<i64>,
    },
    Cancel { appointment_id: Uuid },
    Complete { appointment_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", content = "appointment", rename_all = "snake_case")]
pub enum CommandOutcome {
    Scheduled(Appointment),
    Rescheduled(Appointment),
    Cancelled(Appointment),
    Completed(Appointment),
}

impl CommandOutcome {
    pub fn appointment(&self) -> &Appointment {
        match self {
            CommandOutcome::Scheduled(apt)
            | CommandOutcome::Rescheduled(apt)
            | CommandOutcome::Cancelled(apt)
            | CommandOutcome::Completed(apt) => apt,
        }
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

/// Enough of the colliding booking to tell the caller where the clash is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictDetails {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl fmt::Display for ConflictDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "appointment {} at {}-{} on {}",
            self.appointment_id,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M"),
            self.start_time.format("%Y-%m-%d"),
        )
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid interval: end must be after start")]
    InvalidInterval,

    #[error("Unknown {kind}: {id}")]
    UnknownEntity { kind: EntityKind, id: Uuid },

    #[error("Appointment conflicts with {0}")]
    Conflict(Box<ConflictDetails>),

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Entity store error: {0}")]
    EntityStore(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

// ==============================================================================
// SCHEDULING POLICY
// ==============================================================================

const MAX_BUFFER_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingPolicy {
    /// Gap kept on both sides of every booking for the same doctor.
    pub buffer_minutes: i64,
    pub working_day_start: NaiveTime,
    pub working_day_end: NaiveTime,
    pub slot_search_horizon_days: i64,
    pub reject_past_bookings: bool,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            buffer_minutes: 30,
            working_day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            working_day_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_search_horizon_days: 14,
            reject_past_bookings: false,
        }
    }
}

impl SchedulingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            buffer_minutes: config.buffer_minutes.clamp(0, MAX_BUFFER_MINUTES),
            working_day_start: config.working_day_start,
            working_day_end: config.working_day_end,
            slot_search_horizon_days: config.slot_search_horizon_days.max(1),
            reject_past_bookings: config.reject_past_bookings,
        }
    }

    pub fn buffer(&self) -> Duration {
        Duration::try_minutes(self.buffer_minutes.clamp(0, MAX_BUFFER_MINUTES)).unwrap_or_else(Duration::zero)
    }

    /// Working hours of `date` as a UTC interval.
    pub fn working_window(&self, date: NaiveDate) -> Result<TimeInterval, SchedulingError> {
        TimeInterval::new(
            date.and_time(self.working_day_start).and_utc(),
            date.and_time(self.working_day_end).and_utc(),
        )
    }
}
