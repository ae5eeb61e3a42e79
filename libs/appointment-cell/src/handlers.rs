// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AppointmentStatus, RescheduleAppointmentRequest, ScheduleAppointmentRequest, SchedulingCommand,
    SchedulingError, UpdateNoteRequest,
};
use crate::services::booking::SchedulingService;
use crate::services::interval::TimeInterval;

pub type SchedulingState = Arc<SchedulingService>;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusFilterQuery {
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub slot_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NextSlotQuery {
    pub not_before: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Deserialize)]
pub struct BusyQuery {
    pub at: DateTime<Utc>,
}

const DEFAULT_SLOT_MINUTES: i64 = 30;

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Conflict(details) => AppError::Conflict {
                message: format!("Appointment conflicts with {}", details),
                details: json!(details),
            },
            SchedulingError::NotFound(_) => AppError::NotFound(err.to_string()),
            SchedulingError::UnknownEntity { .. } => AppError::BadRequest(err.to_string()),
            SchedulingError::InvalidInterval
            | SchedulingError::InvalidTime(_)
            | SchedulingError::InvalidStatusTransition { .. } => AppError::ValidationError(err.to_string()),
            SchedulingError::EntityStore(msg) => AppError::Internal(msg),
            SchedulingError::Persistence(msg) => AppError::Persistence(msg),
        }
    }
}

// ==============================================================================
// SCHEDULING COMMAND HANDLERS
// ==============================================================================

pub async fn schedule_appointment(
    State(service): State<SchedulingState>,
    Json(request): Json<ScheduleAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = service.execute(SchedulingCommand::Schedule(request)).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": outcome.appointment(),
            "message": "Appointment scheduled successfully"
        })),
    ))
}

pub async fn reschedule_appointment(
    State(service): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = service
        .execute(SchedulingCommand::Reschedule {
            appointment_id,
            new_start_time: request.new_start_time,
            new_duration_minutes: request.new_duration_minutes,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment(),
        "message": "Appointment rescheduled successfully"
    })))
}

pub async fn cancel_appointment(
    State(service): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let outcome = service
        .execute(SchedulingCommand::Cancel { appointment_id })
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment(),
        "message": "Appointment cancelled successfully"
    })))
}

pub async fn complete_appointment(
    State(service): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let outcome = service
        .execute(SchedulingCommand::Complete { appointment_id })
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment(),
        "message": "Appointment completed"
    })))
}

pub async fn update_appointment_note(
    State(service): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateNoteRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.update_note(appointment_id, request.notes).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

// ==============================================================================
// QUERY HANDLERS
// ==============================================================================

pub async fn get_appointment(
    State(service): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

pub async fn list_appointments(
    State(service): State<SchedulingState>,
    Query(query): Query<StatusFilterQuery>,
) -> Json<Value> {
    let appointments = service.list_by_status(query.status).await;
    Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    }))
}

pub async fn get_patient_appointments(
    State(service): State<SchedulingState>,
    Path(patient_id): Path<Uuid>,
) -> Json<Value> {
    let appointments = service.appointments_for_patient(patient_id).await;
    Json(json!({
        "patient_id": patient_id,
        "appointments": appointments,
        "total": appointments.len()
    }))
}

pub async fn get_doctor_appointments(
    State(service): State<SchedulingState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let range = TimeInterval::new(query.from, query.to)?;
    let appointments = service.list_for_doctor(doctor_id, &range).await;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "appointments": appointments,
        "total": appointments.len()
    })))
}

pub async fn get_doctor_availability(
    State(service): State<SchedulingState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let slot_minutes = query.slot_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
    let gaps = service.availability(doctor_id, query.date, slot_minutes).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slot_minutes": slot_minutes,
        "available": gaps
    })))
}

pub async fn get_next_available_slot(
    State(service): State<SchedulingState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<NextSlotQuery>,
) -> Result<Json<Value>, AppError> {
    let slot = service
        .next_available_slot(doctor_id, query.not_before, query.duration_minutes)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "slot": slot
    })))
}

pub async fn get_doctor_busy(
    State(service): State<SchedulingState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<BusyQuery>,
) -> Json<Value> {
    let current = service.appointment_at(doctor_id, query.at).await;
    Json(json!({
        "doctor_id": doctor_id,
        "at": query.at,
        "busy": current.is_some(),
        "appointment": current
    }))
}

pub async fn get_day_appointments(
    State(service): State<SchedulingState>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<Value>, AppError> {
    let appointments = service.appointments_on(date).await?;
    Ok(Json(json!({
        "date": date,
        "appointments": appointments,
        "total": appointments.len()
    })))
}
