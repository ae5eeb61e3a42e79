// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::handlers;
use crate::services::booking::SchedulingService;

pub fn appointment_routes(service: Arc<SchedulingService>) -> Router {
    Router::new()
        // Scheduling commands
        .route("/", post(handlers::schedule_appointment).get(handlers::list_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/{appointment_id}/note", patch(handlers::update_appointment_note))

        // Listings
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_appointments))
        .route("/day/{date}", get(handlers::get_day_appointments))

        // Availability
        .route("/doctors/{doctor_id}/availability", get(handlers::get_doctor_availability))
        .route("/doctors/{doctor_id}/next-slot", get(handlers::get_next_available_slot))
        .route("/doctors/{doctor_id}/busy", get(handlers::get_doctor_busy))

        .with_state(service)
}
