use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, SchedulingService};

pub fn create_router(service: Arc<SchedulingService>) -> Router {
    Router::new()
        .route("/", get(|| async { "Hospital scheduling API is running!" }))
        .nest("/appointments", appointment_routes(service))
}
