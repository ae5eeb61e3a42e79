pub mod interval;
pub mod calendar;
pub mod conflict;
pub mod lifecycle;
pub mod availability;
pub mod store;
pub mod booking;

pub use interval::TimeInterval;
pub use calendar::DoctorCalendar;
pub use conflict::{ConflictResolver, ConflictResult};
pub use lifecycle::AppointmentLifecycleService;
pub use store::{AppointmentRepository, EntityDirectory, RecordStoreDirectory, RecordStoreRepository};
pub use booking::SchedulingService;
