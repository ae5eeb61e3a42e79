// libs/appointment-cell/src/services/conflict.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::Appointment;
use crate::services::calendar::DoctorCalendar;
use crate::services::interval::TimeInterval;

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResult {
    NoConflict,
    /// The earliest-starting booking that collides with the proposal.
    Conflict(Appointment),
}

impl ConflictResult {
    pub fn has_conflict(&self) -> bool {
        matches!(self, ConflictResult::Conflict(_))
    }
}

/// Decides whether a proposed interval fits into a doctor's calendar.
///
/// The resolver is read-only: it never touches the calendar it inspects.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    buffer: Duration,
}

impl ConflictResolver {
    pub fn new(buffer: Duration) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// Check `proposed` against every active booking in `calendar`, ignoring
    /// `exclude_appointment_id` so a reschedule does not collide with itself.
    pub fn check(
        &self,
        calendar: &DoctorCalendar,
        proposed: &TimeInterval,
        exclude_appointment_id: Option<Uuid>,
    ) -> ConflictResult {
        debug!(
            "Checking conflicts for doctor {} from {} to {}",
            calendar.doctor_id(),
            proposed.start(),
            proposed.end()
        );

        // Widening by the buffer turns a plain range query into the buffered overlap test.
        let search_window = proposed.widened(self.buffer);

        let conflicting = calendar
            .overlapping(&search_window)
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .find(|apt| apt.interval().overlaps(proposed, self.buffer));

        match conflicting {
            Some(existing) => {
                warn!(
                    "Conflict detected for doctor {} with appointment {} at {}",
                    calendar.doctor_id(),
                    existing.id,
                    existing.start_time
                );
                ConflictResult::Conflict(existing.clone())
            }
            None => ConflictResult::NoConflict,
        }
    }

    /// Return the earliest conflict-free slot among `candidates`.
    ///
    /// Candidates are tried in ascending order; `fits` filters out starts the
    /// caller cannot use (outside working hours, past the search horizon).
    pub fn first_available<I, F>(
        &self,
        calendar: &DoctorCalendar,
        candidates: I,
        duration_minutes: i64,
        fits: F,
    ) -> Option<TimeInterval>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
        F: Fn(&TimeInterval) -> bool,
    {
        let mut starts: Vec<DateTime<Utc>> = candidates.into_iter().collect();
        starts.sort();
        starts.dedup();

        starts
            .into_iter()
            .filter_map(|start| TimeInterval::starting_at(start, duration_minutes).ok())
            .filter(|slot| fits(slot))
            .find(|slot| !self.check(calendar, slot, None).has_conflict())
    }
}
