// libs/appointment-cell/src/services/calendar.rs
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{Appointment, SchedulingError};
use crate::services::interval::{saturating_sub, TimeInterval};

/// One doctor's active appointments, ordered by start time.
///
/// This is a plain index: it never checks for conflicts. Callers run the
/// `ConflictResolver` first so that no two entries ever collide under the
/// configured buffer.
#[derive(Debug, Clone)]
pub struct DoctorCalendar {
    doctor_id: Uuid,
    by_start: BTreeMap<(DateTime<Utc>, Uuid), Appointment>,
    starts: HashMap<Uuid, DateTime<Utc>>,
    // Upper bound on any entry's duration; lets range queries seek instead of scanning.
    longest: Duration,
}

impl DoctorCalendar {
    pub fn new(doctor_id: Uuid) -> Self {
        Self {
            doctor_id,
            by_start: BTreeMap::new(),
            starts: HashMap::new(),
            longest: Duration::zero(),
        }
    }

    pub fn doctor_id(&self) -> Uuid {
        self.doctor_id
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    pub fn get(&self, appointment_id: Uuid) -> Option<&Appointment> {
        let start = self.starts.get(&appointment_id)?;
        self.by_start.get(&(*start, appointment_id))
    }

    /// Add an appointment. Re-inserting an id replaces its previous entry.
    pub fn insert(&mut self, appointment: Appointment) {
        if self.starts.contains_key(&appointment.id) {
            // Keys are (start, id); drop the stale key first.
            let _ = self.remove(appointment.id);
        }

        let duration = appointment.end_time() - appointment.start_time;
        if duration > self.longest {
            self.longest = duration;
        }

        self.starts.insert(appointment.id, appointment.start_time);
        self.by_start
            .insert((appointment.start_time, appointment.id), appointment);
    }

    pub fn remove(&mut self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        let start = self
            .starts
            .remove(&appointment_id)
            .ok_or(SchedulingError::NotFound(appointment_id))?;

        self.by_start
            .remove(&(start, appointment_id))
            .ok_or(SchedulingError::NotFound(appointment_id))
    }

    /// Every appointment overlapping `range`, in start order.
    pub fn range_query(&self, range: &TimeInterval) -> Vec<Appointment> {
        self.overlapping(range).cloned().collect()
    }

    /// The appointment occupying `instant`, if any.
    pub fn appointment_at(&self, instant: DateTime<Utc>) -> Option<&Appointment> {
        let earliest = saturating_sub(instant, self.longest);
        self.by_start
            .range((Bound::Included((earliest, Uuid::nil())), Bound::Unbounded))
            .map(|(_, apt)| apt)
            .take_while(|apt| apt.start_time <= instant)
            .find(|apt| apt.interval().contains(instant))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Appointment> {
        self.by_start.values()
    }

    pub(crate) fn overlapping<'a>(&'a self, range: &TimeInterval) -> impl Iterator<Item = &'a Appointment> + 'a {
        let window = *range;
        let earliest = saturating_sub(window.start(), self.longest);

        self.by_start
            .range((Bound::Included((earliest, Uuid::nil())), Bound::Unbounded))
            .map(|(_, apt)| apt)
            .take_while(move |apt| apt.start_time < window.end())
            .filter(move |apt| apt.end_time() > window.start())
    }
}

/// Merge per-doctor query results into one sequence ordered by start time,
/// ties broken by doctor id.
pub fn merge_by_start(per_doctor: Vec<Vec<Appointment>>) -> Vec<Appointment> {
    let mut merged: Vec<Appointment> = per_doctor.into_iter().flatten().collect();
    merged.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.doctor_id.cmp(&b.doctor_id))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}
