// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::JsonRecordStore;

use crate::models::{
    Appointment, AppointmentStatus, CommandOutcome, EntityKind, ScheduleAppointmentRequest,
    SchedulingCommand, SchedulingError, SchedulingPolicy,
};
use crate::services::availability::free_gaps;
use crate::services::calendar::{merge_by_start, DoctorCalendar};
use crate::services::conflict::{ConflictResolver, ConflictResult};
use crate::services::interval::{saturating_add, TimeInterval};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::{
    AppointmentRepository, EntityDirectory, RecordStoreDirectory, RecordStoreRepository,
};

const MAX_SEARCH_HORIZON_DAYS: i64 = 366;

/// One doctor's calendar plus the gate that orders that doctor's writes.
struct DoctorSchedule {
    // Held from validation until the repository answers, so one doctor's
    // saves land in the order they were applied. Readers never take it.
    writes: Mutex<()>,
    calendar: RwLock<DoctorCalendar>,
}

type SharedSchedule = Arc<DoctorSchedule>;

/// Owns every doctor's calendar and all appointment records.
///
/// A mutation checks and applies its change under the doctor's calendar
/// lock, releases it, then persists. A failed save is undone by appointment
/// id. Check-then-insert stays atomic per doctor, other doctors proceed in
/// parallel, and no calendar lock is held across repository I/O. Lock order
/// is write gate, then calendar, then `records`.
pub struct SchedulingService {
    policy: SchedulingPolicy,
    resolver: ConflictResolver,
    lifecycle: AppointmentLifecycleService,
    directory: Arc<dyn EntityDirectory>,
    repository: Arc<dyn AppointmentRepository>,
    schedules: RwLock<HashMap<Uuid, SharedSchedule>>,
    records: RwLock<HashMap<Uuid, Appointment>>,
}

impl SchedulingService {
    pub fn new(
        policy: SchedulingPolicy,
        directory: Arc<dyn EntityDirectory>,
        repository: Arc<dyn AppointmentRepository>,
    ) -> Self {
        Self {
            resolver: ConflictResolver::new(policy.buffer()),
            lifecycle: AppointmentLifecycleService::new(),
            policy,
            directory,
            repository,
            schedules: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Service backed by the JSON record store, with persisted appointments loaded.
    pub async fn from_config(
        config: &AppConfig,
        store: Arc<JsonRecordStore>,
    ) -> Result<Self, SchedulingError> {
        let service = Self::new(
            SchedulingPolicy::from_config(config),
            Arc::new(RecordStoreDirectory::new(Arc::clone(&store))),
            Arc::new(RecordStoreRepository::new(store)),
        );
        service.restore_from_repository().await?;
        Ok(service)
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    // ==============================================================================
    // COMMANDS
    // ==============================================================================

    pub async fn execute(&self, command: SchedulingCommand) -> Result<CommandOutcome, SchedulingError> {
        match command {
            SchedulingCommand::Schedule(request) => {
                self.schedule(request).await.map(CommandOutcome::Scheduled)
            }
            SchedulingCommand::Reschedule {
                appointment_id,
                new_start_time,
                new_duration_minutes,
            } => self
                .reschedule(appointment_id, new_start_time, new_duration_minutes)
                .await
                .map(CommandOutcome::Rescheduled),
            SchedulingCommand::Cancel { appointment_id } => {
                self.cancel(appointment_id).await.map(CommandOutcome::Cancelled)
            }
            SchedulingCommand::Complete { appointment_id } => {
                self.complete(appointment_id).await.map(CommandOutcome::Completed)
            }
        }
    }

    /// Book a new appointment. On conflict nothing is stored.
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, patient_id = %request.patient_id))]
    pub async fn schedule(&self, request: ScheduleAppointmentRequest) -> Result<Appointment, SchedulingError> {
        info!("Scheduling appointment at {} for {} minutes", request.start_time, request.duration_minutes);

        let interval = TimeInterval::starting_at(request.start_time, request.duration_minutes)?;
        self.lifecycle
            .validate_start_time(interval.start(), Utc::now(), self.policy.reject_past_bookings)?;
        self.ensure_exists(EntityKind::Doctor, request.doctor_id).await?;
        self.ensure_exists(EntityKind::Patient, request.patient_id).await?;

        let schedule = self.schedule_for(request.doctor_id).await;
        let _writes = schedule.writes.lock().await;

        let appointment = {
            let mut calendar = schedule.calendar.write().await;
            self.ensure_no_conflict(&calendar, &interval, None)?;

            let now = Utc::now();
            let appointment = Appointment {
                id: Uuid::new_v4(),
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                start_time: interval.start(),
                duration_minutes: request.duration_minutes,
                status: AppointmentStatus::Scheduled,
                notes: request.notes,
                created_at: now,
                updated_at: now,
            };

            calendar.insert(appointment.clone());
            self.records.write().await.insert(appointment.id, appointment.clone());
            appointment
        };

        if let Err(e) = self.repository.save_appointment(&appointment).await {
            error!("Failed to persist appointment {}, rolling back: {}", appointment.id, e);
            self.roll_back(&schedule, appointment.id, None).await;
            return Err(e);
        }

        info!("Appointment {} scheduled with doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }

    /// Move an appointment to a new start (and optionally a new duration).
    /// Identity, doctor and patient never change; on conflict the original
    /// slot stays booked.
    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        new_start_time: DateTime<Utc>,
        new_duration_minutes: Option<i64>,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Rescheduling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id).await?;
        let duration_minutes = new_duration_minutes.unwrap_or(current.duration_minutes);
        let interval = TimeInterval::starting_at(new_start_time, duration_minutes)?;
        self.lifecycle
            .validate_start_time(interval.start(), Utc::now(), self.policy.reject_past_bookings)?;
        self.ensure_exists(EntityKind::Doctor, current.doctor_id).await?;
        self.ensure_exists(EntityKind::Patient, current.patient_id).await?;

        let schedule = self.schedule_for(current.doctor_id).await;
        let _writes = schedule.writes.lock().await;

        // Re-read behind the doctor's write gate; a concurrent cancel may have won.
        let original = self.get_appointment(appointment_id).await?;
        self.lifecycle
            .validate_status_transition(original.status, AppointmentStatus::Scheduled)?;

        let updated = {
            let mut calendar = schedule.calendar.write().await;
            self.ensure_no_conflict(&calendar, &interval, Some(appointment_id))?;

            let updated = Appointment {
                start_time: interval.start(),
                duration_minutes,
                updated_at: Utc::now(),
                ..original.clone()
            };

            calendar.insert(updated.clone());
            self.records.write().await.insert(appointment_id, updated.clone());
            updated
        };

        if let Err(e) = self.repository.save_appointment(&updated).await {
            error!("Failed to persist reschedule of {}, rolling back: {}", appointment_id, e);
            self.roll_back(&schedule, appointment_id, Some(original)).await;
            return Err(e);
        }

        info!(
            "Appointment {} rescheduled to {} ({} minutes)",
            appointment_id, updated.start_time, updated.duration_minutes
        );
        Ok(updated)
    }

    /// Cancel an appointment. The record is kept; only the calendar slot is freed.
    /// Cancelling an already cancelled appointment returns it unchanged.
    #[instrument(skip(self))]
    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Cancelled).await
    }

    /// Mark an appointment as completed, freeing its slot for conflict checks.
    #[instrument(skip(self))]
    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Completed).await
    }

    /// Replace the free-text note. Allowed in every status.
    pub async fn update_note(&self, appointment_id: Uuid, notes: String) -> Result<Appointment, SchedulingError> {
        debug!("Updating note of appointment: {}", appointment_id);

        let doctor_id = self.get_appointment(appointment_id).await?.doctor_id;
        let schedule = self.schedule_for(doctor_id).await;
        let _writes = schedule.writes.lock().await;

        let original = self.get_appointment(appointment_id).await?;
        let updated = Appointment {
            notes,
            updated_at: Utc::now(),
            ..original.clone()
        };

        {
            let mut calendar = schedule.calendar.write().await;
            if updated.is_active() {
                calendar.insert(updated.clone());
            }
            self.records.write().await.insert(appointment_id, updated.clone());
        }

        if let Err(e) = self.repository.save_appointment(&updated).await {
            error!("Failed to persist note of {}, rolling back: {}", appointment_id, e);
            self.roll_back(&schedule, appointment_id, Some(original)).await;
            return Err(e);
        }

        Ok(updated)
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Moving appointment {} to {}", appointment_id, new_status);

        let doctor_id = self.get_appointment(appointment_id).await?.doctor_id;
        let schedule = self.schedule_for(doctor_id).await;
        let _writes = schedule.writes.lock().await;

        let original = self.get_appointment(appointment_id).await?;
        if original.status == AppointmentStatus::Cancelled && new_status == AppointmentStatus::Cancelled {
            info!("Appointment {} is already cancelled", appointment_id);
            return Ok(original);
        }
        self.lifecycle
            .validate_status_transition(original.status, new_status)?;

        let updated = Appointment {
            status: new_status,
            updated_at: Utc::now(),
            ..original.clone()
        };

        {
            let mut calendar = schedule.calendar.write().await;
            let _ = calendar.remove(appointment_id);
            self.records.write().await.insert(appointment_id, updated.clone());
        }

        if let Err(e) = self.repository.save_appointment(&updated).await {
            error!("Failed to persist {} of {}, rolling back: {}", new_status, appointment_id, e);
            self.roll_back(&schedule, appointment_id, Some(original)).await;
            return Err(e);
        }

        info!("Appointment {} is now {}", appointment_id, new_status);
        Ok(updated)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.records
            .read()
            .await
            .get(&appointment_id)
            .cloned()
            .ok_or(SchedulingError::NotFound(appointment_id))
    }

    /// All of a patient's appointments in any status, oldest first.
    pub async fn appointments_for_patient(&self, patient_id: Uuid) -> Vec<Appointment> {
        let mut appointments: Vec<Appointment> = self
            .records
            .read()
            .await
            .values()
            .filter(|apt| apt.patient_id == patient_id)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        appointments
    }

    /// Every appointment record, optionally restricted to one status.
    pub async fn list_by_status(&self, status: Option<AppointmentStatus>) -> Vec<Appointment> {
        let mut appointments: Vec<Appointment> = self
            .records
            .read()
            .await
            .values()
            .filter(|apt| status.map_or(true, |wanted| apt.status == wanted))
            .cloned()
            .collect();
        appointments.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.doctor_id.cmp(&b.doctor_id))
                .then_with(|| a.id.cmp(&b.id))
        });
        appointments
    }

    /// Active appointments of one doctor overlapping `range`, in start order.
    pub async fn list_for_doctor(&self, doctor_id: Uuid, range: &TimeInterval) -> Vec<Appointment> {
        let Some(schedule) = self.existing_schedule(doctor_id).await else {
            return Vec::new();
        };
        let calendar = schedule.calendar.read().await;
        calendar.range_query(range)
    }

    /// Active appointments overlapping `range`, for one doctor or for all of
    /// them (ordered by start, then doctor id).
    pub async fn list_appointments(&self, doctor_id: Option<Uuid>, range: &TimeInterval) -> Vec<Appointment> {
        if let Some(doctor_id) = doctor_id {
            return self.list_for_doctor(doctor_id, range).await;
        }

        let schedules: Vec<SharedSchedule> = self.schedules.read().await.values().cloned().collect();
        let mut per_doctor = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            per_doctor.push(schedule.calendar.read().await.range_query(range));
        }
        merge_by_start(per_doctor)
    }

    /// Every active appointment on `date` across all doctors.
    pub async fn appointments_on(&self, date: NaiveDate) -> Result<Vec<Appointment>, SchedulingError> {
        let day = day_window(date)?;
        Ok(self.list_appointments(None, &day).await)
    }

    /// Free gaps of at least `slot_duration_minutes` in the doctor's working
    /// hours on `date`, in chronological order.
    pub async fn availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot_duration_minutes: i64,
    ) -> Result<Vec<TimeInterval>, SchedulingError> {
        let slot_duration = Duration::try_minutes(slot_duration_minutes)
            .filter(|length| *length > Duration::zero())
            .ok_or(SchedulingError::InvalidInterval)?;

        let window = self.policy.working_window(date)?;
        let booked = self
            .list_for_doctor(doctor_id, &window.widened(self.resolver.buffer()))
            .await;

        Ok(free_gaps(
            &window,
            &booked,
            self.resolver.buffer(),
            slot_duration,
        ))
    }

    /// The appointment the doctor is in at `instant`, if any.
    pub async fn appointment_at(&self, doctor_id: Uuid, instant: DateTime<Utc>) -> Option<Appointment> {
        let schedule = self.existing_schedule(doctor_id).await?;
        let calendar = schedule.calendar.read().await;
        calendar.appointment_at(instant).cloned()
    }

    pub async fn is_doctor_busy(&self, doctor_id: Uuid, instant: DateTime<Utc>) -> bool {
        self.appointment_at(doctor_id, instant).await.is_some()
    }

    /// Earliest bookable slot of `duration_minutes` starting no earlier than
    /// `not_before`, inside working hours and within the search horizon.
    pub async fn next_available_slot(
        &self,
        doctor_id: Uuid,
        not_before: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<Option<TimeInterval>, SchedulingError> {
        TimeInterval::starting_at(not_before, duration_minutes)?;

        let first_day = not_before.date_naive();
        let horizon_days = self
            .policy
            .slot_search_horizon_days
            .clamp(1, MAX_SEARCH_HORIZON_DAYS);
        let mut windows = Vec::new();
        for offset in 0..horizon_days {
            let date = Duration::try_days(offset).and_then(|days| first_day.checked_add_signed(days));
            if let Some(date) = date {
                windows.push(self.policy.working_window(date)?);
            }
        }
        let (Some(first), Some(last)) = (windows.first().copied(), windows.last().copied()) else {
            return Ok(None);
        };
        let search_start = first.start().min(not_before);
        if search_start >= last.end() {
            return Ok(None);
        }
        let search = TimeInterval::new(search_start, last.end())?;

        let shared = self.existing_schedule(doctor_id).await;
        let guard = match &shared {
            Some(schedule) => Some(schedule.calendar.read().await),
            None => None,
        };
        let empty = DoctorCalendar::new(doctor_id);
        let calendar = guard.as_deref().unwrap_or(&empty);

        let buffer = self.resolver.buffer();
        let mut candidates = vec![not_before];
        candidates.extend(windows.iter().map(|w| w.start()));
        candidates.extend(
            calendar
                .range_query(&search.widened(buffer))
                .iter()
                .map(|apt| saturating_add(apt.end_time(), buffer)),
        );
        candidates.retain(|start| *start >= not_before);

        let slot = self.resolver.first_available(calendar, candidates, duration_minutes, |slot| {
            windows
                .iter()
                .any(|w| slot.start() >= w.start() && slot.end() <= w.end())
        });

        debug!("Next available slot for doctor {} after {}: {:?}", doctor_id, not_before, slot);
        Ok(slot)
    }

    // ==============================================================================
    // STARTUP
    // ==============================================================================

    /// Rebuild calendars from persisted records. Returns how many active
    /// appointments were indexed.
    pub async fn restore_from_repository(&self) -> Result<usize, SchedulingError> {
        let appointments = self.repository.load_appointments().await?;
        Ok(self.restore(appointments).await)
    }

    /// Load existing records. Active records that are malformed or collide
    /// with an already indexed booking stay in history but are kept out of the
    /// calendar.
    pub async fn restore(&self, mut appointments: Vec<Appointment>) -> usize {
        appointments.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        let mut indexed = 0;
        for appointment in appointments {
            if appointment.is_active() {
                if let Err(e) = appointment.try_interval() {
                    warn!("Appointment {} has an unusable duration ({}), not indexing it", appointment.id, e);
                } else {
                    let schedule = self.schedule_for(appointment.doctor_id).await;
                    let mut calendar = schedule.calendar.write().await;
                    match self.resolver.check(&calendar, &appointment.interval(), Some(appointment.id)) {
                        ConflictResult::NoConflict => {
                            calendar.insert(appointment.clone());
                            indexed += 1;
                        }
                        ConflictResult::Conflict(existing) => {
                            warn!(
                                "Stored appointment {} collides with {}, not indexing it",
                                appointment.id, existing.id
                            );
                        }
                    }
                }
            }
            self.records.write().await.insert(appointment.id, appointment);
        }

        info!("Restored appointments, {} active in calendars", indexed);
        indexed
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn ensure_exists(&self, kind: EntityKind, id: Uuid) -> Result<(), SchedulingError> {
        if self.directory.resolve(kind, id).await? {
            Ok(())
        } else {
            warn!("Unknown {} {}", kind, id);
            Err(SchedulingError::UnknownEntity { kind, id })
        }
    }

    fn ensure_no_conflict(
        &self,
        calendar: &DoctorCalendar,
        interval: &TimeInterval,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), SchedulingError> {
        match self.resolver.check(calendar, interval, exclude_appointment_id) {
            ConflictResult::NoConflict => Ok(()),
            ConflictResult::Conflict(existing) => {
                Err(SchedulingError::Conflict(Box::new(existing.conflict_details())))
            }
        }
    }

    /// Undo an applied change after its save failed: put `original` back, or
    /// forget the appointment entirely when it was new.
    async fn roll_back(&self, schedule: &DoctorSchedule, appointment_id: Uuid, original: Option<Appointment>) {
        let mut calendar = schedule.calendar.write().await;
        let mut records = self.records.write().await;
        match original {
            Some(original) => {
                if original.is_active() {
                    calendar.insert(original.clone());
                } else {
                    let _ = calendar.remove(appointment_id);
                }
                records.insert(appointment_id, original);
            }
            None => {
                let _ = calendar.remove(appointment_id);
                records.remove(&appointment_id);
            }
        }
    }

    async fn existing_schedule(&self, doctor_id: Uuid) -> Option<SharedSchedule> {
        self.schedules.read().await.get(&doctor_id).cloned()
    }

    async fn schedule_for(&self, doctor_id: Uuid) -> SharedSchedule {
        if let Some(schedule) = self.existing_schedule(doctor_id).await {
            return schedule;
        }
        Arc::clone(self.schedules.write().await.entry(doctor_id).or_insert_with(|| {
            Arc::new(DoctorSchedule {
                writes: Mutex::new(()),
                calendar: RwLock::new(DoctorCalendar::new(doctor_id)),
            })
        }))
    }
}

fn day_window(date: NaiveDate) -> Result<TimeInterval, SchedulingError> {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    TimeInterval::starting_at(start, 24 * 60)
}
