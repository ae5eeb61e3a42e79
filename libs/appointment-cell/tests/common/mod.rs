// libs/appointment-cell/tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Mutex, Notify, RwLock};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, EntityKind, ScheduleAppointmentRequest, SchedulingError, SchedulingPolicy,
};
use appointment_cell::services::{AppointmentRepository, EntityDirectory, SchedulingService};

// ==============================================================================
// IN-MEMORY FAKES
// ==============================================================================

#[derive(Default)]
pub struct InMemoryDirectory {
    doctors: RwLock<HashSet<Uuid>>,
    patients: RwLock<HashSet<Uuid>>,
}

impl InMemoryDirectory {
    pub async fn add_doctor(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.doctors.write().await.insert(id);
        id
    }

    pub async fn add_patient(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.patients.write().await.insert(id);
        id
    }
}

#[async_trait]
impl EntityDirectory for InMemoryDirectory {
    async fn resolve(&self, kind: EntityKind, id: Uuid) -> Result<bool, SchedulingError> {
        Ok(match kind {
            EntityKind::Doctor => self.doctors.read().await.contains(&id),
            EntityKind::Patient => self.patients.read().await.contains(&id),
        })
    }
}

/// Repository whose writes can be switched to fail.
#[derive(Default)]
pub struct InMemoryRepository {
    saved: Mutex<HashMap<Uuid, Appointment>>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn with_records(records: Vec<Appointment>) -> Self {
        Self {
            saved: Mutex::new(records.into_iter().map(|apt| (apt.id, apt)).collect()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn saved(&self, id: Uuid) -> Option<Appointment> {
        self.saved.lock().await.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.saved.lock().await.len()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryRepository {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<(), SchedulingError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SchedulingError::Persistence("disk full".to_string()));
        }
        self.saved.lock().await.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn load_appointments(&self) -> Result<Vec<Appointment>, SchedulingError> {
        Ok(self.saved.lock().await.values().cloned().collect())
    }
}

/// Repository whose saves park until `release` is called.
#[derive(Default)]
pub struct StalledRepository {
    inner: InMemoryRepository,
    entered: Notify,
    released: Notify,
}

impl StalledRepository {
    pub async fn wait_until_stalled(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub async fn count(&self) -> usize {
        self.inner.count().await
    }
}

#[async_trait]
impl AppointmentRepository for StalledRepository {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<(), SchedulingError> {
        self.entered.notify_one();
        self.released.notified().await;
        self.inner.save_appointment(appointment).await
    }

    async fn load_appointments(&self) -> Result<Vec<Appointment>, SchedulingError> {
        self.inner.load_appointments().await
    }
}

// ==============================================================================
// TEST FIXTURES
// ==============================================================================

pub struct TestSetup {
    pub service: Arc<SchedulingService>,
    pub directory: Arc<InMemoryDirectory>,
    pub repository: Arc<InMemoryRepository>,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
}

impl TestSetup {
    pub async fn new() -> Self {
        Self::with_policy(SchedulingPolicy::default()).await
    }

    pub async fn with_policy(policy: SchedulingPolicy) -> Self {
        let directory = Arc::new(InMemoryDirectory::default());
        let repository = Arc::new(InMemoryRepository::default());
        let doctor_id = directory.add_doctor().await;
        let patient_id = directory.add_patient().await;

        let service = Arc::new(SchedulingService::new(
            policy,
            directory.clone(),
            repository.clone(),
        ));

        Self {
            service,
            directory,
            repository,
            doctor_id,
            patient_id,
        }
    }

    pub fn request(&self, start_time: DateTime<Utc>, duration_minutes: i64) -> ScheduleAppointmentRequest {
        ScheduleAppointmentRequest {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            start_time,
            duration_minutes,
            notes: String::new(),
        }
    }

    pub async fn book(&self, start_time: DateTime<Utc>, duration_minutes: i64) -> Appointment {
        self.service
            .schedule(self.request(start_time, duration_minutes))
            .await
            .expect("booking should succeed")
    }
}

/// 2030-03-11 (a Monday) at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, 11, hour, minute, 0).unwrap()
}

pub fn on_day(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, day, hour, minute, 0).unwrap()
}
