// libs/appointment-cell/src/services/store.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::record_store::{APPOINTMENTS, PATIENTS, STAFF};
use shared_database::{JsonRecordStore, RecordStoreError};

use crate::models::{Appointment, EntityKind, SchedulingError};

/// Answers "does this doctor/patient exist" against the external roster.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn resolve(&self, kind: EntityKind, id: Uuid) -> Result<bool, SchedulingError>;
}

/// Durable home of appointment records. Writes are expected to be idempotent.
/// Records are never deleted; cancelled and completed ones stay as history.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<(), SchedulingError>;

    async fn load_appointments(&self) -> Result<Vec<Appointment>, SchedulingError>;
}

// ==============================================================================
// JSON RECORD STORE ADAPTERS
// ==============================================================================

/// Resolves doctors from the staff collection (role `doctor`) and patients
/// from the patients collection.
pub struct RecordStoreDirectory {
    store: Arc<JsonRecordStore>,
}

impl RecordStoreDirectory {
    pub fn new(store: Arc<JsonRecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntityDirectory for RecordStoreDirectory {
    async fn resolve(&self, kind: EntityKind, id: Uuid) -> Result<bool, SchedulingError> {
        debug!("Resolving {} {}", kind, id);

        let collection = match kind {
            EntityKind::Doctor => STAFF,
            EntityKind::Patient => PATIENTS,
        };

        let record = self
            .store
            .find_by_id(collection, &id.to_string())
            .await
            .map_err(|e| SchedulingError::EntityStore(e.to_string()))?;

        Ok(match (kind, record) {
            (_, None) => false,
            (EntityKind::Patient, Some(_)) => true,
            (EntityKind::Doctor, Some(staff)) => is_doctor(&staff),
        })
    }
}

fn is_doctor(staff: &Value) -> bool {
    staff
        .get("role")
        .and_then(Value::as_str)
        .map(|role| role.eq_ignore_ascii_case("doctor"))
        .unwrap_or(false)
}

/// Persists appointments into the `appointments` collection.
pub struct RecordStoreRepository {
    store: Arc<JsonRecordStore>,
}

impl RecordStoreRepository {
    pub fn new(store: Arc<JsonRecordStore>) -> Self {
        Self { store }
    }
}

fn persistence_error(e: RecordStoreError) -> SchedulingError {
    SchedulingError::Persistence(e.to_string())
}

#[async_trait]
impl AppointmentRepository for RecordStoreRepository {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<(), SchedulingError> {
        self.store
            .upsert(APPOINTMENTS, appointment)
            .await
            .map_err(persistence_error)
    }

    async fn load_appointments(&self) -> Result<Vec<Appointment>, SchedulingError> {
        self.store
            .load_as::<Appointment>(APPOINTMENTS)
            .await
            .map_err(persistence_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::Utc;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, Arc<JsonRecordStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonRecordStore::with_data_dir(dir.path()));
        (dir, store)
    }

    #[tokio::test]
    async fn test_directory_requires_doctor_role() {
        let (_dir, store) = store();
        let doctor = Uuid::new_v4();
        let nurse = Uuid::new_v4();
        store
            .upsert(STAFF, &json!({ "id": doctor.to_string(), "role": "Doctor" }))
            .await
            .unwrap();
        store
            .upsert(STAFF, &json!({ "id": nurse.to_string(), "role": "nurse" }))
            .await
            .unwrap();

        let directory = RecordStoreDirectory::new(store);
        assert!(directory.resolve(EntityKind::Doctor, doctor).await.unwrap());
        assert!(!directory.resolve(EntityKind::Doctor, nurse).await.unwrap());
        assert!(!directory.resolve(EntityKind::Doctor, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_directory_resolves_patients() {
        let (_dir, store) = store();
        let patient = Uuid::new_v4();
        store
            .upsert(PATIENTS, &json!({ "id": patient.to_string(), "name": "Jo" }))
            .await
            .unwrap();

        let directory = RecordStoreDirectory::new(store);
        assert!(directory.resolve(EntityKind::Patient, patient).await.unwrap());
        assert!(!directory.resolve(EntityKind::Patient, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_repository_save_and_load() {
        let (_dir, store) = store();
        let repository = RecordStoreRepository::new(store);
        let now = Utc::now();
        let mut appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            start_time: now,
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
            notes: "first visit".to_string(),
            created_at: now,
            updated_at: now,
        };

        repository.save_appointment(&appointment).await.unwrap();
        appointment.status = AppointmentStatus::Cancelled;
        repository.save_appointment(&appointment).await.unwrap();

        let loaded = repository.load_appointments().await.unwrap();
        assert_eq!(loaded, vec![appointment]);
    }
}
