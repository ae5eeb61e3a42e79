// libs/shared/database/src/record_store.rs
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;

pub const PATIENTS: &str = "patients";
pub const STAFF: &str = "staff";
pub const APPOINTMENTS: &str = "appointments";

#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Collection file {} does not hold a JSON array", .path.display())]
    NotAnArray { path: PathBuf },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record in '{0}' has no string 'id' field")]
    MissingId(String),
}

/// Key-value record store backed by one JSON array file per collection.
///
/// Every write replaces the whole collection file after copying the previous
/// contents to `<collection>.json.backup`. Writers are serialized through a
/// single lock so read-modify-write cycles never interleave.
pub struct JsonRecordStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonRecordStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_data_dir(&config.data_dir)
    }

    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection))
    }

    /// Create the data directory and an empty file for each missing collection.
    pub async fn ensure_initialized(&self, collections: &[&str]) -> Result<(), RecordStoreError> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|source| RecordStoreError::Io {
                path: self.data_dir.clone(),
                source,
            })?;

        let _guard = self.write_lock.lock().await;
        for collection in collections {
            let path = self.collection_path(collection);
            if !path_exists(&path).await {
                debug!("Initializing data file {}", path.display());
                self.write_collection(collection, &[]).await?;
            }
        }
        Ok(())
    }

    /// Load every record of a collection. A missing file is an empty collection.
    pub async fn load(&self, collection: &str) -> Result<Vec<Value>, RecordStoreError> {
        let path = self.collection_path(collection);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Collection file {} missing, treating as empty", path.display());
                return Ok(Vec::new());
            }
            Err(source) => return Err(RecordStoreError::Io { path, source }),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(_) => {
                error!("Collection file {} does not hold an array", path.display());
                Err(RecordStoreError::NotAnArray { path })
            }
            Err(source) => {
                error!("JSON decode error in {}: {}", path.display(), source);
                Err(RecordStoreError::Corrupt { path, source })
            }
        }
    }

    pub async fn load_as<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, RecordStoreError> {
        self.load(collection)
            .await?
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(RecordStoreError::from))
            .collect()
    }

    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, RecordStoreError> {
        Ok(self
            .load(collection)
            .await?
            .into_iter()
            .find(|record| record_id(record) == Some(id)))
    }

    pub async fn list_by<F>(&self, collection: &str, filter: F) -> Result<Vec<Value>, RecordStoreError>
    where
        F: Fn(&Value) -> bool,
    {
        Ok(self
            .load(collection)
            .await?
            .into_iter()
            .filter(|record| filter(record))
            .collect())
    }

    /// Store a new record under a freshly generated id and return that id.
    pub async fn create<T: Serialize>(&self, collection: &str, record: &T) -> Result<String, RecordStoreError> {
        let mut value = serde_json::to_value(record)?;
        let id = Uuid::new_v4().to_string();
        match value.as_object_mut() {
            Some(fields) => {
                fields.insert("id".to_string(), Value::String(id.clone()));
            }
            None => return Err(RecordStoreError::MissingId(collection.to_string())),
        }
        self.upsert_value(collection, value).await?;
        Ok(id)
    }

    /// Insert the record, or replace the stored one carrying the same id.
    pub async fn upsert<T: Serialize>(&self, collection: &str, record: &T) -> Result<(), RecordStoreError> {
        let value = serde_json::to_value(record)?;
        self.upsert_value(collection, value).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, RecordStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load(collection).await?;
        let before = records.len();
        records.retain(|record| record_id(record) != Some(id));

        if records.len() == before {
            return Ok(false);
        }

        self.write_collection(collection, &records).await?;
        Ok(true)
    }

    async fn upsert_value(&self, collection: &str, value: Value) -> Result<(), RecordStoreError> {
        let id = record_id(&value)
            .ok_or_else(|| RecordStoreError::MissingId(collection.to_string()))?
            .to_string();

        let _guard = self.write_lock.lock().await;
        let mut records = self.load(collection).await?;

        match records.iter_mut().find(|record| record_id(record) == Some(id.as_str())) {
            Some(existing) => *existing = value,
            None => records.push(value),
        }

        self.write_collection(collection, &records).await
    }

    async fn write_collection(&self, collection: &str, records: &[Value]) -> Result<(), RecordStoreError> {
        let path = self.collection_path(collection);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| RecordStoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        if path_exists(&path).await {
            let backup = path.with_extension("json.backup");
            if let Err(e) = fs::copy(&path, &backup).await {
                // Losing the backup does not block the write itself.
                error!("Failed to create backup for {}: {}", path.display(), e);
            }
        }

        let body = serde_json::to_string_pretty(records)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, body)
            .await
            .map_err(|source| RecordStoreError::Io {
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, &path)
            .await
            .map_err(|source| RecordStoreError::Io {
                path: path.clone(),
                source,
            })?;

        debug!("Wrote {} records to {}", records.len(), path.display());
        Ok(())
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

async fn path_exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_collection_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        let records = store.load(PATIENTS).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        store
            .upsert(PATIENTS, &json!({ "id": "p1", "name": "Ada Lovelace" }))
            .await
            .unwrap();

        let found = store.find_by_id(PATIENTS, "p1").await.unwrap().unwrap();
        assert_eq!(found["name"], "Ada Lovelace");
        assert!(store.find_by_id(PATIENTS, "p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        store
            .upsert(STAFF, &json!({ "id": "d1", "role": "doctor", "name": "Grey" }))
            .await
            .unwrap();
        store
            .upsert(STAFF, &json!({ "id": "d1", "role": "doctor", "name": "Shepherd" }))
            .await
            .unwrap();

        let records = store.load(STAFF).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Shepherd");

        let backup = std::fs::read_to_string(dir.path().join("staff.json.backup")).unwrap();
        assert!(backup.contains("Grey"));
    }

    #[tokio::test]
    async fn test_create_assigns_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        let id = store
            .create(PATIENTS, &json!({ "name": "Mary Seacole" }))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&id).is_ok());
        let found = store.find_by_id(PATIENTS, &id).await.unwrap().unwrap();
        assert_eq!(found["name"], "Mary Seacole");
    }

    #[tokio::test]
    async fn test_list_by_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        store.upsert(STAFF, &json!({ "id": "d1", "role": "doctor" })).await.unwrap();
        store.upsert(STAFF, &json!({ "id": "n1", "role": "nurse" })).await.unwrap();

        let doctors = store
            .list_by(STAFF, |record| record["role"] == "doctor")
            .await
            .unwrap();
        assert_eq!(doctors.len(), 1);

        assert!(store.delete(STAFF, "n1").await.unwrap());
        assert!(!store.delete(STAFF, "n1").await.unwrap());
        assert_eq!(store.load(STAFF).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_without_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        let result = store.upsert(APPOINTMENTS, &json!({ "note": "no id" })).await;
        assert!(matches!(result, Err(RecordStoreError::MissingId(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("appointments.json"), "{ not json").unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        let result = store.load(APPOINTMENTS).await;
        assert!(matches!(result, Err(RecordStoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_non_array_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appointments.json");
        std::fs::write(&path, r#"{ "id": "a1", "status": "scheduled" }"#).unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path());

        assert!(matches!(
            store.load(APPOINTMENTS).await,
            Err(RecordStoreError::NotAnArray { .. })
        ));
        let result = store.upsert(APPOINTMENTS, &json!({ "id": "a2" })).await;
        assert!(matches!(result, Err(RecordStoreError::NotAnArray { .. })));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"a1\""));
    }

    #[tokio::test]
    async fn test_ensure_initialized_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::with_data_dir(dir.path().join("data"));

        store.ensure_initialized(&[PATIENTS, STAFF, APPOINTMENTS]).await.unwrap();

        for name in ["patients.json", "staff.json", "appointments.json"] {
            let raw = std::fs::read_to_string(dir.path().join("data").join(name)).unwrap();
            assert_eq!(raw.trim(), "[]");
        }
    }
}
