//! JSONL-based storage implementation with in-memory caching.
//!
//! One file per collection (`instances.jsonl`, `dashboards.jsonl`) under the
//! data directory, one JSON record per line.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::{debug, info};
use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::domain::{Dashboard, InstanceRecord};
use crate::error::{Result, SourcedError};

const INSTANCES: &str = "instances";
const DASHBOARDS: &str = "dashboards";

/// JSONL-based storage with in-memory caching.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        info!("Using JSONL storage at {}", base_path.display());
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(|e| SourcedError::Storage(e.to_string()))?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(|e| SourcedError::Storage(e.to_string()))?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let records = if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut records = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    let record: serde_json::Value = serde_json::from_str(&line)?;
                    records.push(record);
                }
            }
            records
        } else {
            Vec::new()
        };

        debug!("Loaded {} {} records", records.len(), collection);
        cache.insert(collection.to_string(), records);
        Ok(())
    }

    /// Rewrite the entire collection file from cache.
    fn rewrite_file(&self, collection: &str) -> Result<()> {
        let cache = self.cache.read().map_err(|e| SourcedError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| SourcedError::Storage(format!("Collection not loaded: {}", collection)))?;

        let path = self.collection_path(collection);
        let mut file = File::create(&path)?;
        for record in records {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        Ok(())
    }

    /// Get a record by ID.
    pub fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| SourcedError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| SourcedError::Storage(format!("Collection not loaded: {}", collection)))?;

        for record in records {
            if record.get("id").and_then(|v| v.as_str()) == Some(id) {
                let parsed: T = serde_json::from_value(record.clone())?;
                return Ok(Some(parsed));
            }
        }

        Ok(None)
    }

    /// Insert a record, or replace the one with the same ID.
    pub fn upsert<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        {
            let mut cache = self.cache.write().map_err(|e| SourcedError::Storage(e.to_string()))?;
            let records = cache
                .get_mut(collection)
                .ok_or_else(|| SourcedError::Storage(format!("Collection not loaded: {}", collection)))?;

            match records
                .iter_mut()
                .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(record.id()))
            {
                Some(existing) => *existing = value,
                None => records.push(value),
            }
        }

        // Rewrite file with updated cache
        self.rewrite_file(collection)
    }

    /// Delete a record by ID.
    pub fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.ensure_loaded(collection)?;

        {
            let mut cache = self.cache.write().map_err(|e| SourcedError::Storage(e.to_string()))?;
            let records = cache
                .get_mut(collection)
                .ok_or_else(|| SourcedError::Storage(format!("Collection not loaded: {}", collection)))?;

            let original_len = records.len();
            records.retain(|r| r.get("id").and_then(|v| v.as_str()) != Some(id));

            if records.len() == original_len {
                return Err(SourcedError::NotFound(format!("{} record {}", collection, id)));
            }
        }

        self.rewrite_file(collection)
    }

    /// Query records with filters.
    pub fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| SourcedError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| SourcedError::Storage(format!("Collection not loaded: {}", collection)))?;

        let mut results = Vec::new();
        for record in records {
            if filters.iter().all(|f| f.matches(record)) {
                let parsed: T = serde_json::from_value(record.clone())?;
                results.push(parsed);
            }
        }

        Ok(results)
    }

    /// List all records in a collection.
    pub fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }
}

impl Storage for JsonlStorage {
    fn load_instance(&self, id: &str) -> Result<InstanceRecord> {
        self.get(INSTANCES, id)?
            .ok_or_else(|| SourcedError::NotFound(format!("instance {}", id)))
    }

    fn save_instance(&self, record: &InstanceRecord) -> Result<()> {
        self.upsert(INSTANCES, record)
    }

    fn delete_instance(&self, id: &str) -> Result<()> {
        self.delete(INSTANCES, id)
    }

    fn list_instance_ids(&self) -> Result<Vec<String>> {
        let records: Vec<InstanceRecord> = self.list(INSTANCES)?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    fn get_property_strings(&self, id: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.load_instance(id)?.properties)
    }

    fn rename_implementation(&self, old: &str, new: &str) -> Result<usize> {
        let records: Vec<InstanceRecord> = self.query(INSTANCES, &[Filter::eq("implementation", old)])?;
        for mut record in records.iter().cloned() {
            record.implementation = Some(new.to_string());
            self.upsert(INSTANCES, &record)?;
        }
        if !records.is_empty() {
            info!("Renamed implementation {} to {} in {} records", old, new, records.len());
        }
        Ok(records.len())
    }

    fn list_dashboards(&self) -> Result<Vec<Dashboard>> {
        self.list(DASHBOARDS)
    }

    fn save_dashboard(&self, dashboard: &Dashboard) -> Result<()> {
        self.upsert(DASHBOARDS, dashboard)
    }

    fn delete_dashboard(&self, id: &str) -> Result<()> {
        self.delete(DASHBOARDS, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (JsonlStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn record(id: &str, implementation: Option<&str>) -> InstanceRecord {
        InstanceRecord {
            id: id.to_string(),
            implementation: implementation.map(str::to_string),
            view: "heartbeat".to_string(),
            name: format!("Heartbeat {}", id),
            enabled: false,
            frequency_ms: Some(900_000),
            properties: BTreeMap::from([("message".to_string(), "hi".to_string())]),
            created_by: "admin".to_string(),
            last_modified_by: "admin".to_string(),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_save_and_load() {
        let (storage, _temp) = create_test_storage();
        let rec = record("1", Some("a.b.Foo"));
        storage.save_instance(&rec).unwrap();
        assert_eq!(storage.load_instance("1").unwrap(), rec);
    }

    #[test]
    fn test_load_not_found() {
        let (storage, _temp) = create_test_storage();
        assert!(matches!(storage.load_instance("nope"), Err(SourcedError::NotFound(_))));
    }

    #[test]
    fn test_save_replaces_existing() {
        let (storage, _temp) = create_test_storage();
        let mut rec = record("1", Some("a.b.Foo"));
        storage.save_instance(&rec).unwrap();

        rec.enabled = true;
        storage.save_instance(&rec).unwrap();

        assert!(storage.load_instance("1").unwrap().enabled);
        assert_eq!(storage.list_instance_ids().unwrap(), vec!["1".to_string()]);
    }

    #[test]
    fn test_delete() {
        let (storage, _temp) = create_test_storage();
        storage.save_instance(&record("1", None)).unwrap();
        storage.delete_instance("1").unwrap();
        assert!(storage.list_instance_ids().unwrap().is_empty());
        assert!(storage.delete_instance("1").is_err());
    }

    #[test]
    fn test_property_strings() {
        let (storage, _temp) = create_test_storage();
        storage.save_instance(&record("1", None)).unwrap();
        let props = storage.get_property_strings("1").unwrap();
        assert_eq!(props.get("message").map(String::as_str), Some("hi"));
    }

    #[test]
    fn test_rename_implementation() {
        let (storage, _temp) = create_test_storage();
        storage.save_instance(&record("1", Some("a.b.Foo"))).unwrap();
        storage.save_instance(&record("2", Some("a.b.Foo"))).unwrap();
        storage.save_instance(&record("3", Some("a.b.Bar"))).unwrap();

        assert_eq!(storage.rename_implementation("a.b.Foo", "a.c.Foo").unwrap(), 2);
        assert_eq!(
            storage.load_instance("1").unwrap().implementation.as_deref(),
            Some("a.c.Foo")
        );
        assert_eq!(
            storage.load_instance("3").unwrap().implementation.as_deref(),
            Some("a.b.Bar")
        );
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        {
            let storage = JsonlStorage::new(temp_dir.path()).unwrap();
            storage.save_instance(&record("1", Some("a.b.Foo"))).unwrap();
            let mut dashboard = Dashboard::new("ops", "Operations", "admin");
            dashboard.add_widget("1", "Foo");
            storage.save_dashboard(&dashboard).unwrap();
        }

        {
            let storage = JsonlStorage::new(temp_dir.path()).unwrap();
            assert_eq!(storage.load_instance("1").unwrap().id, "1");
            let dashboards = storage.list_dashboards().unwrap();
            assert_eq!(dashboards.len(), 1);
            assert!(dashboards[0].uses("1"));
        }
    }

    #[test]
    fn test_delete_dashboard() {
        let (storage, _temp) = create_test_storage();
        storage.save_dashboard(&Dashboard::new("ops", "Operations", "admin")).unwrap();
        storage.delete_dashboard("ops").unwrap();
        assert!(storage.list_dashboards().unwrap().is_empty());
        assert!(matches!(storage.delete_dashboard("ops"), Err(SourcedError::NotFound(_))));
    }
}
