//! Durable key-value storage for the resolved location and display preferences.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use skyview_core::DisplayPreferences;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::types::ResolvedLocation;

pub const LOCATION_KEY: &str = "resolved_location";
pub const PREFERENCES_KEY: &str = "display_preferences";

/// Key-value persistence. Every `set` overwrites the previous record.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// All keys kept in one JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Opened storage at {:?} ({} keys)", path, entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.write(&entries) {
            // Keep memory in step with the file
            match previous {
                Some(v) => entries.insert(key.to_string(), v),
                None => entries.remove(key),
            };
            return Err(e);
        }
        tracing::debug!("Stored {} at {:?}", key, self.path);
        Ok(())
    }
}

/// Process-local store for environments without durable storage, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StorageError> {
    store
        .get(key)?
        .map(serde_json::from_value)
        .transpose()
        .map_err(StorageError::from)
}

fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StorageError> {
    store.set(key, serde_json::to_value(value)?)
}

pub fn load_location(store: &dyn KeyValueStore) -> Result<Option<ResolvedLocation>, StorageError> {
    load(store, LOCATION_KEY)
}

pub fn save_location(store: &dyn KeyValueStore, location: &ResolvedLocation) -> Result<(), StorageError> {
    save(store, LOCATION_KEY, location)
}

pub fn load_preferences(
    store: &dyn KeyValueStore,
) -> Result<Option<DisplayPreferences>, StorageError> {
    load(store, PREFERENCES_KEY)
}

pub fn save_preferences(
    store: &dyn KeyValueStore,
    preferences: &DisplayPreferences,
) -> Result<(), StorageError> {
    save(store, PREFERENCES_KEY, preferences)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::{Coordinates, LocationLabel};
    use skyview_core::{Theme, UnitSystem};
    use tempfile::TempDir;

    fn buffalo() -> ResolvedLocation {
        ResolvedLocation::manual(
            Coordinates::new(45.1719, -93.8747),
            LocationLabel {
                city: "Buffalo".into(),
                state: "Minnesota".into(),
                zip: "55313".into(),
            },
        )
    }

    #[test]
    fn test_location_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert!(load_location(&store).unwrap().is_none());
        save_location(&store, &buffalo()).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(load_location(&reopened).unwrap(), Some(buffalo()));
    }

    #[test]
    fn test_coordinates_survive_reopen_bit_for_bit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        let store = JsonFileStore::open(&path).unwrap();

        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next_unit = || {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };

        let mut saved = vec![Coordinates::new(41.356146060000015, -108.41131800000001)];
        for _ in 0..300 {
            saved.push(Coordinates::new(
                next_unit() * 180.0 - 90.0,
                next_unit() * 360.0 - 180.0,
            ));
        }

        for (i, coordinates) in saved.iter().enumerate() {
            let location = ResolvedLocation::device(*coordinates);
            store
                .set(&format!("location_{}", i), serde_json::to_value(&location).unwrap())
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        for (i, coordinates) in saved.iter().enumerate() {
            let value = reopened.get(&format!("location_{}", i)).unwrap().unwrap();
            let location: ResolvedLocation = serde_json::from_value(value).unwrap();
            let restored = location.coordinates.unwrap();
            assert_eq!(restored.latitude.to_bits(), coordinates.latitude.to_bits());
            assert_eq!(restored.longitude.to_bits(), coordinates.longitude.to_bits());
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        let store = JsonFileStore::open(&path).unwrap();

        let prefs = DisplayPreferences {
            unit_system: UnitSystem::Metric,
            theme: Theme::Dark,
        };
        save_location(&store, &buffalo()).unwrap();
        save_preferences(&store, &prefs).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(load_preferences(&reopened).unwrap(), Some(prefs));
        assert_eq!(load_location(&reopened).unwrap(), Some(buffalo()));
    }

    #[test]
    fn test_overwrite_replaces_record() {
        let store = MemoryStore::new();
        save_location(&store, &buffalo()).unwrap();
        let device = ResolvedLocation::device(Coordinates::new(1.0, 2.0));
        save_location(&store, &device).unwrap();
        assert_eq!(load_location(&store).unwrap(), Some(device));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StorageError::Serialize(_))
        ));
    }

    #[test]
    fn test_mismatched_record_is_an_error() {
        let store = MemoryStore::new();
        store
            .set(LOCATION_KEY, serde_json::json!({"provenance": 42}))
            .unwrap();
        assert!(load_location(&store).is_err());
    }
}
