//! Settings persistence for the Axosoft client.
//!
//! A small key-value store holding the handful of values that survive restarts
//! (domain, access token, current project). Values are JSON so numbers and
//! strings round-trip with their type intact.
//!
//! - `SledSettings`: durable store in a sled tree; `save()` flushes to disk.
//! - `MemorySettings`: process-local store for tests and embedding.

use serde_json::Value;
use sled::Db;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::SettingsError;

pub const DOMAIN_KEY: &str = "axosoft_domain";
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const PROJECT_KEY: &str = "axosoft_project";

pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError>;
    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError>;
    fn erase(&self, key: &str) -> Result<(), SettingsError>;
    /// Flush pending writes to durable storage.
    fn save(&self) -> Result<(), SettingsError>;

    fn has(&self, key: &str) -> Result<bool, SettingsError> {
        Ok(self.get(key)?.is_some())
    }

    fn get_or(&self, key: &str, default: Value) -> Result<Value, SettingsError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// String view of a setting; empty strings count as unset.
    fn get_string(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.get(key)?.and_then(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }
}

/// Sled-backed settings (one tree, JSON-encoded values)
#[derive(Clone)]
pub struct SledSettings {
    db: Db,
    tree: sled::Tree,
}

impl SledSettings {
    /// Open or create the settings database at the given path
    pub fn open(path: &str) -> Result<Self, SettingsError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("settings")?;
        Ok(Self { db, tree })
    }
}

impl SettingsStore for SledSettings {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| SettingsError::Encoding {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let bytes = serde_json::to_vec(&value).map_err(|source| SettingsError::Encoding {
            key: key.to_string(),
            source,
        })?;
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    fn erase(&self, key: &str) -> Result<(), SettingsError> {
        self.tree.remove(key.as_bytes())?;
        Ok(())
    }

    fn save(&self) -> Result<(), SettingsError> {
        self.tree.flush()?;
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, Value>>,
    saves: Mutex<usize>,
    read_only: bool,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(entries: &[(&str, Value)]) -> Self {
        let settings = Self::new();
        {
            let mut values = settings.values.lock().unwrap_or_else(|e| e.into_inner());
            for (key, value) in entries {
                values.insert((*key).to_string(), value.clone());
            }
        }
        settings
    }

    /// Make every `save()` fail, as a settings file on a read-only disk would.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Number of times `save()` was called.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn erase(&self, key: &str) -> Result<(), SettingsError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }

    fn save(&self) -> Result<(), SettingsError> {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if self.read_only {
            return Err(SettingsError::Storage(sled::Error::Unsupported(
                "settings are read-only".to_string(),
            )));
        }
        Ok(())
    }
}
