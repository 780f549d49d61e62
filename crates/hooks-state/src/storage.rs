//! # Storage Accessors
//!
//! Key/value persistence behind a pluggable driver.
//!
//! Values are JSON-encoded on write and parsed on read. A stored string
//! that is not valid JSON reads back as a plain string value, and a value
//! that cannot be decoded into the requested type reads back as the
//! caller's default. Accessor methods never return errors: failures are
//! logged at `warn` and reported as `false` or the default.

use crate::error::StorageError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend holding opaque string values by key.
pub trait StorageDriver: Send + Sync {
    /// Read the raw value stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Pluggable value encryption applied by a `StorageAccessor`.
pub trait Encryptor: Send + Sync {
    /// Turn a value into the string that gets stored.
    fn encrypt(&self, value: &Value) -> Result<String, StorageError>;

    /// Recover the value from a stored string.
    fn decrypt(&self, stored: &str) -> Result<Value, StorageError>;
}

/// In-process storage driver with an optional byte quota.
///
/// Usage is the sum of key and value lengths in bytes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Unbounded storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once `bytes` would be exceeded.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            items: RwLock::default(),
            quota: Some(bytes),
        }
    }

    /// Bytes currently used.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.items.read().iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl StorageDriver for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.write();

        if let Some(quota) = self.quota {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().remove(key);
        Ok(())
    }
}

/// Typed, failure-tolerant access to a `StorageDriver`.
#[derive(Clone)]
pub struct StorageAccessor {
    driver: Arc<dyn StorageDriver>,
    encryptor: Option<Arc<dyn Encryptor>>,
}

impl StorageAccessor {
    /// Accessor over `driver` storing plain JSON.
    pub fn new(driver: Arc<dyn StorageDriver>) -> Self {
        Self {
            driver,
            encryptor: None,
        }
    }

    /// Encrypt values on write and decrypt them on read.
    #[must_use]
    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    /// Whether an encryptor is installed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Read the value under `key`.
    ///
    /// Returns `None` when the key is missing or the driver fails. A stored
    /// string that is not valid JSON is returned as `Value::String`.
    #[must_use]
    pub fn read_value(&self, key: &str) -> Option<Value> {
        let raw = match self.driver.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage read failed");
                return None;
            }
        };

        match &self.encryptor {
            Some(encryptor) => match encryptor.decrypt(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Stored value could not be decrypted");
                    None
                }
            },
            None => Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw))),
        }
    }

    /// Read and decode the value under `key`, or return `default`.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(value) = self.read_value(key) else {
            return default;
        };
        match serde_json::from_value(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(key = %key, error = %e, "Stored value has unexpected shape, using default");
                default
            }
        }
    }

    /// Encode and store `value` under `key`. Returns whether it was stored.
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match self.encode(value) {
            Ok(encoded) => match self.driver.set_item(key, &encoded) {
                Ok(()) => true,
                Err(e) => {
                    warn!(key = %key, error = %e, "Storage write failed");
                    false
                }
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Value could not be encoded for storage");
                false
            }
        }
    }

    /// Remove `key`. Returns whether the driver accepted the removal.
    pub fn remove(&self, key: &str) -> bool {
        match self.driver.remove_item(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage remove failed");
                false
            }
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, StorageError> {
        match &self.encryptor {
            Some(encryptor) => {
                let value = serde_json::to_value(value)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                encryptor.encrypt(&value)
            }
            None => {
                serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
            }
        }
    }
}

impl fmt::Debug for StorageAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccessor")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
