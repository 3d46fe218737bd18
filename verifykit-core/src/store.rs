//! Durable records of active verification sessions.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{error::VerifyError, session::SessionRecord};

/// Host-provided durable key-value backend for session records.
///
/// Contents must survive the hosting process being killed and relaunched;
/// wake dispatch relies on them to resume monitoring after the OS reclaims
/// the process. Each individual operation must be atomic with respect to
/// concurrent callers.
#[uniffi::export(with_foreign)]
pub trait SessionStoreBackend: Send + Sync {
    /// Reads the value at `key`, if present.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    fn read(&self, key: String) -> Result<Option<Vec<u8>>, VerifyError>;

    /// Writes `value` at `key`, overwriting any existing value.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    fn write(&self, key: String, value: Vec<u8>) -> Result<(), VerifyError>;

    /// Deletes the value at `key`. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    fn delete(&self, key: String) -> Result<(), VerifyError>;

    /// Lists all stored keys.
    ///
    /// # Errors
    /// Returns an error if the listing fails.
    fn keys(&self) -> Result<Vec<String>, VerifyError>;
}

/// The single source of truth for session existence, keyed by location id.
///
/// Records are stored as JSON through the host backend. Compound
/// operations hold an internal lock so concurrent callers observe them
/// atomically.
pub struct SessionStore {
    backend: Arc<dyn SessionStoreBackend>,
    lock: Mutex<()>,
}

impl SessionStore {
    /// Wraps a host backend.
    #[must_use]
    pub fn new(backend: Arc<dyn SessionStoreBackend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    /// Persists `record` under its location id, overwriting any existing
    /// record for that key.
    ///
    /// # Errors
    /// Returns [`VerifyError::Unknown`] if the record cannot be serialized
    /// or the backend write fails.
    pub async fn put(&self, record: &SessionRecord) -> Result<(), VerifyError> {
        let bytes = serde_json::to_vec(record).map_err(|e| VerifyError::Unknown {
            detail: format!("session record serialization: {e}"),
        })?;
        let _guard = self.lock.lock().await;
        self.backend.write(record.location_id.clone(), bytes)
    }

    /// Loads the record for `location_id`, if any.
    ///
    /// A persisted record that no longer parses is deleted and treated as
    /// absent rather than wedging the session forever.
    ///
    /// # Errors
    /// Returns an error if the backend read fails.
    pub async fn get(&self, location_id: &str) -> Result<Option<SessionRecord>, VerifyError> {
        let _guard = self.lock.lock().await;
        self.get_locked(location_id)
    }

    /// Removes the record for `location_id`. Absent keys are a no-op.
    ///
    /// # Errors
    /// Returns an error if the backend delete fails.
    pub async fn remove(&self, location_id: &str) -> Result<(), VerifyError> {
        let _guard = self.lock.lock().await;
        self.backend.delete(location_id.to_string())
    }

    /// Lists every persisted session record.
    ///
    /// # Errors
    /// Returns an error if the backend listing fails.
    pub async fn list_active(&self) -> Result<Vec<SessionRecord>, VerifyError> {
        let _guard = self.lock.lock().await;
        let mut records = Vec::new();
        for key in self.backend.keys()? {
            if let Some(record) = self.get_locked(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn get_locked(&self, location_id: &str) -> Result<Option<SessionRecord>, VerifyError> {
        let Some(bytes) = self.backend.read(location_id.to_string())? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                log::warn!("dropping unreadable session record for {location_id}: {error}");
                self.backend.delete(location_id.to_string())?;
                Ok(None)
            }
        }
    }
}
