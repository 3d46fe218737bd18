//! Verification session types and per-session serialization.

use std::{
    collections::HashMap,
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{auth::AuthContext, engine::GeofenceRegistration, error::VerifyError};

/// What the collected verification signals are used for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    Serialize,
    Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// Remote confirmation through device location signals. The default.
    DigitalVerification,
    /// An agent visit confirms the address in person.
    PhysicalVerification,
    /// The address is stored for later use without active verification.
    AddressBook,
}

/// One user+location verification request as supplied by the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct VerificationRequest {
    /// User phone number in MSISDN format (e.g. `+254712345678`).
    pub phone_number: String,
    /// Backend user identifier, when already known.
    #[uniffi(default = None)]
    #[serde(default)]
    pub user_id: Option<String>,
    /// Unique address identifier; keys the session.
    pub location_id: String,
    /// Latitude of the claimed address, degrees.
    pub latitude: f64,
    /// Longitude of the claimed address, degrees.
    pub longitude: f64,
    /// Usage tags; an empty list resolves to `digital_verification` only.
    #[uniffi(default = [])]
    #[serde(default)]
    pub usage_types: Vec<String>,
    /// Whether monitoring runs under the OS foreground indicator.
    #[uniffi(default = true)]
    #[serde(default = "default_with_foreground")]
    pub with_foreground: bool,
}

const fn default_with_foreground() -> bool {
    true
}

impl VerificationRequest {
    /// Validates the request and resolves its usage tags.
    ///
    /// # Errors
    /// Returns [`VerifyError::InvalidRequest`] naming the offending
    /// attribute.
    pub fn validate(&self) -> Result<Vec<UsageType>, VerifyError> {
        let phone = self.phone_number.trim();
        if phone.is_empty() {
            return Err(invalid("phoneNumber", "must not be empty"));
        }
        if !phone.starts_with('+')
            || phone.len() < 8
            || !phone[1..].chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid(
                "phoneNumber",
                "must be in MSISDN format, e.g. +254712345678",
            ));
        }
        if self.location_id.trim().is_empty() {
            return Err(invalid("locationId", "must not be empty"));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(invalid("latitude", "must be within [-90, 90]"));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(invalid("longitude", "must be within [-180, 180]"));
        }
        self.resolve_usage_types()
    }

    /// Resolves the raw usage tags, defaulting to digital verification
    /// when the caller supplied none.
    ///
    /// # Errors
    /// Returns [`VerifyError::InvalidRequest`] for unknown tags.
    pub fn resolve_usage_types(&self) -> Result<Vec<UsageType>, VerifyError> {
        if self.usage_types.is_empty() {
            return Ok(vec![UsageType::DigitalVerification]);
        }
        self.usage_types
            .iter()
            .map(|raw| {
                UsageType::from_str(raw)
                    .map_err(|_| invalid("usageTypes", &format!("unknown usage type `{raw}`")))
            })
            .collect()
    }
}

fn invalid(attribute: &str, reason: &str) -> VerifyError {
    VerifyError::InvalidRequest {
        attribute: attribute.to_string(),
        reason: reason.to_string(),
    }
}

/// Lifecycle state of one verification session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Request accepted; engine registration in flight.
    Starting,
    /// The engine observes device presence at the target location.
    Monitoring,
    /// Monitoring paused because a precondition capability regressed;
    /// resumes on the next wake trigger once the capability is restored.
    Suspended,
    /// An explicit stop is in progress.
    Stopping,
    /// The session ended and its record was removed.
    Stopped,
    /// Unrecoverable failure; reported once, record removed.
    Failed,
}

/// Durable snapshot of one session, keyed by location id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The request's location id.
    pub location_id: String,
    /// Latest request parameters; a restart replaces these in place.
    pub request: VerificationRequest,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Verification-result token returned to the caller; stable across
    /// restarts of the same session.
    pub token: String,
    /// Creation time, unix seconds.
    pub created_at: u64,
    /// Last resume or health-check time, unix seconds.
    pub last_resumed_at: u64,
    /// Most recent engine-level failure recorded against the session,
    /// reported on the next explicit status query.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SessionRecord {
    /// Creates a fresh record in `Starting` with a newly minted token.
    #[must_use]
    pub fn new(request: VerificationRequest, now: u64) -> Self {
        Self {
            location_id: request.location_id.clone(),
            request,
            state: SessionState::Starting,
            token: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            last_resumed_at: now,
            last_error: None,
        }
    }

    /// Builds the engine registration for this session.
    ///
    /// # Errors
    /// Returns [`VerifyError::InvalidRequest`] if the persisted usage tags
    /// no longer resolve (they were validated on the way in, so this only
    /// fires on a corrupted record).
    pub fn registration(&self, auth: &AuthContext) -> Result<GeofenceRegistration, VerifyError> {
        let usage_types = self
            .request
            .resolve_usage_types()?
            .iter()
            .map(ToString::to_string)
            .collect();
        Ok(GeofenceRegistration {
            location_id: self.location_id.clone(),
            latitude: self.request.latitude,
            longitude: self.request.longitude,
            phone_number: self.request.phone_number.clone(),
            user_id: self
                .request
                .user_id
                .clone()
                .unwrap_or_else(|| self.token.clone()),
            access_token: auth.access_token().to_string(),
            usage_types,
        })
    }
}

/// Caller-facing status snapshot for one session.
#[derive(Debug, Clone, uniffi::Record)]
pub struct SessionStatus {
    /// The session's location id.
    pub location_id: String,
    /// Current lifecycle state.
    pub state: SessionState,
    /// The verification-result token handed out when the session started.
    pub token: String,
    /// Creation time, unix seconds.
    pub created_at: u64,
    /// Last resume or health-check time, unix seconds.
    pub last_resumed_at: u64,
    /// Most recent engine-level failure recorded against the session.
    pub last_error: Option<String>,
}

impl From<&SessionRecord> for SessionStatus {
    fn from(record: &SessionRecord) -> Self {
        Self {
            location_id: record.location_id.clone(),
            state: record.state,
            token: record.token.clone(),
            created_at: record.created_at,
            last_resumed_at: record.last_resumed_at,
            last_error: record.last_error.clone(),
        }
    }
}

/// Wall-clock seconds since the unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Keyed locks serializing operations per location id.
///
/// Start, stop and wake-resume against one session never run
/// concurrently; operations on different location ids run in parallel.
#[derive(Default)]
pub(crate) struct SessionGuards {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionGuards {
    /// Acquires the lock for `location_id`, creating it on first use.
    ///
    /// Entries nobody holds or waits on any more are pruned on the way
    /// in, so the map does not grow with every location id ever touched.
    pub(crate) async fn lock(&self, location_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(location_id.to_string()).or_default())
        };
        entry.lock_owned().await
    }
}
