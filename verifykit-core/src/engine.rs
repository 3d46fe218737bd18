//! Interface to the wrapped geofence/location-tracking engine.
//!
//! The engine is an external collaborator supplied by the application
//! shell; the lifecycle core only drives this interface and never
//! implements the geofencing math itself.

use crate::error::VerifyError;

/// Parameters for one geofence registration.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct GeofenceRegistration {
    /// Location identifier; unique per session.
    pub location_id: String,
    /// Target latitude, degrees.
    pub latitude: f64,
    /// Target longitude, degrees.
    pub longitude: f64,
    /// User phone number, MSISDN format.
    pub phone_number: String,
    /// Backend user identifier for this verification.
    pub user_id: String,
    /// Derived tenant access token the engine reports results with.
    pub access_token: String,
    /// Resolved usage tags.
    pub usage_types: Vec<String>,
}

/// The geofence/location-tracking engine.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait GeofenceEngine: Send + Sync {
    /// Registers a geofence and begins observing device presence.
    ///
    /// Resolves once the engine has acknowledged the registration.
    ///
    /// # Errors
    /// Returns an error when the engine rejects the registration (device
    /// incapable, permission revoked mid-flight).
    async fn register(
        &self,
        registration: GeofenceRegistration,
    ) -> Result<(), VerifyError>;

    /// Removes the registration for `location_id`.
    ///
    /// Unknown ids must resolve successfully.
    ///
    /// # Errors
    /// Returns an error if an existing registration cannot be removed.
    async fn deregister(&self, location_id: String) -> Result<(), VerifyError>;

    /// Whether a live registration exists for `location_id`.
    ///
    /// # Errors
    /// Returns an error if the engine cannot be queried.
    async fn is_registered(&self, location_id: String) -> Result<bool, VerifyError>;

    /// Verifies a live registration is still healthy after a wake-up.
    ///
    /// # Errors
    /// Returns an error if the check cannot run or the registration is
    /// unhealthy.
    async fn health_check(&self, location_id: String) -> Result<(), VerifyError>;

    /// Forwards a refreshed push-registration token so future wake-ups
    /// keep routing to this device.
    ///
    /// # Errors
    /// Returns an error if the token cannot be forwarded.
    async fn update_push_token(&self, token: String) -> Result<(), VerifyError>;
}
