//! Device capability checks and remediation prompts.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use strum::Display;

use crate::error::VerifyError;

/// A device precondition the verification lifecycle depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    /// The device-wide location services toggle.
    LocationServices,
    /// Platform background services (e.g. Play Services).
    PlatformServices,
    /// The OS battery/app-restriction exclusion screen ("protected apps").
    ProtectedApps,
}

/// Snapshot of device preconditions.
///
/// Recomputed on every probe call; never cached across calls.
#[derive(Debug, Clone, uniffi::Record)]
pub struct CapabilityStatus {
    /// The location services toggle is on.
    pub location_services_enabled: bool,
    /// Foreground location permission is granted.
    pub location_permission_granted: bool,
    /// Background ("always") location permission is granted.
    pub background_location_permission_granted: bool,
    /// Platform background services are available.
    pub platform_services_available: bool,
    /// The device needs a protected-apps exclusion for reliable background
    /// monitoring.
    pub protected_apps_exclusion_needed: bool,
}

/// Host-side surface for device permission and settings state.
///
/// Implemented by the application shell. The boolean checks must be cheap
/// and must never prompt the user; only the asynchronous methods may
/// present OS dialogs.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait CapabilityHost: Send + Sync {
    /// Whether the device-wide location services toggle is on.
    fn is_location_services_enabled(&self) -> bool;

    /// Whether foreground location permission is granted.
    fn is_location_permission_granted(&self) -> bool;

    /// Whether background ("always") location permission is granted.
    fn is_background_location_permission_granted(&self) -> bool;

    /// Whether platform background services are available on this device.
    fn is_platform_services_available(&self) -> bool;

    /// Whether this device restricts background work unless the app is
    /// excluded through the protected-apps screen.
    fn is_protected_apps_exclusion_needed(&self) -> bool;

    /// Whether the protected-apps settings screen can be opened here.
    fn can_open_protected_apps_settings(&self) -> bool;

    /// Whether a foreground interactive context (activity, scene) is
    /// available for prompts.
    fn has_interactive_context(&self) -> bool;

    /// Prompts the user to enable device location services and resolves
    /// with their final choice.
    ///
    /// # Errors
    /// Returns an error if the OS prompt cannot be presented.
    async fn request_enable_location_services(&self) -> Result<bool, VerifyError>;

    /// Prompts the user to enable platform background services and
    /// resolves with their final choice.
    ///
    /// # Errors
    /// Returns an error if the OS prompt cannot be presented.
    async fn request_enable_platform_services(&self) -> Result<bool, VerifyError>;

    /// Opens the protected-apps settings screen.
    ///
    /// # Errors
    /// Returns an error if the screen cannot be opened.
    async fn open_protected_apps_settings(&self) -> Result<(), VerifyError>;
}

/// Gate in front of a [`CapabilityHost`] that enforces the
/// one-outstanding-prompt-per-capability rule.
pub struct CapabilityProbe {
    host: Arc<dyn CapabilityHost>,
    in_flight: Mutex<HashSet<Capability>>,
}

impl CapabilityProbe {
    /// Wraps a host implementation.
    #[must_use]
    pub fn new(host: Arc<dyn CapabilityHost>) -> Self {
        Self {
            host,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Recomputes the full precondition snapshot.
    #[must_use]
    pub fn status(&self) -> CapabilityStatus {
        CapabilityStatus {
            location_services_enabled: self.host.is_location_services_enabled(),
            location_permission_granted: self.host.is_location_permission_granted(),
            background_location_permission_granted: self
                .host
                .is_background_location_permission_granted(),
            platform_services_available: self.host.is_platform_services_available(),
            protected_apps_exclusion_needed: self
                .host
                .is_protected_apps_exclusion_needed(),
        }
    }

    /// Whether the location services toggle is on.
    #[must_use]
    pub fn is_location_services_enabled(&self) -> bool {
        self.host.is_location_services_enabled()
    }

    /// Whether foreground location permission is granted.
    #[must_use]
    pub fn is_location_permission_granted(&self) -> bool {
        self.host.is_location_permission_granted()
    }

    /// Whether background location permission is granted.
    #[must_use]
    pub fn is_background_location_permission_granted(&self) -> bool {
        self.host.is_background_location_permission_granted()
    }

    /// Whether platform background services are available.
    #[must_use]
    pub fn is_platform_services_available(&self) -> bool {
        self.host.is_platform_services_available()
    }

    /// Whether every precondition for background monitoring holds:
    /// location services on, foreground and background location
    /// permission granted.
    ///
    /// The single definition of a capability regression; the start gate
    /// and the wake suspend/resume path both use it.
    #[must_use]
    pub fn monitoring_allowed(&self) -> bool {
        self.host.is_location_services_enabled()
            && self.host.is_location_permission_granted()
            && self.host.is_background_location_permission_granted()
    }

    /// Whether the protected-apps settings screen can be opened.
    #[must_use]
    pub fn can_open_protected_apps_settings(&self) -> bool {
        self.host.can_open_protected_apps_settings()
    }

    /// Whether a foreground interactive context is available.
    #[must_use]
    pub fn has_interactive_context(&self) -> bool {
        self.host.has_interactive_context()
    }

    /// Asks the user to enable location services.
    ///
    /// Resolves immediately with success when the capability is already
    /// satisfied.
    ///
    /// # Errors
    /// [`VerifyError::NoInteractiveContext`] without a foreground context;
    /// [`VerifyError::RemediationInProgress`] while another prompt for the
    /// same capability is outstanding.
    pub async fn request_enable_location_services(&self) -> Result<bool, VerifyError> {
        if self.host.is_location_services_enabled() {
            return Ok(true);
        }
        if !self.host.has_interactive_context() {
            return Err(VerifyError::NoInteractiveContext);
        }
        let _guard = self.begin(Capability::LocationServices)?;
        self.host.request_enable_location_services().await
    }

    /// Asks the user to enable platform background services.
    ///
    /// Resolves immediately with success when the capability is already
    /// satisfied.
    ///
    /// # Errors
    /// [`VerifyError::NoInteractiveContext`] without a foreground context;
    /// [`VerifyError::RemediationInProgress`] while another prompt for the
    /// same capability is outstanding.
    pub async fn request_enable_platform_services(&self) -> Result<bool, VerifyError> {
        if self.host.is_platform_services_available() {
            return Ok(true);
        }
        if !self.host.has_interactive_context() {
            return Err(VerifyError::NoInteractiveContext);
        }
        let _guard = self.begin(Capability::PlatformServices)?;
        self.host.request_enable_platform_services().await
    }

    /// Opens the protected-apps settings screen.
    ///
    /// # Errors
    /// [`VerifyError::NoInteractiveContext`] without a foreground context;
    /// [`VerifyError::RemediationInProgress`] while the screen is already
    /// being opened.
    pub async fn open_protected_apps_settings(&self) -> Result<(), VerifyError> {
        if !self.host.has_interactive_context() {
            return Err(VerifyError::NoInteractiveContext);
        }
        let _guard = self.begin(Capability::ProtectedApps)?;
        self.host.open_protected_apps_settings().await
    }

    fn begin(&self, capability: Capability) -> Result<InFlightGuard<'_>, VerifyError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(capability) {
            return Err(VerifyError::RemediationInProgress {
                capability: capability.to_string(),
            });
        }
        Ok(InFlightGuard {
            probe: self,
            capability,
        })
    }
}

/// Marks a capability prompt as settled when dropped, including when the
/// host errors out mid-prompt.
struct InFlightGuard<'a> {
    probe: &'a CapabilityProbe,
    capability: Capability,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.probe
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.capability);
    }
}
