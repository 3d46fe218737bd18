use thiserror::Error;

/// Error outputs from `VerifyKit`.
///
/// Every variant carries a stable snake_case code in its display string so
/// the application shell can match on it across SDK versions.
#[derive(Debug, Clone, Error, uniffi::Error)]
pub enum VerifyError {
    /// The configuration blob passed to `initialize` is missing required
    /// keys or cannot be parsed.
    #[error("invalid_configuration: {reason}")]
    InvalidConfiguration {
        /// What the configuration was missing or what failed to parse.
        reason: String,
    },

    /// An operation that requires `initialize` was called before it.
    #[error("not_initialized")]
    NotInitialized,

    /// The verification request failed validation.
    #[error("invalid_request: {attribute}: {reason}")]
    InvalidRequest {
        /// The offending request attribute.
        attribute: String,
        /// Why the attribute was rejected.
        reason: String,
    },

    /// A remediation prompt needs a foreground interactive context and none
    /// is currently available.
    #[error("no_interactive_context")]
    NoInteractiveContext,

    /// A remediation prompt for the same capability is already outstanding.
    #[error("remediation_in_progress: {capability}")]
    RemediationInProgress {
        /// The capability with an outstanding prompt.
        capability: String,
    },

    /// The geofence engine rejected or failed a registration.
    #[error("engine_registration_error: {reason}")]
    EngineRegistration {
        /// The engine's diagnostic.
        reason: String,
    },

    /// The engine, or the OS surface it needs, is unavailable.
    #[error("engine_unavailable: {reason}")]
    EngineUnavailable {
        /// What was unavailable.
        reason: String,
    },

    /// No session exists for the given location id.
    ///
    /// `stop_address_verification` never surfaces this; stopping an absent
    /// session is treated as success.
    #[error("not_found: {location_id}")]
    NotFound {
        /// The location id with no session.
        location_id: String,
    },

    /// Catch-all with the original diagnostic attached.
    #[error("unknown_error: {detail}")]
    Unknown {
        /// The original diagnostic.
        detail: String,
    },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for VerifyError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Unknown {
            detail: error.reason,
        }
    }
}
