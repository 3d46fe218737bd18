//! Typed configuration for the bridge `initialize` call.
//!
//! The application shell hands over a single JSON blob. It is parsed into
//! the structs below with explicitly enumerated optional fields; anything
//! missing or malformed surfaces as [`VerifyError::InvalidConfiguration`],
//! never as a panic or a generic serialization error.

use std::str::FromStr;

use serde::Deserialize;

use crate::{error::VerifyError, Environment};

/// Default notification title shown while monitoring runs.
pub const DEFAULT_NOTIFICATION_TITLE: &str = "Address verification in progress";
/// Default notification body.
pub const DEFAULT_NOTIFICATION_TEXT: &str = "We're confirming your address";
/// Default notification channel identifier.
pub const DEFAULT_NOTIFICATION_CHANNEL_ID: &str = "address-verification";
/// Default notification channel display name.
pub const DEFAULT_NOTIFICATION_CHANNEL_NAME: &str = "Address verification";
/// Default notification channel description.
pub const DEFAULT_NOTIFICATION_CHANNEL_DESCRIPTION: &str =
    "Updates about address verification";

/// Opaque tenant credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Tenant branch identifier.
    pub branch_id: String,
    /// Tenant client key.
    pub client_key: String,
}

/// Static application metadata reported alongside verification results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMeta {
    /// Application display name.
    #[serde(default = "unknown_string")]
    pub name: String,
    /// Application version string.
    #[serde(default = "unknown_string")]
    pub version: String,
    /// Application build number.
    #[serde(default)]
    pub build: u64,
}

impl Default for AppMeta {
    fn default() -> Self {
        Self {
            name: unknown_string(),
            version: unknown_string(),
            build: 0,
        }
    }
}

fn unknown_string() -> String {
    "unknown".to_string()
}

/// Deployment context block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfig {
    /// Deployment mode tag (`sandbox`, `prod` or `dev`).
    pub mode: String,
    /// Who integrates the SDK; defaults to `external`.
    #[serde(default)]
    pub developer: Option<String>,
    /// Application metadata, when the shell can supply it.
    #[serde(default)]
    pub app: Option<AppMeta>,
}

/// Descriptor for the local notification shown by the background engine
/// while monitoring is active.
///
/// Every field is optional in the configuration blob; omitted fields fall
/// back to the `DEFAULT_NOTIFICATION_*` constants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    /// Notification title.
    #[serde(default = "default_title")]
    pub title: String,
    /// Notification body text.
    #[serde(default = "default_text")]
    pub text: String,
    /// Notification channel identifier.
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
    /// Notification channel display name.
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    /// Notification channel description.
    #[serde(default = "default_channel_description")]
    pub channel_description: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            text: default_text(),
            channel_id: default_channel_id(),
            channel_name: default_channel_name(),
            channel_description: default_channel_description(),
        }
    }
}

fn default_title() -> String {
    DEFAULT_NOTIFICATION_TITLE.to_string()
}

fn default_text() -> String {
    DEFAULT_NOTIFICATION_TEXT.to_string()
}

fn default_channel_id() -> String {
    DEFAULT_NOTIFICATION_CHANNEL_ID.to_string()
}

fn default_channel_name() -> String {
    DEFAULT_NOTIFICATION_CHANNEL_NAME.to_string()
}

fn default_channel_description() -> String {
    DEFAULT_NOTIFICATION_CHANNEL_DESCRIPTION.to_string()
}

/// The full configuration record accepted by `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyConfig {
    /// Tenant credentials.
    pub credentials: Credentials,
    /// Deployment context.
    pub context: ContextConfig,
    /// Notification descriptor; defaults apply when omitted.
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl VerifyConfig {
    /// Parses and validates a configuration blob.
    ///
    /// # Errors
    /// Returns [`VerifyError::InvalidConfiguration`] if the JSON cannot be
    /// parsed, required keys are missing, credentials are empty, or the
    /// mode is not a known environment.
    pub fn from_json(json: &str) -> Result<Self, VerifyError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            VerifyError::InvalidConfiguration {
                reason: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the configured mode string into an [`Environment`].
    ///
    /// # Errors
    /// Returns [`VerifyError::InvalidConfiguration`] for unknown modes.
    pub fn environment(&self) -> Result<Environment, VerifyError> {
        Environment::from_str(&self.context.mode).map_err(|_| {
            VerifyError::InvalidConfiguration {
                reason: format!("unknown mode `{}`", self.context.mode),
            }
        })
    }

    fn validate(&self) -> Result<(), VerifyError> {
        if self.credentials.branch_id.trim().is_empty() {
            return Err(VerifyError::InvalidConfiguration {
                reason: "credentials.branchId must not be empty".to_string(),
            });
        }
        if self.credentials.client_key.trim().is_empty() {
            return Err(VerifyError::InvalidConfiguration {
                reason: "credentials.clientKey must not be empty".to_string(),
            });
        }
        self.environment()?;
        Ok(())
    }
}
