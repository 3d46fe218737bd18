//! The authenticated per-process context.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

use crate::{
    config::{AppMeta, NotificationConfig, VerifyConfig},
    error::VerifyError,
    Environment,
};

/// Platform tag reported in the application configuration snapshot.
const PLATFORM: &str = "verifykit";

/// Verified credentials and deployment mode for one process lifetime.
///
/// Built once by `initialize` and never mutated afterwards, so it is safe
/// to read concurrently from any number of sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    branch_id: String,
    access_token: String,
    environment: Environment,
    developer: String,
    app: AppMeta,
    notification: NotificationConfig,
}

impl AuthContext {
    /// Builds the context from a parsed configuration, deriving the access
    /// token from the tenant credentials.
    ///
    /// # Errors
    /// Returns [`VerifyError::InvalidConfiguration`] if the configured mode
    /// is not a known environment.
    pub fn from_config(config: &VerifyConfig) -> Result<Self, VerifyError> {
        let environment = config.environment()?;
        Ok(Self {
            access_token: derive_auth_token(
                &config.credentials.branch_id,
                &config.credentials.client_key,
            ),
            branch_id: config.credentials.branch_id.clone(),
            environment,
            developer: config
                .context
                .developer
                .clone()
                .unwrap_or_else(|| "external".to_string()),
            app: config.context.app.clone().unwrap_or_default(),
            notification: config.notification.clone(),
        })
    }

    /// The derived access token (base64 of `branchId:clientKey`).
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The tenant branch identifier.
    #[must_use]
    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    /// The deployment environment.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// The notification descriptor handed to the background engine.
    #[must_use]
    pub const fn notification(&self) -> &NotificationConfig {
        &self.notification
    }

    /// Serializes the configuration snapshot handed back to the shell:
    /// `{auth: {accessToken}, context: {platform, developer, mode}, app:
    /// {name, version, versionCode}}`.
    #[must_use]
    pub fn application_configuration(&self) -> String {
        json!({
            "auth": { "accessToken": self.access_token },
            "context": {
                "platform": PLATFORM,
                "developer": self.developer,
                "mode": self.environment.to_string(),
            },
            "app": {
                "name": self.app.name,
                "version": self.app.version,
                "versionCode": self.app.build,
            },
        })
        .to_string()
    }
}

/// Derives the tenant access token from raw credentials: base64 of
/// `branchId:clientKey`.
///
/// Pure and deterministic; the same credentials always produce the same
/// token. This is the value `AuthContext` caches as its access token.
#[uniffi::export]
#[must_use]
pub fn derive_auth_token(branch_id: &str, client_key: &str) -> String {
    STANDARD.encode(format!("{branch_id}:{client_key}"))
}
