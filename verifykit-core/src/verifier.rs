//! The boundary object exposed to the application shell.

use std::sync::{Arc, OnceLock};

use crate::{
    auth::AuthContext,
    capability::{CapabilityHost, CapabilityProbe, CapabilityStatus},
    config::VerifyConfig,
    engine::GeofenceEngine,
    error::VerifyError,
    foreground::{ForegroundIndicatorHost, ForegroundSupervisor},
    session::{unix_now, SessionGuards, SessionRecord, SessionState, SessionStatus,
        VerificationRequest},
    store::{SessionStore, SessionStoreBackend},
    wake::WakeDispatcher,
};

/// Entry point for address verification.
///
/// Constructed once per process with the four platform collaborators.
/// `initialize` must be called before any verification operation; the
/// capability checks and remediation prompts work without it.
///
/// Operations on the same location id are serialized; operations on
/// different location ids run fully in parallel.
#[derive(uniffi::Object)]
pub struct AddressVerifier {
    auth: Arc<OnceLock<AuthContext>>,
    probe: Arc<CapabilityProbe>,
    engine: Arc<dyn GeofenceEngine>,
    store: Arc<SessionStore>,
    foreground: ForegroundSupervisor,
    guards: Arc<SessionGuards>,
    dispatcher: WakeDispatcher,
}

#[uniffi::export(async_runtime = "tokio")]
impl AddressVerifier {
    /// Creates a verifier wired to the platform collaborators.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        engine: Arc<dyn GeofenceEngine>,
        capabilities: Arc<dyn CapabilityHost>,
        store: Arc<dyn SessionStoreBackend>,
        foreground: Arc<dyn ForegroundIndicatorHost>,
    ) -> Self {
        let auth = Arc::new(OnceLock::new());
        let probe = Arc::new(CapabilityProbe::new(capabilities));
        let store = Arc::new(SessionStore::new(store));
        let guards = Arc::new(SessionGuards::default());
        let dispatcher = WakeDispatcher::new(
            Arc::clone(&engine),
            Arc::clone(&probe),
            Arc::clone(&store),
            Arc::clone(&guards),
            Arc::clone(&auth),
        );
        Self {
            auth,
            probe,
            engine,
            store,
            foreground: ForegroundSupervisor::new(foreground),
            guards,
            dispatcher,
        }
    }

    /// Builds the process-wide auth context from the configuration blob.
    ///
    /// Returns whether a foreground interactive context is currently
    /// available; until one is, remediation prompts fail with
    /// `no_interactive_context`. Calling again after a successful
    /// initialization is a no-op; the first context wins for the process
    /// lifetime.
    ///
    /// # Errors
    /// Returns [`VerifyError::InvalidConfiguration`] for a malformed blob.
    pub fn initialize(&self, configuration: &str) -> Result<bool, VerifyError> {
        let config = VerifyConfig::from_json(configuration)?;
        let context = AuthContext::from_config(&config)?;
        if self.auth.set(context).is_err() {
            log::debug!("initialize called again; keeping the existing auth context");
        }
        Ok(self.probe.has_interactive_context())
    }

    /// Serialized `{auth, context, app}` snapshot of the initialized
    /// configuration.
    ///
    /// # Errors
    /// Returns [`VerifyError::NotInitialized`] before `initialize`.
    pub fn get_application_configuration(&self) -> Result<String, VerifyError> {
        Ok(self.auth_context()?.application_configuration())
    }

    /// Whether the device-wide location services toggle is on.
    #[must_use]
    pub fn is_location_services_enabled(&self) -> bool {
        self.probe.is_location_services_enabled()
    }

    /// Whether foreground location permission is granted.
    #[must_use]
    pub fn is_location_permission_granted(&self) -> bool {
        self.probe.is_location_permission_granted()
    }

    /// Whether background ("always") location permission is granted.
    #[must_use]
    pub fn is_background_location_permission_granted(&self) -> bool {
        self.probe.is_background_location_permission_granted()
    }

    /// Whether platform background services are available.
    #[must_use]
    pub fn is_platform_services_available(&self) -> bool {
        self.probe.is_platform_services_available()
    }

    /// Full precondition snapshot, recomputed on every call.
    #[must_use]
    pub fn capability_status(&self) -> CapabilityStatus {
        self.probe.status()
    }

    /// Prompts the user to enable location services.
    ///
    /// # Errors
    /// See [`CapabilityProbe::request_enable_location_services`].
    pub async fn request_enable_location_services(&self) -> Result<bool, VerifyError> {
        self.probe.request_enable_location_services().await
    }

    /// Prompts the user to enable platform background services.
    ///
    /// # Errors
    /// See [`CapabilityProbe::request_enable_platform_services`].
    pub async fn request_enable_platform_services(&self) -> Result<bool, VerifyError> {
        self.probe.request_enable_platform_services().await
    }

    /// Whether the protected-apps settings screen can be opened here.
    #[must_use]
    pub fn can_open_protected_apps_settings(&self) -> bool {
        self.probe.can_open_protected_apps_settings()
    }

    /// Opens the protected-apps settings screen.
    ///
    /// # Errors
    /// See [`CapabilityProbe::open_protected_apps_settings`].
    pub async fn open_protected_apps_settings(&self) -> Result<(), VerifyError> {
        self.probe.open_protected_apps_settings().await
    }

    /// Starts, or restarts, address verification for the request's
    /// location id and returns the verification-result token.
    ///
    /// A second start for a location id with a live session replaces the
    /// stale request parameters in place without losing monitoring
    /// continuity, and returns the original token.
    ///
    /// # Errors
    /// [`VerifyError::NotInitialized`] before `initialize`;
    /// [`VerifyError::InvalidRequest`] for a malformed request;
    /// [`VerifyError::EngineRegistration`] when a capability precondition
    /// fails or the engine rejects the registration.
    pub async fn start_address_verification(
        &self,
        request: VerificationRequest,
    ) -> Result<String, VerifyError> {
        let auth = self.auth_context()?;
        request.validate()?;
        let _guard = self.guards.lock(&request.location_id).await;
        self.gate_capabilities()?;

        let now = unix_now();
        if let Some(mut record) = self.store.get(&request.location_id).await? {
            return self.restart_session(&mut record, request, auth, now).await;
        }

        let mut record = SessionRecord::new(request, now);
        self.store.put(&record).await?;
        if record.request.with_foreground {
            // OS rules: the indicator must be up before monitoring starts.
            self.foreground.acquire()?;
        }
        match self.engine.register(record.registration(auth)?).await {
            Ok(()) => {
                record.state = SessionState::Monitoring;
                record.last_resumed_at = unix_now();
                self.store.put(&record).await?;
                log::info!("session {} monitoring", record.location_id);
                Ok(record.token)
            }
            Err(error) => {
                // Terminal failure: report once and leave nothing behind.
                if record.request.with_foreground {
                    if let Err(release_error) = self.foreground.release() {
                        log::warn!("foreground release after failed start: {release_error}");
                    }
                }
                self.store.remove(&record.location_id).await?;
                Err(as_registration_error(error))
            }
        }
    }

    /// Stops address verification for `location_id`.
    ///
    /// Idempotent: stopping a location id with no active session resolves
    /// successfully. A stop racing an in-flight start waits for the
    /// registration to settle first, so no orphaned engine registration
    /// is left behind.
    ///
    /// # Errors
    /// Propagates an engine error if deregistration fails; the session
    /// record is kept so the stop can be retried.
    pub async fn stop_address_verification(&self, location_id: &str) -> Result<(), VerifyError> {
        let _guard = self.guards.lock(location_id).await;
        let Some(mut record) = self.store.get(location_id).await? else {
            return Ok(());
        };
        record.state = SessionState::Stopping;
        self.store.put(&record).await?;
        self.engine.deregister(location_id.to_string()).await?;
        if record.request.with_foreground {
            self.foreground.release()?;
        }
        self.store.remove(location_id).await?;
        log::info!("session {location_id} stopped");
        Ok(())
    }

    /// Status snapshot for the session keyed by `location_id`, including
    /// any engine failure recorded against it since the last query.
    ///
    /// # Errors
    /// Returns [`VerifyError::NotFound`] when no session exists.
    pub async fn get_verification_status(
        &self,
        location_id: &str,
    ) -> Result<SessionStatus, VerifyError> {
        let _guard = self.guards.lock(location_id).await;
        let record = self.store.get(location_id).await?.ok_or_else(|| {
            VerifyError::NotFound {
                location_id: location_id.to_string(),
            }
        })?;
        Ok(SessionStatus::from(&record))
    }

    /// Takes the manual foreground hold; a no-op success while running.
    ///
    /// # Errors
    /// Returns [`VerifyError::EngineUnavailable`] if the indicator cannot
    /// be started.
    pub fn start_foreground_service(&self) -> Result<(), VerifyError> {
        self.foreground.start_manual()
    }

    /// Clears the manual foreground hold; the indicator keeps running
    /// while any foreground-requiring session is still active.
    ///
    /// # Errors
    /// Propagates a host error if the indicator fails to stop.
    pub fn stop_foreground_service(&self) -> Result<(), VerifyError> {
        self.foreground.stop_manual()
    }

    /// Whether the foreground indicator is currently visible.
    #[must_use]
    pub fn is_foreground_service_running(&self) -> bool {
        self.foreground.is_running()
    }

    /// Handles a refreshed push-registration token.
    ///
    /// Always succeeds locally; forwarding failures are logged.
    pub async fn on_push_token_refreshed(&self, token: String) {
        self.dispatcher.push_token_refreshed(token).await;
    }

    /// Handles a delivered push message by resuming every session in
    /// `monitoring` or `suspended`.
    ///
    /// Always succeeds locally; per-session failures are recorded against
    /// the session and logged.
    pub async fn on_push_message_received(&self) {
        self.dispatcher.push_message_received().await;
    }
}

impl AddressVerifier {
    fn auth_context(&self) -> Result<&AuthContext, VerifyError> {
        self.auth.get().ok_or(VerifyError::NotInitialized)
    }

    /// The capability gate in front of engine registration; when it
    /// fails, no registration is ever issued.
    fn gate_capabilities(&self) -> Result<(), VerifyError> {
        if !self.probe.is_location_services_enabled() {
            return Err(VerifyError::EngineRegistration {
                reason: "location services are disabled".to_string(),
            });
        }
        if !self.probe.monitoring_allowed() {
            return Err(VerifyError::EngineRegistration {
                reason: "location permission not granted for background monitoring"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// In-place restart of a live session: replaces the request snapshot,
    /// re-registers, and adjusts the foreground hold when the restart
    /// flips `with_foreground`.
    async fn restart_session(
        &self,
        record: &mut SessionRecord,
        request: VerificationRequest,
        auth: &AuthContext,
        now: u64,
    ) -> Result<String, VerifyError> {
        let held_foreground = record.request.with_foreground;
        record.request = request;
        record.last_resumed_at = now;
        record.last_error = None;

        // Registering again refreshes the parameters of a live
        // registration and re-establishes a lost one; either way the
        // engine's acknowledgement puts the session back in monitoring,
        // whatever state (suspended, a wedged stop) it was left in.
        self.engine
            .register(record.registration(auth)?)
            .await
            .map_err(as_registration_error)?;
        record.state = SessionState::Monitoring;

        if record.request.with_foreground && !held_foreground {
            self.foreground.acquire()?;
        } else if !record.request.with_foreground && held_foreground {
            self.foreground.release()?;
        }
        self.store.put(record).await?;
        log::info!("session {} restarted in place", record.location_id);
        Ok(record.token.clone())
    }
}

fn as_registration_error(error: VerifyError) -> VerifyError {
    match error {
        error @ VerifyError::EngineRegistration { .. } => error,
        other => VerifyError::EngineRegistration {
            reason: other.to_string(),
        },
    }
}
