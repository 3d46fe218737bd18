//! Wake triggers delivered by the push infrastructure.

use std::sync::{Arc, OnceLock};

use crate::{
    auth::AuthContext,
    capability::CapabilityProbe,
    engine::GeofenceEngine,
    error::VerifyError,
    session::{unix_now, SessionGuards, SessionState},
    store::SessionStore,
};

/// Routes asynchronous wake events (push delivery, token refresh) to the
/// sessions that need resuming.
///
/// Push delivery is at-least-once; every path here is idempotent, so a
/// duplicate wake for a healthy session degrades to a health-check.
pub(crate) struct WakeDispatcher {
    engine: Arc<dyn GeofenceEngine>,
    probe: Arc<CapabilityProbe>,
    store: Arc<SessionStore>,
    guards: Arc<SessionGuards>,
    auth: Arc<OnceLock<AuthContext>>,
}

impl WakeDispatcher {
    pub(crate) fn new(
        engine: Arc<dyn GeofenceEngine>,
        probe: Arc<CapabilityProbe>,
        store: Arc<SessionStore>,
        guards: Arc<SessionGuards>,
        auth: Arc<OnceLock<AuthContext>>,
    ) -> Self {
        Self {
            engine,
            probe,
            store,
            guards,
            auth,
        }
    }

    /// Forwards a refreshed push-registration token to the engine.
    ///
    /// Session state is untouched; failures are logged, never surfaced.
    pub(crate) async fn push_token_refreshed(&self, token: String) {
        if let Err(error) = self.engine.update_push_token(token).await {
            log::warn!("failed to forward refreshed push token: {error}");
        }
    }

    /// Resumes every session a push wake-up may concern.
    ///
    /// A failure while resuming one session is recorded against that
    /// session and never aborts the fan-out for the others.
    pub(crate) async fn push_message_received(&self) {
        let records = match self.store.list_active().await {
            Ok(records) => records,
            Err(error) => {
                log::warn!("wake dispatch aborted, session store unavailable: {error}");
                return;
            }
        };
        let capabilities_ok = self.probe.monitoring_allowed();
        for record in records {
            let location_id = record.location_id.clone();
            if let Err(error) = self.resume(&location_id, capabilities_ok).await {
                log::warn!("resume failed for session {location_id}: {error}");
                self.record_failure(&location_id, &error).await;
            }
        }
    }

    async fn resume(&self, location_id: &str, capabilities_ok: bool) -> Result<(), VerifyError> {
        let _guard = self.guards.lock(location_id).await;
        // Re-read under the lock; the session may have been stopped since
        // the fan-out snapshot was taken.
        let Some(mut record) = self.store.get(location_id).await? else {
            return Ok(());
        };
        if !matches!(
            record.state,
            SessionState::Monitoring | SessionState::Suspended
        ) {
            return Ok(());
        }

        if !capabilities_ok {
            if record.state == SessionState::Monitoring {
                record.state = SessionState::Suspended;
                self.store.put(&record).await?;
                log::info!("session {location_id} suspended: precondition regressed");
            }
            // Suspended indefinitely is not an error; the next wake after
            // the capability comes back re-enters monitoring.
            return Ok(());
        }

        if self.engine.is_registered(location_id.to_string()).await? {
            self.engine.health_check(location_id.to_string()).await?;
        } else {
            // Engine state lost (or the session was suspended): re-register
            // from the persisted request.
            let auth = self.auth.get().ok_or(VerifyError::NotInitialized)?;
            self.engine.register(record.registration(auth)?).await?;
            log::info!("session {location_id} re-registered after wake");
        }
        record.state = SessionState::Monitoring;
        record.last_resumed_at = unix_now();
        record.last_error = None;
        self.store.put(&record).await
    }

    /// Best-effort annotation of a resume failure on the session record.
    async fn record_failure(&self, location_id: &str, error: &VerifyError) {
        let _guard = self.guards.lock(location_id).await;
        let Ok(Some(mut record)) = self.store.get(location_id).await else {
            return;
        };
        record.last_error = Some(error.to_string());
        if let Err(error) = self.store.put(&record).await {
            log::warn!("could not record failure for session {location_id}: {error}");
        }
    }
}
