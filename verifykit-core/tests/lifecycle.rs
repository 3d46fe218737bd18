//! End-to-end lifecycle tests driving the public verifier surface with
//! in-process host implementations.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use std::collections::HashMap;

use verifykit_core::{
    derive_auth_token, AddressVerifier, CapabilityHost, ForegroundIndicatorHost,
    GeofenceEngine, GeofenceRegistration, SessionState, SessionStoreBackend,
    VerificationRequest, VerifyError,
};

const CONFIG: &str =
    r#"{"credentials":{"branchId":"b1","clientKey":"k1"},"context":{"mode":"sandbox"}}"#;

#[derive(Default)]
struct MockEngine {
    registered: Mutex<HashSet<String>>,
    register_calls: AtomicU32,
    fail_register: AtomicBool,
    failing_health_checks: Mutex<HashSet<String>>,
    push_tokens: Mutex<Vec<String>>,
}

impl MockEngine {
    fn is_live(&self, location_id: &str) -> bool {
        self.registered.lock().unwrap().contains(location_id)
    }

    fn forget_all(&self) {
        self.registered.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl GeofenceEngine for MockEngine {
    async fn register(&self, registration: GeofenceRegistration) -> Result<(), VerifyError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(VerifyError::EngineRegistration {
                reason: "device not supported".to_string(),
            });
        }
        self.registered.lock().unwrap().insert(registration.location_id);
        Ok(())
    }

    async fn deregister(&self, location_id: String) -> Result<(), VerifyError> {
        self.registered.lock().unwrap().remove(&location_id);
        Ok(())
    }

    async fn is_registered(&self, location_id: String) -> Result<bool, VerifyError> {
        Ok(self.registered.lock().unwrap().contains(&location_id))
    }

    async fn health_check(&self, location_id: String) -> Result<(), VerifyError> {
        if self
            .failing_health_checks
            .lock()
            .unwrap()
            .contains(&location_id)
        {
            return Err(VerifyError::EngineUnavailable {
                reason: format!("health check failed for {location_id}"),
            });
        }
        Ok(())
    }

    async fn update_push_token(&self, token: String) -> Result<(), VerifyError> {
        self.push_tokens.lock().unwrap().push(token);
        Ok(())
    }
}

struct MockCapabilities {
    location_services: AtomicBool,
    location_permission: AtomicBool,
    background_permission: AtomicBool,
    interactive: AtomicBool,
}

impl Default for MockCapabilities {
    fn default() -> Self {
        Self {
            location_services: AtomicBool::new(true),
            location_permission: AtomicBool::new(true),
            background_permission: AtomicBool::new(true),
            interactive: AtomicBool::new(true),
        }
    }
}

#[async_trait::async_trait]
impl CapabilityHost for MockCapabilities {
    fn is_location_services_enabled(&self) -> bool {
        self.location_services.load(Ordering::SeqCst)
    }
    fn is_location_permission_granted(&self) -> bool {
        self.location_permission.load(Ordering::SeqCst)
    }
    fn is_background_location_permission_granted(&self) -> bool {
        self.background_permission.load(Ordering::SeqCst)
    }
    fn is_platform_services_available(&self) -> bool {
        true
    }
    fn is_protected_apps_exclusion_needed(&self) -> bool {
        false
    }
    fn can_open_protected_apps_settings(&self) -> bool {
        false
    }
    fn has_interactive_context(&self) -> bool {
        self.interactive.load(Ordering::SeqCst)
    }
    async fn request_enable_location_services(&self) -> Result<bool, VerifyError> {
        self.location_services.store(true, Ordering::SeqCst);
        Ok(true)
    }
    async fn request_enable_platform_services(&self) -> Result<bool, VerifyError> {
        Ok(true)
    }
    async fn open_protected_apps_settings(&self) -> Result<(), VerifyError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl SessionStoreBackend for MemoryBackend {
    fn read(&self, key: String) -> Result<Option<Vec<u8>>, VerifyError> {
        Ok(self.entries.lock().unwrap().get(&key).cloned())
    }
    fn write(&self, key: String, value: Vec<u8>) -> Result<(), VerifyError> {
        self.entries.lock().unwrap().insert(key, value);
        Ok(())
    }
    fn delete(&self, key: String) -> Result<(), VerifyError> {
        self.entries.lock().unwrap().remove(&key);
        Ok(())
    }
    fn keys(&self) -> Result<Vec<String>, VerifyError> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }
}

#[derive(Default)]
struct FakeIndicator {
    running: AtomicBool,
}

impl ForegroundIndicatorHost for FakeIndicator {
    fn start(&self) -> Result<(), VerifyError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn stop(&self) -> Result<(), VerifyError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct Harness {
    verifier: Arc<AddressVerifier>,
    engine: Arc<MockEngine>,
    capabilities: Arc<MockCapabilities>,
}

fn harness() -> Harness {
    let engine = Arc::new(MockEngine::default());
    let capabilities = Arc::new(MockCapabilities::default());
    let verifier = AddressVerifier::new(
        Arc::clone(&engine) as _,
        Arc::clone(&capabilities) as _,
        Arc::new(MemoryBackend::default()),
        Arc::new(FakeIndicator::default()),
    );
    Harness {
        verifier: Arc::new(verifier),
        engine,
        capabilities,
    }
}

fn request(location_id: &str) -> VerificationRequest {
    VerificationRequest {
        phone_number: "+254700000000".to_string(),
        user_id: None,
        location_id: location_id.to_string(),
        latitude: -1.2,
        longitude: 36.8,
        usage_types: vec![],
        with_foreground: true,
    }
}

#[test]
fn auth_token_is_base64_of_branch_and_key() {
    assert_eq!(derive_auth_token("b1", "k1"), "YjE6azE=");
}

#[tokio::test]
async fn operations_require_initialization() {
    let h = harness();
    let error = h
        .verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap_err();
    assert!(matches!(error, VerifyError::NotInitialized));
    assert!(matches!(
        h.verifier.get_application_configuration().unwrap_err(),
        VerifyError::NotInitialized
    ));
    assert_eq!(h.engine.register_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn full_lifecycle_start_status_stop() {
    let h = harness();
    assert!(h.verifier.initialize(CONFIG).unwrap());
    let app_config = h.verifier.get_application_configuration().unwrap();
    assert!(app_config.contains("YjE6azE="));

    let token = h
        .verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();
    assert!(!token.is_empty());
    assert!(h.engine.is_live("loc-1"));

    let status = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Monitoring);
    assert_eq!(status.token, token);
    assert_eq!(status.last_error, None);

    h.verifier.stop_address_verification("loc-1").await.unwrap();
    assert!(!h.engine.is_live("loc-1"));
    assert!(matches!(
        h.verifier.get_verification_status("loc-1").await.unwrap_err(),
        VerifyError::NotFound { .. }
    ));

    // Stopping again is a successful no-op.
    h.verifier.stop_address_verification("loc-1").await.unwrap();
}

#[tokio::test]
async fn invalid_requests_never_reach_the_engine() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();

    let mut bad = request("loc-1");
    bad.phone_number = "0712345678".to_string();
    let error = h.verifier.start_address_verification(bad).await.unwrap_err();
    assert!(matches!(
        error,
        VerifyError::InvalidRequest { ref attribute, .. } if attribute == "phoneNumber"
    ));
    assert_eq!(h.engine.register_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_background_permission_blocks_registration() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    h.capabilities
        .background_permission
        .store(false, Ordering::SeqCst);

    let error = h
        .verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap_err();
    assert!(matches!(error, VerifyError::EngineRegistration { .. }));
    assert_eq!(h.engine.register_calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        h.verifier.get_verification_status("loc-1").await.unwrap_err(),
        VerifyError::NotFound { .. }
    ));
}

#[tokio::test]
async fn restart_keeps_the_token_and_updates_parameters() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();

    let first = h
        .verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();

    let mut updated = request("loc-1");
    updated.latitude = -1.5;
    let second = h
        .verifier
        .start_address_verification(updated)
        .await
        .unwrap();
    assert_eq!(first, second);

    let status = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Monitoring);
    // The live registration was refreshed with the new parameters.
    assert_eq!(h.engine.register_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn registration_failure_leaves_nothing_behind() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    h.engine.fail_register.store(true, Ordering::SeqCst);

    let error = h
        .verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap_err();
    assert!(matches!(error, VerifyError::EngineRegistration { .. }));
    assert!(matches!(
        h.verifier.get_verification_status("loc-1").await.unwrap_err(),
        VerifyError::NotFound { .. }
    ));
    assert!(!h.verifier.is_foreground_service_running());
}

#[tokio::test]
async fn wake_suspends_then_resumes_when_capabilities_return() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    h.verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();

    h.capabilities
        .background_permission
        .store(false, Ordering::SeqCst);
    h.verifier.on_push_message_received().await;
    let status = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Suspended);
    // Suspension does not tear down the engine registration.
    assert!(h.engine.is_live("loc-1"));

    h.capabilities
        .background_permission
        .store(true, Ordering::SeqCst);
    // Simulate the OS reclaiming engine state while suspended.
    h.engine.forget_all();
    h.verifier.on_push_message_received().await;

    let status = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Monitoring);
    assert!(h.engine.is_live("loc-1"));
}

#[tokio::test]
async fn restart_returns_a_suspended_session_to_monitoring() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    let token = h
        .verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();

    h.capabilities
        .background_permission
        .store(false, Ordering::SeqCst);
    h.verifier.on_push_message_received().await;
    let status = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Suspended);

    // The permission comes back and the shell starts again instead of
    // waiting for the next wake.
    h.capabilities
        .background_permission
        .store(true, Ordering::SeqCst);
    let restarted = h
        .verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();
    assert_eq!(restarted, token);

    let status = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Monitoring);
}

#[tokio::test]
async fn wake_treats_missing_foreground_permission_as_a_regression() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    h.verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();

    // Foreground location permission gates starts, so losing it must
    // suspend monitoring too.
    h.capabilities
        .location_permission
        .store(false, Ordering::SeqCst);
    h.verifier.on_push_message_received().await;

    let status = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Suspended);
}

#[tokio::test]
async fn wake_failure_for_one_session_does_not_block_others() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    h.verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();
    h.verifier
        .start_address_verification(request("loc-2"))
        .await
        .unwrap();

    h.engine
        .failing_health_checks
        .lock()
        .unwrap()
        .insert("loc-1".to_string());
    h.verifier.on_push_message_received().await;

    let failed = h.verifier.get_verification_status("loc-1").await.unwrap();
    assert!(failed.last_error.is_some());

    let healthy = h.verifier.get_verification_status("loc-2").await.unwrap();
    assert_eq!(healthy.state, SessionState::Monitoring);
    assert_eq!(healthy.last_error, None);
}

#[tokio::test]
async fn indicator_runs_until_the_last_session_stops() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();

    h.verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();
    h.verifier
        .start_address_verification(request("loc-2"))
        .await
        .unwrap();
    assert!(h.verifier.is_foreground_service_running());

    h.verifier.stop_address_verification("loc-1").await.unwrap();
    assert!(h.verifier.is_foreground_service_running());

    h.verifier.stop_address_verification("loc-2").await.unwrap();
    assert!(!h.verifier.is_foreground_service_running());
}

#[tokio::test]
async fn manual_foreground_stop_defers_to_sessions() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    h.verifier
        .start_address_verification(request("loc-1"))
        .await
        .unwrap();

    h.verifier.start_foreground_service().unwrap();
    h.verifier.stop_foreground_service().unwrap();
    assert!(h.verifier.is_foreground_service_running());

    h.verifier.stop_address_verification("loc-1").await.unwrap();
    assert!(!h.verifier.is_foreground_service_running());
}

#[tokio::test]
async fn refreshed_push_tokens_are_forwarded() {
    let h = harness();
    h.verifier.initialize(CONFIG).unwrap();
    h.verifier
        .on_push_token_refreshed("push-token-1".to_string())
        .await;
    assert_eq!(
        h.engine.push_tokens.lock().unwrap().as_slice(),
        ["push-token-1"]
    );
}

#[tokio::test]
async fn sessions_survive_a_process_restart() {
    let backend = Arc::new(MemoryBackend::default());
    let engine = Arc::new(MockEngine::default());

    {
        let verifier = AddressVerifier::new(
            Arc::clone(&engine) as _,
            Arc::new(MockCapabilities::default()),
            Arc::clone(&backend) as _,
            Arc::new(FakeIndicator::default()),
        );
        verifier.initialize(CONFIG).unwrap();
        verifier
            .start_address_verification(request("loc-1"))
            .await
            .unwrap();
    }

    // New process: fresh verifier over the same durable backend, engine
    // state lost.
    engine.forget_all();
    let verifier = AddressVerifier::new(
        Arc::clone(&engine) as _,
        Arc::new(MockCapabilities::default()),
        Arc::clone(&backend) as _,
        Arc::new(FakeIndicator::default()),
    );
    verifier.initialize(CONFIG).unwrap();
    verifier.on_push_message_received().await;

    let status = verifier.get_verification_status("loc-1").await.unwrap();
    assert_eq!(status.state, SessionState::Monitoring);
    assert!(engine.is_live("loc-1"));
}
