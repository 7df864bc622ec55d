use auriga::config::TeslaConfig;
use auriga::persistence::{PersistenceManager, StoredTokens, TokenStore};
use auriga::tesla::{ApiRequest, CommandExecutor, Credentials, TeslaClient};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    responses: Mutex<VecDeque<Vec<u8>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockState {
    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ApiRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

struct MockExecutor {
    state: Arc<MockState>,
}

#[async_trait::async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, request: &ApiRequest) -> Vec<u8> {
        self.state.requests.lock().unwrap().push(request.clone());
        self.state
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    }
}

fn scripted(responses: &[&[u8]]) -> (Box<dyn CommandExecutor>, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    {
        let mut queue = state.responses.lock().unwrap();
        for response in responses {
            queue.push_back(response.to_vec());
        }
    }
    let executor = MockExecutor {
        state: state.clone(),
    };
    (Box::new(executor), state)
}

fn test_config() -> TeslaConfig {
    TeslaConfig {
        base_url: "https://owner-api.example.invalid".to_string(),
        ..TeslaConfig::default()
    }
}

fn test_credentials() -> Credentials {
    Credentials {
        email: "owner@example.invalid".to_string(),
        password: "hunter2".to_string(),
    }
}

fn now_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

const TOKEN_GRANT: &[u8] = br#"{"access_token":"tok1","token_type":"bearer","expires_in":3888000,"refresh_token":"rt1","created_at":1525232970}"#;
const TWO_VEHICLES: &[u8] =
    br#"{"count":2,"response":[{"id":90123,"vin":"5YJSA"},{"id":90456,"vin":"5YJSB"}]}"#;
const ONE_VEHICLE: &[u8] = br#"{"count":1,"response":[{"id":90123}]}"#;
const WAKE_ONLINE: &[u8] = br#"{"response":{"state":"online"}}"#;
const WAKE_ASLEEP: &[u8] = br#"{"response":{"state":"asleep"}}"#;

#[tokio::test(start_paused = true)]
async fn global_backoff_suppresses_all_requests() {
    let (executor, state) = scripted(&[TOKEN_GRANT]);
    let mut client = TeslaClient::with_executor(test_config(), executor);

    client.record_api_error();
    assert!(!client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn password_grant_bootstrap_and_idempotent_second_pass() {
    let (executor, state) = scripted(&[TOKEN_GRANT, TWO_VEHICLES, WAKE_ONLINE, WAKE_ONLINE]);
    let mut client = TeslaClient::with_executor(test_config(), executor);

    let before = now_epoch();
    assert!(client.available(Some(&test_credentials()), false).await);

    // One password grant, one list call, one wake per vehicle
    assert_eq!(state.request_count(), 4);
    let grant = state.request(0);
    assert!(grant.url.ends_with("/oauth/token"));
    assert!(grant.bearer.is_none());
    let body = grant.body.unwrap();
    assert_eq!(body["grant_type"], "password");
    assert_eq!(body["email"], "owner@example.invalid");

    let list = state.request(1);
    assert!(list.url.ends_with("/api/1/vehicles"));
    assert_eq!(list.bearer.as_deref(), Some("tok1"));

    assert!(state.request(2).url.ends_with("/api/1/vehicles/90123/wake_up"));
    assert!(state.request(3).url.ends_with("/api/1/vehicles/90456/wake_up"));

    // Token pair updated together, expiry anchored at the call time
    assert_eq!(client.bearer_token(), "tok1");
    assert!((client.token_expire_time() - (before + 3_888_000.0)).abs() < 10.0);

    // Handles exist in list order and are awake
    assert_eq!(client.vehicle_count(), 2);
    assert_eq!(client.vehicles()[0].id, 90123);
    assert_eq!(client.vehicles()[1].id, 90456);
    assert!(client.vehicle_ready(0));
    assert!(client.vehicle_ready(1));

    // Immediate second pass issues no further requests
    assert!(client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn refresh_grant_is_preferred_over_password() {
    let (executor, state) = scripted(&[TOKEN_GRANT, ONE_VEHICLE, WAKE_ONLINE]);
    let mut client = TeslaClient::with_executor(test_config(), executor);
    client.restore_tokens(&StoredTokens {
        bearer_token: String::new(),
        refresh_token: "rt0".to_string(),
        token_expire_time: 0.0,
        saved_at: chrono::Utc::now(),
    });

    assert!(client.available(Some(&test_credentials()), false).await);

    let body = state.request(0).body.unwrap();
    assert_eq!(body["grant_type"], "refresh_token");
    assert_eq!(body["refresh_token"], "rt0");
    assert_eq!(client.bearer_token(), "tok1");
}

#[tokio::test(start_paused = true)]
async fn near_expiry_token_is_renewed() {
    let (executor, state) = scripted(&[TOKEN_GRANT, ONE_VEHICLE, WAKE_ONLINE]);
    let mut client = TeslaClient::with_executor(test_config(), executor);
    client.restore_tokens(&StoredTokens {
        bearer_token: "oldtok".to_string(),
        refresh_token: "rt0".to_string(),
        // One day out, well inside the 30-day renewal window
        token_expire_time: now_epoch() + 86_400.0,
        saved_at: chrono::Utc::now(),
    });

    assert!(client.available(None, false).await);
    assert!(state.request(0).url.ends_with("/oauth/token"));
    assert_eq!(client.bearer_token(), "tok1");
}

#[tokio::test(start_paused = true)]
async fn fresh_token_skips_renewal() {
    let (executor, state) = scripted(&[ONE_VEHICLE, WAKE_ONLINE]);
    let mut client = TeslaClient::with_executor(test_config(), executor);
    client.restore_tokens(&StoredTokens {
        bearer_token: "oldtok".to_string(),
        refresh_token: "rt0".to_string(),
        token_expire_time: now_epoch() + 45.0 * 86_400.0,
        saved_at: chrono::Utc::now(),
    });

    assert!(client.available(None, false).await);
    assert!(state.request(0).url.ends_with("/api/1/vehicles"));
    assert_eq!(client.bearer_token(), "oldtok");
}

#[tokio::test(start_paused = true)]
async fn failed_grant_clears_tokens_and_starts_backoff() {
    let (executor, state) = scripted(&[br#"{"error":"authorization_required"}"#]);
    let mut client = TeslaClient::with_executor(test_config(), executor);
    client.restore_tokens(&StoredTokens {
        bearer_token: "oldtok".to_string(),
        refresh_token: "rt0".to_string(),
        token_expire_time: 0.0,
        saved_at: chrono::Utc::now(),
    });

    assert!(!client.available(None, false).await);
    assert!(client.bearer_token().is_empty());
    assert_eq!(state.request_count(), 1);

    // Backoff window now gates everything; no retry storm
    assert!(!client.available(None, false).await);
    assert_eq!(state.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_refresh_token_and_no_credentials_makes_no_request() {
    let (executor, state) = scripted(&[TOKEN_GRANT, ONE_VEHICLE, WAKE_ONLINE]);
    let mut client = TeslaClient::with_executor(test_config(), executor);

    assert!(!client.available(None, false).await);
    assert_eq!(state.request_count(), 0);

    // Credentials arriving later still work: no backoff was recorded
    assert!(client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn malformed_vehicle_list_starts_backoff() {
    let (executor, state) = scripted(&[TOKEN_GRANT, br#"{"count":2,"response":[{"id":90123}]}"#]);
    let mut client = TeslaClient::with_executor(test_config(), executor);

    assert!(!client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 2);
    assert_eq!(client.vehicle_count(), 0);

    assert!(!client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn asleep_vehicle_keeps_api_available_but_not_ready() {
    let (executor, state) = scripted(&[TOKEN_GRANT, ONE_VEHICLE, WAKE_ASLEEP]);
    let mut client = TeslaClient::with_executor(test_config(), executor);

    // True means the API is usable, not that the car is awake
    assert!(client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 3);
    assert!(!client.vehicle_ready(0));
    assert_eq!(client.vehicles()[0].delay_next_wake_attempt, 30.0);

    // Still inside the wake cooldown: the whole check short-circuits
    assert!(!client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn stop_asking_flag_suppresses_charge_intent_wakes() {
    let (executor, state) = scripted(&[TOKEN_GRANT, ONE_VEHICLE, WAKE_ASLEEP]);
    let mut client = TeslaClient::with_executor(test_config(), executor);

    assert!(client.available(Some(&test_credentials()), false).await);
    assert_eq!(state.request_count(), 3);

    assert!(client.set_stop_asking_to_start_charging(90123, true));
    assert!(!client.set_stop_asking_to_start_charging(999, true));

    // Charge-intent pass skips the flagged vehicle entirely
    assert!(client.available(None, true).await);
    assert_eq!(state.request_count(), 3);

    // A non-charge pass still honors the wake cooldown instead
    assert!(!client.available(None, false).await);
    assert_eq!(state.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn successful_grant_invokes_token_store() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path().to_string_lossy().to_string();

    let (executor, _state) = scripted(&[TOKEN_GRANT, ONE_VEHICLE, WAKE_ONLINE]);
    let mut client = TeslaClient::with_executor(test_config(), executor)
        .with_token_store(Box::new(PersistenceManager::new(&path)));

    assert!(client.available(Some(&test_credentials()), false).await);

    let stored = PersistenceManager::new(&path).load_tokens().unwrap().unwrap();
    assert_eq!(stored.bearer_token, "tok1");
    assert_eq!(stored.refresh_token, "rt1");
    assert!((stored.token_expire_time - client.token_expire_time()).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn error_retry_minutes_are_adjustable() {
    let (executor, _state) = scripted(&[]);
    let mut client = TeslaClient::with_executor(test_config(), executor);

    assert_eq!(client.error_retry_mins(), 10);
    client.set_error_retry_mins(2);
    assert_eq!(client.error_retry_mins(), 2);
}
