//! Owner-API session: token lifecycle, vehicle registry, wake arbitration
//!
//! One [`TeslaClient`] is constructed per process and polled by the external
//! charge coordinator. Every entry point returns a plain bool; failures are
//! absorbed into backoff timers rather than surfaced as errors, because the
//! correct reaction to almost any API problem is "wait, then try again".

use super::clock;
use super::transport::{ApiRequest, CommandExecutor, HttpExecutor};
use super::types::{
    DriveStateReply, WakeReply, is_transient_error, parse_drive_state, parse_token_grant,
    parse_vehicle_ids, parse_wake_reply,
};
use super::vehicle::{VehicleHandle, WAKE_CYCLE_ALARM_SECS};
use crate::config::TeslaConfig;
use crate::error::Result;
use crate::logging::get_logger;
use crate::persistence::{StoredTokens, TokenStore};
use serde_json::json;
use std::time::Duration;

/// Renew the bearer token when it expires within this window. Refresh tokens
/// are issued for 45 days, so renewal effectively happens every 15 days.
const TOKEN_RENEW_WINDOW_SECS: f64 = 30.0 * 24.0 * 60.0 * 60.0;

/// Pause after a successful wake before further commands are sent
const POST_WAKE_SETTLE_SECS: u64 = 5;

/// Total drive_state attempts per location query
const LOCATION_ATTEMPTS: u32 = 3;

/// Pause before retrying a transient drive_state error
const TRANSIENT_RETRY_SLEEP_SECS: u64 = 60;

/// Pause before retrying after could_not_wake_buses
const BUS_WAKE_RETRY_SLEEP_SECS: u64 = 5;

/// Account credentials for the password grant
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Authenticated owner-API session and vehicle fleet
pub struct TeslaClient {
    config: TeslaConfig,
    executor: Box<dyn CommandExecutor>,
    token_store: Option<Box<dyn TokenStore>>,
    bearer_token: String,
    refresh_token: String,
    token_expire_time: f64,
    last_error_time: f64,
    error_retry_mins: u32,
    last_charge_command_time: f64,
    vehicles: Vec<VehicleHandle>,
    logger: crate::logging::StructuredLogger,
}

impl TeslaClient {
    /// Create a client backed by the production HTTP executor
    pub fn new(config: TeslaConfig) -> Result<Self> {
        let executor = HttpExecutor::new(config.timeout_secs)?;
        Ok(Self::with_executor(config, Box::new(executor)))
    }

    /// Create a client with a caller-supplied executor
    pub fn with_executor(config: TeslaConfig, executor: Box<dyn CommandExecutor>) -> Self {
        let logger = get_logger("session");
        let error_retry_mins = config.error_retry_mins;
        Self {
            config,
            executor,
            token_store: None,
            bearer_token: String::new(),
            refresh_token: String::new(),
            token_expire_time: 0.0,
            last_error_time: 0.0,
            error_retry_mins,
            last_charge_command_time: 0.0,
            vehicles: Vec::new(),
            logger,
        }
    }

    /// Attach the store invoked after every token refresh
    pub fn with_token_store(mut self, store: Box<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Seed the session from a previously persisted token pair
    pub fn restore_tokens(&mut self, tokens: &StoredTokens) {
        self.bearer_token = tokens.bearer_token.clone();
        self.refresh_token = tokens.refresh_token.clone();
        self.token_expire_time = tokens.token_expire_time;
    }

    /// Current bearer token; empty string means unauthenticated
    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    /// Absolute bearer token expiry, epoch seconds
    pub fn token_expire_time(&self) -> f64 {
        self.token_expire_time
    }

    /// Minutes the API stays disabled after a non-transient error
    pub fn error_retry_mins(&self) -> u32 {
        self.error_retry_mins
    }

    /// Adjust the error backoff window
    pub fn set_error_retry_mins(&mut self, mins: u32) {
        self.error_retry_mins = mins;
    }

    /// Start the global backoff window now. Also used by external charge
    /// logic after its own failed commands.
    pub fn record_api_error(&mut self) {
        self.last_error_time = clock::now_epoch_seconds();
    }

    /// When the last charge start/stop command was issued, epoch seconds
    pub fn last_charge_command_time(&self) -> f64 {
        self.last_charge_command_time
    }

    /// Note that a charge start/stop command was just issued
    pub fn note_charge_command(&mut self) {
        self.last_charge_command_time = clock::now_epoch_seconds();
    }

    /// Vehicles tracked by this session, in list order
    pub fn vehicles(&self) -> &[VehicleHandle] {
        &self.vehicles
    }

    /// Number of currently tracked vehicles
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Whether the given vehicle should currently accept commands
    pub fn vehicle_ready(&self, index: usize) -> bool {
        self.vehicles
            .get(index)
            .map(|v| v.ready(self.error_retry_mins))
            .unwrap_or(false)
    }

    /// Set or clear the per-vehicle charge-wake suppression flag.
    /// Returns false when the id is unknown.
    pub fn set_stop_asking_to_start_charging(&mut self, id: u64, stop: bool) -> bool {
        match self.vehicles.iter_mut().find(|v| v.id == id) {
            Some(vehicle) => {
                vehicle.stop_asking_to_start_charging = stop;
                true
            }
            None => false,
        }
    }

    fn error_backoff_active(&self, now: f64) -> bool {
        now - self.last_error_time < f64::from(self.error_retry_mins) * 60.0
    }

    /// One availability pass: refresh the token if due, populate the vehicle
    /// registry, and advance every vehicle's wake state machine.
    ///
    /// Returns true when the API is usable for commands. True does NOT mean
    /// any vehicle is awake and ready; check [`VehicleHandle::ready`] per
    /// vehicle. With `charge_intent` set, vehicles flagged
    /// `stop_asking_to_start_charging` are left alone.
    pub async fn available(&mut self, credentials: Option<&Credentials>, charge_intent: bool) -> bool {
        let now = clock::now_epoch_seconds();

        if self.error_backoff_active(now) {
            // Rapid-fire requests get an account blacklisted; sit out the
            // full window after any unclassified error
            self.logger.debug(&format!(
                "API disabled for {:.0} more seconds due to recent error",
                f64::from(self.error_retry_mins) * 60.0 - (now - self.last_error_time)
            ));
            return false;
        }

        if self.bearer_token.is_empty() || self.token_expire_time - now < TOKEN_RENEW_WINDOW_SECS {
            self.renew_token(credentials, now).await;
        }

        let mut need_settle = false;
        if !self.bearer_token.is_empty() {
            if self.vehicles.is_empty() && !self.populate_vehicles(now).await {
                return false;
            }

            match self.advance_wake_machines(charge_intent, now).await {
                Some(settle) => need_settle = settle,
                None => return false,
            }
        }

        if self.error_backoff_active(now) || self.bearer_token.is_empty() {
            self.logger.debug(&format!(
                "Not available: recent error or empty bearer token (last error {:.0}s ago)",
                now - self.last_error_time
            ));
            return false;
        }

        if need_settle {
            // Commands sent right after a wake tend to fail with
            // could_not_wake_buses; give the car a moment first
            tokio::time::sleep(Duration::from_secs(POST_WAKE_SETTLE_SECS)).await;
        }

        true
    }

    /// Request a new bearer token, preferring the refresh grant.
    ///
    /// With no refresh token and no credentials, no request is made and the
    /// session falls through with its current (possibly empty) token.
    async fn renew_token(&mut self, credentials: Option<&Credentials>, now: f64) {
        let grant_body = if !self.refresh_token.is_empty() {
            json!({
                "grant_type": "refresh_token",
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "refresh_token": self.refresh_token,
            })
        } else if let Some(creds) = credentials {
            json!({
                "grant_type": "password",
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "email": creds.email,
                "password": creds.password,
            })
        } else {
            return;
        };

        let request = ApiRequest::post(token_url(&self.config.base_url)).with_body(grant_body);
        let body = self.executor.execute(&request).await;

        match parse_token_grant(&body) {
            Ok(grant) => {
                self.bearer_token = grant.access_token;
                self.refresh_token = grant.refresh_token;
                self.token_expire_time = now + grant.expires_in;
                let expiry = chrono::DateTime::<chrono::Utc>::from_timestamp(
                    self.token_expire_time as i64,
                    0,
                )
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| format!("{:.0}", self.token_expire_time));
                self.logger
                    .info(&format!("Access token renewed, valid until {}", expiry));
                self.persist_tokens();
            }
            Err(e) => {
                self.logger.error(&format!(
                    "Can't authenticate with the vehicle API ({}). Please log in again.",
                    e
                ));
                // Erase both tokens instead of only starting the backoff:
                // retrying a likely-bad credential every few minutes risks a
                // remote-side account lockout
                self.last_error_time = now;
                self.bearer_token.clear();
                self.refresh_token.clear();
            }
        }
    }

    fn persist_tokens(&self) {
        if let Some(store) = &self.token_store {
            let tokens = StoredTokens {
                bearer_token: self.bearer_token.clone(),
                refresh_token: self.refresh_token.clone(),
                token_expire_time: self.token_expire_time,
                saved_at: chrono::Utc::now(),
            };
            if let Err(e) = store.save_tokens(&tokens) {
                self.logger.warn(&format!("Failed to persist tokens: {}", e));
            }
        }
    }

    /// Fetch the account's vehicle list and create one handle per id
    async fn populate_vehicles(&mut self, now: f64) -> bool {
        let request =
            ApiRequest::get(vehicles_url(&self.config.base_url)).with_bearer(&*self.bearer_token);
        let body = self.executor.execute(&request).await;

        match parse_vehicle_ids(&body) {
            Ok(ids) => {
                self.logger.info(&format!("Tracking {} vehicle(s)", ids.len()));
                self.vehicles = ids.into_iter().map(VehicleHandle::new).collect();
                true
            }
            Err(e) => {
                self.logger.error(&format!(
                    "Can't get list of vehicles ({}). Will try again in {} minutes",
                    e, self.error_retry_mins
                ));
                self.last_error_time = now;
                false
            }
        }
    }

    /// Advance every vehicle's wake state machine.
    ///
    /// Returns `Some(settle_owed)` after a full pass, or `None` when a
    /// vehicle is still inside its wake cooldown, which short-circuits the
    /// whole availability check so no vehicle gets hammered mid-backoff.
    async fn advance_wake_machines(&mut self, charge_intent: bool, now: f64) -> Option<bool> {
        let mut need_settle = false;

        for i in 0..self.vehicles.len() {
            {
                let vehicle = &self.vehicles[i];

                if charge_intent && vehicle.stop_asking_to_start_charging {
                    self.logger.debug(&format!(
                        "Not waking vehicle {}: stop_asking_to_start_charging is set",
                        vehicle.id
                    ));
                    continue;
                }

                if now - vehicle.last_error_time < f64::from(self.error_retry_mins) * 60.0 {
                    self.logger.debug(&format!(
                        "Not sending commands to vehicle {}: it returned an error in the last {} minutes",
                        vehicle.id, self.error_retry_mins
                    ));
                    continue;
                }

                if vehicle.ready_at(now, self.error_retry_mins) {
                    continue;
                }

                if now - vehicle.last_wake_attempt_time <= vehicle.delay_next_wake_attempt {
                    self.logger.debug(&format!(
                        "Unavailable: still delaying {} seconds after the last failed wake attempt",
                        vehicle.delay_next_wake_attempt
                    ));
                    return None;
                }
            }

            // Cooldown elapsed, or the car has never been woken. Wake it.
            self.vehicles[i].last_wake_attempt_time = now;
            let request = ApiRequest::post(wake_url(&self.config.base_url, self.vehicles[i].id))
                .with_bearer(&*self.bearer_token);
            let body = self.executor.execute(&request).await;

            let reply = parse_wake_reply(&body).unwrap_or_else(|_| WakeReply::unusable());
            let vehicle = &mut self.vehicles[i];
            if vehicle.apply_wake_reply(&reply, now) {
                need_settle = true;
            }

            if vehicle.first_wake_attempt_time > 0.0
                && now - vehicle.first_wake_attempt_time > WAKE_CYCLE_ALARM_SECS
            {
                // It should never take this long to wake a car
                self.logger.error(&format!(
                    "Failed to wake vehicle {} from '{}' state for {:.1} hours",
                    vehicle.id,
                    reply.state.as_str(),
                    (now - vehicle.first_wake_attempt_time) / 3600.0
                ));
            }
        }

        Some(need_settle)
    }

    /// Fetch the vehicle's GPS position into its handle.
    ///
    /// Returns false without a request when the car is not ready. Retries up
    /// to three times across transient errors and the bus-wake race; any
    /// other failure starts the per-vehicle error window.
    pub async fn update_location(&mut self, index: usize) -> bool {
        let now = clock::now_epoch_seconds();
        let Some(vehicle) = self.vehicles.get(index) else {
            return false;
        };
        if !vehicle.ready_at(now, self.error_retry_mins) {
            return false;
        }
        let id = vehicle.id;
        let url = drive_state_url(&self.config.base_url, id);

        for _ in 0..LOCATION_ATTEMPTS {
            let request = ApiRequest::get(url.clone()).with_bearer(&*self.bearer_token);
            let body = self.executor.execute(&request).await;

            match parse_drive_state(&body) {
                Ok(DriveStateReply::Position {
                    latitude,
                    longitude,
                }) => {
                    let vehicle = &mut self.vehicles[index];
                    vehicle.lat = latitude;
                    vehicle.lon = longitude;
                    return true;
                }
                Ok(DriveStateReply::BusAsleep) => {
                    // The car answers before its internal bus is awake; a
                    // short pause is enough
                    tokio::time::sleep(Duration::from_secs(BUS_WAKE_RETRY_SLEEP_SECS)).await;
                }
                Ok(DriveStateReply::ApiError(error)) if is_transient_error(&error) => {
                    self.logger.warn(&format!(
                        "API returned '{}' fetching GPS location. Trying again in 1 minute",
                        error
                    ));
                    tokio::time::sleep(Duration::from_secs(TRANSIENT_RETRY_SLEEP_SECS)).await;
                }
                Ok(DriveStateReply::ApiError(error)) => {
                    self.logger.error(&format!(
                        "Can't get GPS location of vehicle {} ({}). Will try again later",
                        id, error
                    ));
                    self.vehicles[index].last_error_time = clock::now_epoch_seconds();
                    return false;
                }
                Err(e) => {
                    self.logger.error(&format!(
                        "Can't get GPS location of vehicle {} ({}). Will try again later",
                        id, e
                    ));
                    self.vehicles[index].last_error_time = clock::now_epoch_seconds();
                    return false;
                }
            }
        }

        self.vehicles[index].last_error_time = clock::now_epoch_seconds();
        false
    }
}

fn token_url(base: &str) -> String {
    format!("{}/oauth/token", base)
}

fn vehicles_url(base: &str) -> String {
    format!("{}/api/1/vehicles", base)
}

fn wake_url(base: &str, id: u64) -> String {
    format!("{}/api/1/vehicles/{}/wake_up", base, id)
}

fn drive_state_url(base: &str, id: u64) -> String {
    format!("{}/api/1/vehicles/{}/data_request/drive_state", base, id)
}
