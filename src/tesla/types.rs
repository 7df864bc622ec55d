//! Wire shapes and response parsing for the owner API
//!
//! Responses come back as loosely shaped JSON; every accessor here goes
//! through explicit field extraction so a missing key or a wrong type
//! surfaces as a named error variant instead of a swallowed failure.

use crate::error::{AurigaError, Result};

/// Transient errors are ones that usually disappear if we retry the command
/// a minute or less later. "vehicle unavailable:" sounds like the car is out
/// of connection range, but it has been observed from drive_state right after
/// wake_up returned online, so it is treated as transient. Prefixes need only
/// match the start of an error response such as:
/// `{"response": null, "error_description": "",
///   "error": "operation_timedout for txid `4853e3ad...`}"}`
pub const TRANSIENT_ERROR_PREFIXES: &[&str] = &[
    "upstream internal error",
    "operation_timedout",
    "vehicle unavailable",
];

/// Whether a remote error string is known to be quickly retryable
pub fn is_transient_error(error: &str) -> bool {
    TRANSIENT_ERROR_PREFIXES
        .iter()
        .any(|prefix| error.starts_with(prefix))
}

/// Vehicle state reported by the wake_up endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    Online,
    Asleep,
    Waking,
    Offline,
    /// Unrecognized state label or unusable response
    Error,
}

impl WakeState {
    /// Map a wire label to a state; unknown labels collapse to `Error`
    pub fn from_label(label: &str) -> Self {
        match label {
            "online" => Self::Online,
            "asleep" => Self::Asleep,
            "waking" => Self::Waking,
            "offline" => Self::Offline,
            _ => Self::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Asleep => "asleep",
            Self::Waking => "waking",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }
}

/// Parsed token grant response
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: f64,
}

/// Parsed wake_up response: the reported state plus the top-level error
/// string, kept for transient-error classification
#[derive(Debug, Clone)]
pub struct WakeReply {
    pub state: WakeState,
    pub error: Option<String>,
}

impl WakeReply {
    /// Reply standing in for an unusable response body
    pub fn unusable() -> Self {
        Self {
            state: WakeState::Error,
            error: None,
        }
    }
}

/// Parsed drive_state response
#[derive(Debug, Clone, PartialEq)]
pub enum DriveStateReply {
    /// GPS fix extracted successfully
    Position { latitude: f64, longitude: f64 },

    /// The car reports online but its internal data bus is not awake yet
    /// (`reason == "could_not_wake_buses"`); retryable after a short pause
    BusAsleep,

    /// Top-level error string from the service
    ApiError(String),
}

fn parse_json(bytes: &[u8]) -> Result<serde_json::Value> {
    if bytes.is_empty() {
        return Err(AurigaError::network("empty response"));
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn field<'a>(value: &'a serde_json::Value, key: &str) -> Result<&'a serde_json::Value> {
    value
        .get(key)
        .ok_or_else(|| AurigaError::missing_field(key))
}

fn str_field(value: &serde_json::Value, key: &str) -> Result<String> {
    field(value, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AurigaError::type_mismatch(key, "a string"))
}

fn f64_field(value: &serde_json::Value, key: &str) -> Result<f64> {
    field(value, key)?
        .as_f64()
        .ok_or_else(|| AurigaError::type_mismatch(key, "a number"))
}

fn u64_field(value: &serde_json::Value, key: &str) -> Result<u64> {
    field(value, key)?
        .as_u64()
        .ok_or_else(|| AurigaError::type_mismatch(key, "an integer"))
}

/// Parse an /oauth/token response
pub fn parse_token_grant(bytes: &[u8]) -> Result<TokenGrant> {
    let value = parse_json(bytes)?;
    Ok(TokenGrant {
        access_token: str_field(&value, "access_token")?,
        refresh_token: str_field(&value, "refresh_token")?,
        expires_in: f64_field(&value, "expires_in")?,
    })
}

/// Parse a /api/1/vehicles response into ids, in list order
pub fn parse_vehicle_ids(bytes: &[u8]) -> Result<Vec<u64>> {
    let value = parse_json(bytes)?;
    let count = u64_field(&value, "count")? as usize;
    let list = field(&value, "response")?
        .as_array()
        .ok_or_else(|| AurigaError::type_mismatch("response", "an array"))?;

    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let entry = list
            .get(i)
            .ok_or_else(|| AurigaError::api("vehicle list shorter than count"))?;
        ids.push(u64_field(entry, "id")?);
    }
    Ok(ids)
}

/// Parse a wake_up response.
///
/// A body that decodes as JSON always yields a reply: an absent or
/// non-string `response.state` collapses to [`WakeState::Error`] while the
/// top-level `error` string is preserved for transient classification.
/// Only an empty or non-JSON body is an `Err`.
pub fn parse_wake_reply(bytes: &[u8]) -> Result<WakeReply> {
    let value = parse_json(bytes)?;
    let error = value
        .get("error")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let state = value
        .get("response")
        .and_then(|r| r.get("state"))
        .and_then(|s| s.as_str())
        .map(WakeState::from_label)
        .unwrap_or(WakeState::Error);
    Ok(WakeReply { state, error })
}

/// Parse a drive_state response
pub fn parse_drive_state(bytes: &[u8]) -> Result<DriveStateReply> {
    let value = parse_json(bytes)?;

    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return Ok(DriveStateReply::ApiError(error.to_string()));
    }

    let response = field(&value, "response")?;

    // A successful call carries no "reason" key, so its presence is checked first
    if response.get("reason").and_then(|v| v.as_str()) == Some("could_not_wake_buses") {
        return Ok(DriveStateReply::BusAsleep);
    }

    Ok(DriveStateReply::Position {
        latitude: f64_field(response, "latitude")?,
        longitude: f64_field(response, "longitude")?,
    })
}
