//! Per-vehicle wake state and retry scheduling
//!
//! Each vehicle the account lists gets one handle for the lifetime of the
//! session. The handle tracks the current wake cycle and the adaptive delay
//! before the next wake attempt, using timings measured against cars in
//! maximum power-saving mode.

use super::types::{WakeReply, WakeState};
use crate::logging::{LogContext, get_logger_with_context};

/// Sentinel for a coordinate that has never been fetched
pub const UNKNOWN_COORDINATE: f64 = 10000.0;

/// How long the service keeps a car reachable after the last contact.
/// Measured wake-to-sleep times on an energy-saver car: 1:35, 1:57, 2:30.
pub const AWAKE_WINDOW_SECS: f64 = 120.0;

/// A wake cycle still running past this point is reported as a persistent
/// failure (diagnostic only; the cycle keeps retrying)
pub const WAKE_CYCLE_ALARM_SECS: f64 = 3600.0;

/// State of one vehicle tracked by the session
#[derive(Clone)]
pub struct VehicleHandle {
    /// Opaque vehicle identifier used in per-vehicle endpoint URLs
    pub id: u64,

    /// Start of the current wake cycle, epoch seconds; 0 = no cycle running
    pub first_wake_attempt_time: f64,

    /// When the most recent wake request was sent, epoch seconds
    pub last_wake_attempt_time: f64,

    /// Minimum gap before the next wake attempt is permitted, seconds
    pub delay_next_wake_attempt: f64,

    /// Timestamp of the last per-vehicle error, epoch seconds
    pub last_error_time: f64,

    /// Set by external charge logic to suppress charge-intent wakes
    pub stop_asking_to_start_charging: bool,

    /// Last known latitude, or [`UNKNOWN_COORDINATE`]
    pub lat: f64,

    /// Last known longitude, or [`UNKNOWN_COORDINATE`]
    pub lon: f64,

    logger: crate::logging::StructuredLogger,
}

impl VehicleHandle {
    /// Create a handle for a freshly listed vehicle
    pub fn new(id: u64) -> Self {
        let logger = get_logger_with_context(LogContext::new("vehicle").with_vehicle_id(id));
        Self {
            id,
            first_wake_attempt_time: 0.0,
            last_wake_attempt_time: 0.0,
            delay_next_wake_attempt: 0.0,
            last_error_time: 0.0,
            stop_asking_to_start_charging: false,
            lat: UNKNOWN_COORDINATE,
            lon: UNKNOWN_COORDINATE,
            logger,
        }
    }

    /// Whether the car should currently accept commands
    pub fn ready(&self, error_retry_mins: u32) -> bool {
        self.ready_at(super::clock::now_epoch_seconds(), error_retry_mins)
    }

    /// Readiness at an explicit point in time.
    ///
    /// The car is ready when it is outside the per-vehicle error window, no
    /// wake cycle is in progress, and the last wake contact was under
    /// [`AWAKE_WINDOW_SECS`] ago.
    pub fn ready_at(&self, now: f64, error_retry_mins: u32) -> bool {
        if now - self.last_error_time < f64::from(error_retry_mins) * 60.0 {
            self.logger.debug(&format!(
                "Not ready because of recent error at {}",
                self.last_error_time
            ));
            return false;
        }

        if self.first_wake_attempt_time == 0.0
            && now - self.last_wake_attempt_time < AWAKE_WINDOW_SECS
        {
            return true;
        }

        self.logger
            .debug("Not ready because it wasn't woken in the last 2 minutes");
        false
    }

    /// Last known position, if one was ever fetched
    pub fn position(&self) -> Option<(f64, f64)> {
        if self.lat == UNKNOWN_COORDINATE || self.lon == UNKNOWN_COORDINATE {
            None
        } else {
            Some((self.lat, self.lon))
        }
    }

    /// Seconds since the current wake cycle started; 0 when no cycle runs
    pub fn wake_cycle_elapsed(&self, now: f64) -> f64 {
        if self.first_wake_attempt_time == 0.0 {
            0.0
        } else {
            now - self.first_wake_attempt_time
        }
    }

    /// Fold a wake_up reply into the handle.
    ///
    /// Returns true when the car reported online, in which case the caller
    /// owes the post-wake settle sleep before sending further commands.
    pub(crate) fn apply_wake_reply(&mut self, reply: &WakeReply, now: f64) -> bool {
        if reply.state == WakeState::Online {
            // last_wake_attempt_time stays: readiness counts the awake
            // window from the most recent contact
            self.first_wake_attempt_time = 0.0;
            self.delay_next_wake_attempt = 0.0;
            return true;
        }

        if self.first_wake_attempt_time == 0.0 {
            self.first_wake_attempt_time = now;
        }
        let elapsed = now - self.first_wake_attempt_time;
        let transient = reply
            .error
            .as_deref()
            .map(super::types::is_transient_error)
            .unwrap_or(false);
        self.delay_next_wake_attempt = wake_retry_delay(reply.state, elapsed, transient);

        if reply.state == WakeState::Error {
            self.logger.warn(&format!(
                "Wake failed with unknown response. Will try again in {} seconds",
                self.delay_next_wake_attempt
            ));
        } else {
            self.logger.warn(&format!(
                "Wake failed. State remains '{}'. Will try again in {} seconds",
                reply.state.as_str(),
                self.delay_next_wake_attempt
            ));
        }
        false
    }
}

/// Delay before the next wake attempt, given the reported state and how long
/// the current cycle has been running.
///
/// The schedule is empirical:
/// - asleep/waking cars receive API traffic and usually finish waking within
///   minutes, so retry every 30 s for the first 10 minutes, then back off to
///   5 and finally 15 minutes
/// - offline cars cannot hear wake_up at all; they surface briefly every
///   20-30 minutes, and a 25 s cadence caught that window in testing
/// - error replies retry after 1 minute when the error string is a known
///   transient, otherwise after the standard 5 minutes
pub fn wake_retry_delay(state: WakeState, elapsed: f64, transient_error: bool) -> f64 {
    match state {
        WakeState::Online => 0.0,
        WakeState::Asleep | WakeState::Waking => {
            if elapsed <= 10.0 * 60.0 {
                30.0
            } else if elapsed <= 70.0 * 60.0 {
                5.0 * 60.0
            } else {
                15.0 * 60.0
            }
        }
        WakeState::Offline => {
            if elapsed <= 31.0 * 60.0 {
                25.0
            } else {
                15.0 * 60.0
            }
        }
        WakeState::Error => {
            if elapsed > 60.0 * 60.0 {
                15.0 * 60.0
            } else if transient_error {
                60.0
            } else {
                5.0 * 60.0
            }
        }
    }
}
