//! Owner-API integration: session, vehicle handles, and wake arbitration
//!
//! This module is split across smaller files to keep per-file size manageable.

pub mod client;
pub mod transport;
pub mod types;
pub mod vehicle;

// Re-exports for the public API surface
pub use client::{Credentials, TeslaClient};
pub use transport::{ApiRequest, CommandExecutor, HttpExecutor, Method};
pub use types::{DriveStateReply, WakeState, is_transient_error};
pub use vehicle::VehicleHandle;

// Helper used by the readiness and backoff logic
pub(crate) mod clock {
    pub fn now_epoch_seconds() -> f64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_else(|_| std::time::Duration::from_secs(0));
        now.as_secs_f64()
    }
}
