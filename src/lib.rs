//! # Auriga - Tesla vehicle API core for EV charge controllers
//!
//! A Rust implementation of the vehicle-cloud session layer used by the
//! charge controller: it keeps an authenticated owner-API session alive,
//! tracks the account's vehicles, and arbitrates when it is safe to send
//! wake, command, and telemetry requests given the service's rate limiting
//! and the cars' sleep cycles.
//!
//! ## Features
//!
//! - **Token Lifecycle**: refresh-token and password grants with a 30-day
//!   renewal window and durable persistence of the credential pair
//! - **Wake Arbitration**: per-vehicle wake state machines with an
//!   empirically derived retry schedule for asleep/waking/offline cars
//! - **Backoff Discipline**: global and per-vehicle error windows so a
//!   misbehaving account never hammers the remote service
//! - **Location Queries**: retrying drive-state fetches that understand the
//!   transient-error and bus-wake races of freshly woken cars
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The crate follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `error`: Error types shared across the crate
//! - `persistence`: Durable storage for the token pair
//! - `tesla`: Owner-API session, vehicle handles, and wake arbitration

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod tesla;

// Re-export commonly used types
pub use config::Config;
pub use error::{AurigaError, Result};
pub use tesla::TeslaClient;
