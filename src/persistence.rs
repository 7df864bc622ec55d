//! Persistence layer for session credentials
//!
//! This module handles saving and loading the bearer/refresh token pair so an
//! authenticated session survives restarts. The session invokes the
//! [`TokenStore`] after every successful token grant.

use crate::error::Result;
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persisted credential pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTokens {
    /// Short-lived bearer token
    pub bearer_token: String,

    /// Long-lived refresh token
    pub refresh_token: String,

    /// Absolute expiry of the bearer token, epoch seconds
    pub token_expire_time: f64,

    /// When this pair was written
    pub saved_at: DateTime<Utc>,
}

impl Default for StoredTokens {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            refresh_token: String::new(),
            token_expire_time: 0.0,
            saved_at: Utc::now(),
        }
    }
}

/// Durable storage for the token pair, invoked after every token refresh
pub trait TokenStore: Send + Sync {
    /// Persist the credential pair
    fn save_tokens(&self, tokens: &StoredTokens) -> Result<()>;

    /// Load the previously persisted pair, if any
    fn load_tokens(&self) -> Result<Option<StoredTokens>>;
}

/// File-backed token store
pub struct PersistenceManager {
    file_path: String,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new(file_path: &str) -> Self {
        let logger = get_logger("persistence");

        Self {
            file_path: file_path.to_string(),
            logger,
        }
    }
}

impl TokenStore for PersistenceManager {
    fn save_tokens(&self, tokens: &StoredTokens) -> Result<()> {
        let contents = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved token pair to disk");

        Ok(())
    }

    fn load_tokens(&self) -> Result<Option<StoredTokens>> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger.info("No persisted tokens found");
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)?;
        let tokens: StoredTokens = serde_json::from_str(&contents)?;
        self.logger.info("Loaded persisted tokens from disk");

        Ok(Some(tokens))
    }
}
