//! HTTP command executor for the owner API
//!
//! The session core never talks to `reqwest` directly; it builds an
//! [`ApiRequest`] and hands it to a [`CommandExecutor`]. The executor
//! collapses every transport-level failure (connection error, timeout,
//! non-2xx status) into an empty byte vector, the same way an empty body
//! would look. The parsing layer treats both as "no usable response".

use crate::logging::get_logger;
use async_trait::async_trait;

/// HTTP method of an owner-API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully formed owner-API request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Build a GET request
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer: None,
            body: None,
        }
    }

    /// Build a POST request
    pub fn post<S: Into<String>>(url: S) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer: None,
            body: None,
        }
    }

    /// Attach a bearer token
    pub fn with_bearer<S: Into<String>>(mut self, token: S) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Body with the account password masked, safe for logging
    pub fn redacted_body(&self) -> Option<serde_json::Value> {
        let mut body = self.body.clone()?;
        if let Some(obj) = body.as_object_mut()
            && obj.contains_key("password")
        {
            obj.insert("password".to_string(), "[HIDDEN]".into());
        }
        Some(body)
    }
}

/// Issues owner-API requests and returns the raw response bytes.
///
/// Implementations must return an empty vector on any failure; callers do
/// not distinguish transport failure from an empty successful response.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Vec<u8>;
}

/// Production executor on top of `reqwest`
pub struct HttpExecutor {
    client: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl HttpExecutor {
    /// Create a new executor with the given per-request timeout
    pub fn new(timeout_secs: u64) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        let logger = get_logger("transport");
        Ok(Self { client, logger })
    }
}

#[async_trait]
impl CommandExecutor for HttpExecutor {
    async fn execute(&self, request: &ApiRequest) -> Vec<u8> {
        use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};

        if let Some(body) = request.redacted_body() {
            self.logger
                .debug(&format!("API request {} body {}", request.url, body));
        } else {
            self.logger.debug(&format!("API request {}", request.url));
        }

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        builder = builder.header(ACCEPT, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(body);
        }

        match builder.send().await {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(e) => {
                    self.logger
                        .debug(&format!("Failed to read response body: {}", e));
                    Vec::new()
                }
            },
            Ok(resp) => {
                self.logger.debug(&format!(
                    "API request {} returned status {}",
                    request.url,
                    resp.status()
                ));
                Vec::new()
            }
            Err(e) => {
                self.logger
                    .debug(&format!("API request {} failed: {}", request.url, e));
                Vec::new()
            }
        }
    }
}
