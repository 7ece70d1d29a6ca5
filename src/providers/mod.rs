use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Error, ServiceError, ServiceKind};

mod retry;
mod translate;
mod vision;

pub use translate::GoogleTranslate;
pub use vision::GoogleVision;

use retry::{RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_retryable, retry_after, wait_with_backoff};

const KEY_ENV_VARS: &[&str] = &["GOOGLE_CLOUD_API_KEY", "GOOGLE_API_KEY"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP plumbing shared by the Google Cloud REST adapters: one pooled
/// connection client, one API key and one limit on requests in flight.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    key: String,
    limiter: Arc<Semaphore>,
}

#[derive(Debug)]
pub(crate) enum HttpFailure {
    Transport(String),
    Status { status: StatusCode, message: String },
}

impl HttpFailure {
    pub(crate) fn into_service_error(self, service: ServiceKind) -> ServiceError {
        match self {
            HttpFailure::Transport(message) => ServiceError::Unavailable { service, message },
            HttpFailure::Status { status, message } if status.is_server_error() => {
                ServiceError::Unavailable {
                    service,
                    message: format!("{}: {}", status, message),
                }
            }
            HttpFailure::Status { status, message } => ServiceError::Rejected {
                service,
                status: status.as_u16(),
                message,
            },
        }
    }
}

impl GoogleClient {
    pub fn new(key: impl Into<String>, max_in_flight: usize) -> Result<Self, Error> {
        Self::with_limiter(key, Arc::new(Semaphore::new(max_in_flight.max(1))))
    }

    pub fn with_limiter(key: impl Into<String>, limiter: Arc<Semaphore>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| Error::Configuration(format!("failed to build http client: {}", err)))?;
        Ok(Self {
            http,
            key: key.into(),
            limiter,
        })
    }

    pub(crate) async fn post_json(
        &self,
        service: ServiceKind,
        url: &str,
        body: &Value,
    ) -> Result<String, HttpFailure> {
        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let (status, retry_after, text) = {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|err| HttpFailure::Transport(err.to_string()))?;
                let response = self
                    .http
                    .post(url)
                    .header("x-goog-api-key", &self.key)
                    .json(body)
                    .send()
                    .await
                    .map_err(|err| HttpFailure::Transport(err.to_string()))?;
                let status = response.status();
                let retry_after = retry_after(response.headers());
                let text = response.text().await.unwrap_or_default();
                (status, retry_after, text)
            };
            if status.is_success() {
                debug!("{} request succeeded after {} attempt(s)", service, attempt);
                return Ok(text);
            }
            if is_retryable(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff(service, attempt, delay, retry_after).await;
                continue;
            }
            return Err(HttpFailure::Status {
                status,
                message: extract_google_error(&text).unwrap_or(text),
            });
        }
    }
}

/// API key from the CLI override or the environment.
pub fn resolve_key(override_key: Option<&str>) -> Result<String, Error> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.trim().to_string());
    }
    KEY_ENV_VARS
        .iter()
        .find_map(|name| get_env(name))
        .ok_or_else(|| {
            Error::Configuration(format!(
                "no Google API key found (pass --key or set {})",
                KEY_ENV_VARS.join("/")
            ))
        })
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn extract_google_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GoogleError>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.error.map(|error| error.describe())
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleError {
    pub(crate) code: Option<i32>,
    pub(crate) message: Option<String>,
    pub(crate) status: Option<String>,
}

impl GoogleError {
    pub(crate) fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(message) = self.message.as_ref().filter(|value| !value.trim().is_empty()) {
            parts.push(message.clone());
        }
        if let Some(status) = self.status.as_ref().filter(|value| !value.trim().is_empty()) {
            parts.push(format!("status: {}", status));
        }
        if let Some(code) = self.code {
            parts.push(format!("code: {}", code));
        }
        if parts.is_empty() {
            "unknown error".to_string()
        } else {
            parts.join(" | ")
        }
    }
}
