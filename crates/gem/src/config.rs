use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Configuration for a single gem bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GemAccountConfig {
    /// Base URL of the gem bot API; the operation name is appended to it
    /// (e.g. `https://gem.example/bot/` + `getMessages`).
    pub url: String,

    /// Long-lived bot token exchanged for a session by `connectBot`.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Callback address reported to the remote as `remoteUrl`.
    pub endpoint: String,

    /// Log every request and response body at debug level.
    pub debug: bool,

    /// Pause between two polling cycles (ms).
    pub poll_interval_ms: u64,

    /// Pause before retrying a failed request (ms).
    pub retry_delay_ms: u64,

    /// Interval of the background session refresh (seconds).
    pub reconnect_interval_secs: u64,

    /// How many times `connectBot` may refuse a session before the account is
    /// considered unusable.
    pub max_auth_attempts: u32,

    /// Per-request HTTP timeout (seconds).
    pub request_timeout_secs: u64,

    /// Socket address for the push ingestion endpoint, e.g. `0.0.0.0:8088`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_bind: Option<String>,
}

impl GemAccountConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl std::fmt::Debug for GemAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GemAccountConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("debug", &self.debug)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("webhook_bind", &self.webhook_bind)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for GemAccountConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: Secret::new(String::new()),
            endpoint: String::new(),
            debug: false,
            poll_interval_ms: 500,
            retry_delay_ms: 5_000,
            reconnect_interval_secs: 600,
            max_auth_attempts: 5,
            request_timeout_secs: 30,
            webhook_bind: None,
        }
    }
}
