use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Configuration for a single Telegram bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramAccountConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Long-polling timeout passed to `getUpdates` (seconds).
    pub poll_timeout_secs: u32,

    /// Pause after a failed `getUpdates` call (ms).
    pub retry_delay_ms: u64,
}

impl TelegramAccountConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// HTTP client timeout, kept longer than the long-polling timeout so the
    /// client never aborts a poll before Telegram answers.
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_timeout_secs) + 15)
    }
}

impl std::fmt::Debug for TelegramAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAccountConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramAccountConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout_secs: 30,
            retry_delay_ms: 5_000,
        }
    }
}
