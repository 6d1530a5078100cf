use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Channel(#[from] botbridge_channels::Error),

    /// The remote answered with something that is not JSON.
    #[error("invalid response to {operation}: {detail}")]
    InvalidResponse { operation: String, detail: String },

    /// `connectBot` kept refusing to issue a session.
    #[error("gem authentication rejected after {attempts} attempt(s): {reason}")]
    AuthRejected { attempts: u32, reason: String },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether the error leaves the account unusable until reconfigured.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

impl From<Error> for botbridge_channels::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Channel(inner) => inner,
            other => botbridge_channels::Error::external("gem", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
