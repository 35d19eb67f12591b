use thiserror::Error;

/// Startup configuration problems. Always fatal, never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures talking to the statistics API.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (http {status})")]
    RateLimited { status: u16 },

    #[error("server error: http {status}: {body}")]
    Server { status: u16, body: String },

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid payload: {0}")]
    Payload(String),
}

impl FetchError {
    /// Timeouts, connection failures, throttling and 5xx responses are worth
    /// another attempt. Anything else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited { .. } | Self::Server { .. }
        )
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), String::new());
        }
        if err.is_decode() {
            return Self::Payload(err.to_string());
        }
        Self::Network(err.to_string())
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited { status },
            500..=599 => Self::Server { status, body },
            _ => Self::Http { status, body },
        }
    }
}

/// Warehouse failures. Any enclosing transaction has been rolled back by the
/// time this reaches the caller.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{context}: {source}")]
    Sql {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{table} does not exist; run the {step} step first")]
    MissingTable {
        table: &'static str,
        step: &'static str,
    },
}

impl StorageError {
    pub fn new(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Sql {
            context: context.into(),
            source,
        }
    }
}

/// Attach a short description of the failing statement to a rusqlite error.
pub trait StorageContext<T> {
    fn storage(self, context: &str) -> Result<T, StorageError>;
}

impl<T> StorageContext<T> for rusqlite::Result<T> {
    fn storage(self, context: &str) -> Result<T, StorageError> {
        self.map_err(|err| StorageError::new(context, err))
    }
}

/// Everything that can end a bronze ingestion run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("season {season}: {source}")]
    Fetch {
        season: String,
        #[source]
        source: FetchError,
    },

    #[error("season {season} unavailable after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        season: String,
        attempts: u32,
        last_error: FetchError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
