use thiserror::Error;

/// Crate-wide error type.
///
/// `InvalidArgument` and `InvalidConfig` are raised synchronously, before any
/// network activity, and are never retried. The remaining variants describe
/// upstream failures and always carry enough context to diagnose them: the
/// API label, the HTTP body excerpt, or the originating `reqwest` error.
#[derive(Debug, Error)]
pub enum OtMcpError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Terminal HTTP failure: a non-2xx status that is not retryable, or a
    /// 2xx body that is not a JSON object.
    #[error("{api} error: {message}")]
    Api { api: &'static str, message: String },

    /// A 2xx response whose body could not be decoded as JSON.
    #[error("{api} returned an unreadable response: {source}")]
    ApiJson {
        api: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Connection, TLS, or timeout failure while talking to the API.
    #[error("{api} request failed: {source}")]
    Transport {
        api: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The retry budget ran out; wraps the last failure observed.
    #[error("{api} request failed after {attempts} attempt(s): {source}")]
    Exhausted {
        api: &'static str,
        attempts: u32,
        #[source]
        source: Box<OtMcpError>,
    },
}

impl OtMcpError {
    /// True for caller mistakes that should surface as-is rather than being
    /// wrapped in retry-exhaustion context.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OtMcpError::InvalidArgument(_) | OtMcpError::InvalidConfig(_)
        )
    }
}
