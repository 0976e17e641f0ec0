pub mod batch;
pub mod gateway;
pub mod opentargets;
pub mod schema;

use std::borrow::Cow;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::OtMcpError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const BODY_EXCERPT_LIMIT: usize = 300;

/// Shared JSON client used for every outbound request.
pub fn http_client() -> Result<reqwest::Client, OtMcpError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .map_err(|err| OtMcpError::InvalidConfig(format!("failed to build HTTP client: {err}")))
}

/// Resolve a service base URL, preferring the override environment variable.
pub fn env_base(default: &'static str, env: &str) -> Cow<'static, str> {
    match std::env::var(env) {
        Ok(value) if !value.trim().is_empty() => {
            Cow::Owned(value.trim().trim_end_matches('/').to_string())
        }
        _ => Cow::Borrowed(default),
    }
}

/// Statuses worth retrying: server-side failures and rate limiting. Other
/// client errors mean the request itself is wrong and will not improve.
pub fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Backoff before retry `attempt` (0-based count of failures so far),
/// doubling from the configured base delay.
pub fn backoff_delay(base_secs: f64, attempt: u32) -> Duration {
    let exponent = attempt.min(16);
    Duration::try_from_secs_f64(base_secs * 2f64.powi(exponent as i32))
        .unwrap_or(Duration::from_secs(60))
}

/// Clip a response body for inclusion in error messages.
pub fn body_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_EXCERPT_LIMIT {
        return trimmed.to_string();
    }
    let mut cut = BODY_EXCERPT_LIMIT;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &trimmed[..cut])
}
