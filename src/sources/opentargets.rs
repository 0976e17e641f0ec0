use std::borrow::Cow;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::{self, QueryCache};
use crate::config::ClientConfig;
use crate::error::OtMcpError;

pub const OPEN_TARGETS_BASE: &str = "https://api.platform.opentargets.org/api/v4/graphql";
pub const OPEN_TARGETS_API: &str = "opentargets";
pub const OPEN_TARGETS_BASE_ENV: &str = "OPEN_TARGETS_API_URL";

/// Rendered SDL plus the instant it was fetched. Freshness is judged by the
/// gateway, which owns the schema TTL.
pub(crate) struct CachedSchema {
    pub sdl: String,
    pub fetched_at: Instant,
}

/// GraphQL client for the Open Targets Platform API.
///
/// Holds the result cache, the retry policy, and a lazily created HTTP
/// session. The session can be dropped with [`close`](Self::close) and is
/// recreated transparently on the next query. All state sits behind locks, so
/// one client can be shared across tools and concurrent requests.
pub struct OpenTargetsClient {
    base: Cow<'static, str>,
    config: ClientConfig,
    session: Mutex<Option<reqwest::Client>>,
    cache: Mutex<QueryCache>,
    schema: tokio::sync::Mutex<Option<CachedSchema>>,
}

enum AttemptError {
    Retry(OtMcpError),
    Fatal(OtMcpError),
}

impl OpenTargetsClient {
    pub fn new(config: ClientConfig) -> Result<Self, OtMcpError> {
        config.validate()?;
        let base = match config.base.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => {
                Cow::Owned(value.trim_end_matches('/').to_string())
            }
            _ => crate::sources::env_base(OPEN_TARGETS_BASE, OPEN_TARGETS_BASE_ENV),
        };
        Ok(Self {
            base,
            cache: Mutex::new(QueryCache::new(
                config.cache_ttl_secs,
                config.cache_max_entries,
            )),
            session: Mutex::new(None),
            schema: tokio::sync::Mutex::new(None),
            config,
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String) -> Self {
        let config = ClientConfig {
            base: Some(base),
            retry_delay_secs: 0.01,
            ..ClientConfig::default()
        };
        Self::new(config).expect("default test config is valid")
    }

    pub fn base(&self) -> &str {
        self.base.as_ref()
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn retry_delay_secs(&self) -> f64 {
        self.config.retry_delay_secs
    }

    pub(crate) fn schema_cache(&self) -> &tokio::sync::Mutex<Option<CachedSchema>> {
        &self.schema
    }

    /// Clone of the underlying HTTP client, creating the session on first use.
    pub(crate) fn http(&self) -> Result<reqwest::Client, OtMcpError> {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }
        let client = crate::sources::http_client()?;
        *session = Some(client.clone());
        Ok(client)
    }

    /// Drop the HTTP session and cached schema. In-flight requests keep their
    /// session clone; the next query creates a fresh one.
    pub fn close(&self) {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *session = None;
    }

    /// Execute a GraphQL query and return the `data` payload.
    ///
    /// Results are served from the cache when fresh. Transport failures,
    /// 5xx statuses, and 429 are retried with exponential backoff up to the
    /// configured attempt budget; any other failure is returned immediately.
    /// A response carrying both `errors` and usable `data` is treated as a
    /// partial success: the errors are logged and the data is returned.
    pub async fn execute(
        &self,
        query: &str,
        variables: Option<Map<String, Value>>,
    ) -> Result<Value, OtMcpError> {
        if query.trim().is_empty() {
            return Err(OtMcpError::InvalidArgument(
                "query must be a non-empty string.".to_string(),
            ));
        }

        let key = cache::fingerprint(query, variables.as_ref());
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            debug!("query cache hit");
            return Ok(hit);
        }

        let mut body = Map::new();
        body.insert("query".to_string(), Value::String(query.to_string()));
        if let Some(vars) = variables {
            if !vars.is_empty() {
                body.insert("variables".to_string(), Value::Object(vars));
            }
        }

        let client = self.http()?;
        let mut last_error: Option<OtMcpError> = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                let delay =
                    crate::sources::backoff_delay(self.config.retry_delay_secs, attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match self.send_once(&client, &body).await {
                Ok(data) => {
                    self.cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .set(key, data.clone());
                    return Ok(data);
                }
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retry(error)) => {
                    warn!(
                        attempt = attempt + 1,
                        budget = self.config.max_retries,
                        "query attempt failed: {error}"
                    );
                    last_error = Some(error);
                }
            }
        }

        // max_retries >= 1 is enforced at construction, so the loop always
        // records a cause before falling through.
        let source = last_error.unwrap_or_else(|| OtMcpError::Api {
            api: OPEN_TARGETS_API,
            message: "request was never attempted".to_string(),
        });
        Err(OtMcpError::Exhausted {
            api: OPEN_TARGETS_API,
            attempts: self.config.max_retries,
            source: Box::new(source),
        })
    }

    async fn send_once(
        &self,
        client: &reqwest::Client,
        body: &Map<String, Value>,
    ) -> Result<Value, AttemptError> {
        let response = client
            .post(self.base.as_ref())
            .json(body)
            .send()
            .await
            .map_err(|source| {
                AttemptError::Retry(OtMcpError::Transport {
                    api: OPEN_TARGETS_API,
                    source,
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let error = OtMcpError::Api {
                api: OPEN_TARGETS_API,
                message: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    crate::sources::body_excerpt(&text)
                ),
            };
            return Err(if crate::sources::retryable_status(status) {
                AttemptError::Retry(error)
            } else {
                AttemptError::Fatal(error)
            });
        }

        // A 2xx body that is not JSON, or not an object, cannot get better
        // with retries.
        let payload: Value = response.json().await.map_err(|source| {
            AttemptError::Fatal(OtMcpError::ApiJson {
                api: OPEN_TARGETS_API,
                source,
            })
        })?;
        let Value::Object(mut result) = payload else {
            return Err(AttemptError::Fatal(OtMcpError::Api {
                api: OPEN_TARGETS_API,
                message: "unexpected response type: not a JSON object".to_string(),
            }));
        };

        if let Some(errors) = result.get("errors") {
            warn!("GraphQL errors in response: {errors}");
        }
        Ok(result
            .remove("data")
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}
