use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::OtMcpError;
use crate::sources::opentargets::{CachedSchema, OPEN_TARGETS_API, OpenTargetsClient};
use crate::sources::schema;

/// How long a rendered schema stays fresh per endpoint.
pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Outcome classification for raw GraphQL calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Warning,
    Error,
}

/// Uniform wrapper around a raw query outcome.
///
/// `result` is the `data` payload as the API returned it and `message` holds
/// the GraphQL errors, if any. Upstream failures that produced no GraphQL
/// payload are reported in the same shape with a synthesized message list, so
/// callers only ever see one envelope format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub status: EnvelopeStatus,
    pub result: Option<Value>,
    pub message: Option<Value>,
}

impl EnvelopeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeStatus::Success => "success",
            EnvelopeStatus::Warning => "warning",
            EnvelopeStatus::Error => "error",
        }
    }
}

impl QueryEnvelope {
    /// Envelope as a plain JSON object. `result` and `message` stay present
    /// as explicit nulls when empty, matching the serialized form.
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("status".into(), Value::String(self.status.as_str().into()));
        map.insert("result".into(), self.result.unwrap_or(Value::Null));
        map.insert("message".into(), self.message.unwrap_or(Value::Null));
        Value::Object(map)
    }

    fn wrap(payload: &Map<String, Value>) -> Self {
        let errors = payload.get("errors");
        let data = payload.get("data");
        let status = if has_content(errors) && !has_content(data) {
            EnvelopeStatus::Error
        } else if has_content(errors) {
            EnvelopeStatus::Warning
        } else {
            EnvelopeStatus::Success
        };
        Self {
            status,
            result: data.cloned(),
            message: errors.cloned(),
        }
    }

    pub(crate) fn error(text: String) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            result: None,
            message: Some(json!([{ "message": text }])),
        }
    }
}

/// Empty objects, arrays, and strings count the same as an absent value.
fn has_content(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
    }
}

/// Lexical scan for a top-level `mutation` operation.
///
/// Comments, string literals, variables, and nested selection sets are
/// skipped, so a field or argument that merely contains the word does not
/// trigger a match, while a mutation hidden behind comment lines or listed
/// after other operations still does.
pub fn contains_mutation(query: &str) -> bool {
    let bytes = query.as_bytes();
    let mut i = 0usize;
    let mut depth = 0i32;
    let mut after_sigil = false;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'"' => {
                if bytes[i..].starts_with(b"\"\"\"") {
                    i += 3;
                    while i < bytes.len() && !bytes[i..].starts_with(b"\"\"\"") {
                        i += 1;
                    }
                    i = (i + 3).min(bytes.len());
                } else {
                    i += 1;
                    while i < bytes.len() && bytes[i] != b'"' {
                        if bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                    i = (i + 1).min(bytes.len());
                }
                after_sigil = false;
            }
            b'{' => {
                depth += 1;
                i += 1;
                after_sigil = false;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                after_sigil = false;
            }
            b'$' | b'@' => {
                after_sigil = true;
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                if depth == 0 && !after_sigil && query[start..i].eq_ignore_ascii_case("mutation") {
                    return true;
                }
                after_sigil = false;
            }
            _ => {
                i += 1;
                after_sigil = false;
            }
        }
    }
    false
}

/// Execute an arbitrary read-only GraphQL document and wrap the outcome.
///
/// Mutations are rejected before any network activity. Results deliberately
/// bypass the client's query cache: raw queries are a debugging surface and
/// stale reads would be misleading. Retries follow the client's budget for
/// transient statuses and transport failures; terminal HTTP errors whose body
/// still carries a GraphQL payload are wrapped instead of raised.
pub async fn run_query(
    client: &OpenTargetsClient,
    query: &str,
    variables: Option<Map<String, Value>>,
    operation_name: Option<&str>,
) -> Result<QueryEnvelope, OtMcpError> {
    if query.trim().is_empty() {
        return Err(OtMcpError::InvalidArgument(
            "query must be a non-empty string.".to_string(),
        ));
    }
    if contains_mutation(query) {
        return Err(OtMcpError::InvalidArgument(
            "graphql_query does not support mutations.".to_string(),
        ));
    }

    let mut body = Map::new();
    body.insert("query".to_string(), Value::String(query.to_string()));
    if let Some(vars) = variables {
        if !vars.is_empty() {
            body.insert("variables".to_string(), Value::Object(vars));
        }
    }
    if let Some(name) = operation_name.map(str::trim).filter(|name| !name.is_empty()) {
        body.insert(
            "operationName".to_string(),
            Value::String(name.to_string()),
        );
    }

    let http = client.http()?;
    let max_retries = client.max_retries();
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            tokio::time::sleep(crate::sources::backoff_delay(
                client.retry_delay_secs(),
                attempt - 1,
            ))
            .await;
        }

        let response = match http.post(client.base()).json(&body).send().await {
            Ok(response) => response,
            Err(source) => {
                if attempt + 1 < max_retries {
                    warn!(attempt = attempt + 1, "raw query transport failure: {source}");
                    attempt += 1;
                    continue;
                }
                return Err(OtMcpError::Transport {
                    api: OPEN_TARGETS_API,
                    source,
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            if crate::sources::retryable_status(status) && attempt + 1 < max_retries {
                warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    "raw query attempt failed"
                );
                attempt += 1;
                continue;
            }
            let text = response.text().await.unwrap_or_default();
            // Some GraphQL servers put a perfectly usable errors/data payload
            // behind a 4xx status. Surface it as a normal envelope.
            if let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(&text) {
                if payload.contains_key("errors") || payload.contains_key("data") {
                    return Ok(QueryEnvelope::wrap(&payload));
                }
            }
            let message = if text.trim().is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                crate::sources::body_excerpt(&text)
            };
            return Ok(QueryEnvelope::error(message));
        }

        let payload: Value = match response.json().await {
            Ok(value) => value,
            Err(_) => {
                return Ok(QueryEnvelope::error(
                    "Non-JSON response from GraphQL endpoint".to_string(),
                ));
            }
        };
        let Value::Object(payload) = payload else {
            return Ok(QueryEnvelope::error(
                "Non-JSON response from GraphQL endpoint".to_string(),
            ));
        };
        return Ok(QueryEnvelope::wrap(&payload));
    }
}

/// SDL for the endpoint the client points at, introspecting at most once per
/// TTL window. The slot lock is held across the fetch so concurrent callers
/// wait for the first result instead of racing to introspect.
pub async fn schema_sdl(client: &OpenTargetsClient) -> Result<String, OtMcpError> {
    let mut slot = client.schema_cache().lock().await;
    if let Some(entry) = slot.as_ref() {
        if entry.fetched_at.elapsed() < SCHEMA_CACHE_TTL {
            return Ok(entry.sdl.clone());
        }
    }

    let data = client.execute(schema::INTROSPECTION_QUERY, None).await?;
    let sdl = schema::render_sdl(&data)?;
    *slot = Some(CachedSchema {
        sdl: sdl.clone(),
        fetched_at: Instant::now(),
    });
    Ok(sdl)
}
