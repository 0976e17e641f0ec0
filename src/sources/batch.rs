use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::OtMcpError;
use crate::sources::gateway::{self, EnvelopeStatus, QueryEnvelope};
use crate::sources::opentargets::OpenTargetsClient;

pub const MAX_BATCH_ITEMS: usize = 50;
pub const MAX_BATCH_CONCURRENCY: usize = 10;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Envelope for one batch item, tagged with its input position so callers can
/// correlate results no matter how completion interleaved.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub status: EnvelopeStatus,
    pub result: Option<Value>,
    pub message: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub warning: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub status: EnvelopeStatus,
    pub summary: BatchSummary,
    pub results: Vec<BatchItemResult>,
}

/// Run one query against many variable sets with bounded concurrency.
///
/// The document and the caps are validated before any request goes out.
/// Items are isolated from each other: a failing item becomes an error
/// envelope in its slot while the rest proceed. Results come back in input
/// order. The whole batch reports `error` only when every item failed;
/// a mix of outcomes, or any per-item warning, reports `warning`.
pub async fn run_batch(
    client: &OpenTargetsClient,
    query: &str,
    variables_list: Vec<Map<String, Value>>,
    key_field: Option<&str>,
    operation_name: Option<&str>,
    max_concurrency: usize,
) -> Result<BatchOutcome, OtMcpError> {
    if query.trim().is_empty() {
        return Err(OtMcpError::InvalidArgument(
            "query must be a non-empty string.".to_string(),
        ));
    }
    if gateway::contains_mutation(query) {
        return Err(OtMcpError::InvalidArgument(
            "graphql_batch_query does not support mutations.".to_string(),
        ));
    }
    if variables_list.is_empty() {
        return Err(OtMcpError::InvalidArgument(
            "variables_list cannot be empty.".to_string(),
        ));
    }
    if variables_list.len() > MAX_BATCH_ITEMS {
        return Err(OtMcpError::InvalidArgument(format!(
            "variables_list cannot exceed {MAX_BATCH_ITEMS} items."
        )));
    }
    if max_concurrency < 1 {
        return Err(OtMcpError::InvalidArgument(
            "max_concurrency must be >= 1.".to_string(),
        ));
    }
    if max_concurrency > MAX_BATCH_CONCURRENCY {
        return Err(OtMcpError::InvalidArgument(format!(
            "max_concurrency must be <= {MAX_BATCH_CONCURRENCY}."
        )));
    }

    let mut results: Vec<BatchItemResult> = futures::stream::iter(
        variables_list
            .into_iter()
            .enumerate()
            .map(|(index, variables)| async move {
                let key = key_field.and_then(|field| key_for(&variables, field));
                let envelope = match gateway::run_query(client, query, Some(variables), operation_name).await
                {
                    Ok(envelope) => envelope,
                    Err(error) => QueryEnvelope::error(error.to_string()),
                };
                BatchItemResult {
                    index,
                    key,
                    status: envelope.status,
                    result: envelope.result,
                    message: envelope.message,
                }
            }),
    )
    .buffer_unordered(max_concurrency)
    .collect()
    .await;
    results.sort_by_key(|item| item.index);

    let mut summary = BatchSummary {
        total: results.len(),
        successful: 0,
        warning: 0,
        failed: 0,
    };
    for item in &results {
        match item.status {
            EnvelopeStatus::Success => summary.successful += 1,
            EnvelopeStatus::Warning => summary.warning += 1,
            EnvelopeStatus::Error => summary.failed += 1,
        }
    }
    let status = if summary.failed == summary.total {
        EnvelopeStatus::Error
    } else if summary.failed > 0 || summary.warning > 0 {
        EnvelopeStatus::Warning
    } else {
        EnvelopeStatus::Success
    };

    Ok(BatchOutcome {
        status,
        summary,
        results,
    })
}

fn key_for(variables: &Map<String, Value>, key_field: &str) -> Option<String> {
    match variables.get(key_field) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    }
}
