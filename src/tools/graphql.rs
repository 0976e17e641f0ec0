use serde_json::{Map, Value};

use crate::error::OtMcpError;
use crate::sources::batch::{self, BatchOutcome, DEFAULT_BATCH_CONCURRENCY};
use crate::sources::gateway;
use crate::sources::opentargets::OpenTargetsClient;

use super::apply_fields;

pub async fn graphql_schema(client: &OpenTargetsClient) -> Result<String, OtMcpError> {
    gateway::schema_sdl(client).await
}

pub async fn graphql_query(
    client: &OpenTargetsClient,
    query_string: &str,
    variables: Option<Map<String, Value>>,
    operation_name: Option<&str>,
    fields: Option<&[String]>,
) -> Result<Value, OtMcpError> {
    let envelope = gateway::run_query(client, query_string, variables, operation_name).await?;
    Ok(apply_fields(envelope.into_value(), fields))
}

pub async fn graphql_batch_query(
    client: &OpenTargetsClient,
    query_string: &str,
    variables_list: Vec<Map<String, Value>>,
    key_field: Option<&str>,
    operation_name: Option<&str>,
    max_concurrency: Option<usize>,
) -> Result<BatchOutcome, OtMcpError> {
    batch::run_batch(
        client,
        query_string,
        variables_list,
        key_field,
        operation_name,
        max_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY),
    )
    .await
}
