pub mod rate_limit;

use std::sync::Arc;

use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::transport::sse_server::SseServer;
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt, tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{ClientConfig, ServerSettings, Transport};
use crate::error::OtMcpError;
use crate::sources::opentargets::OpenTargetsClient;
use crate::tools;
use crate::tools::search::DEFAULT_FACETS_PAGE_SIZE;
use crate::tools::workflow::RepurposingParams;
use crate::tools::{DEFAULT_PAGE_INDEX, DEFAULT_PAGE_SIZE};

use self::rate_limit::RateLimiter;

const INSTRUCTIONS: &str = "Tool selection policy:\n\
1) If you have a name/symbol, call the relevant tool directly (IDs are auto-resolved).\n\
2) Use get_{entity}_info for basic lookup.\n\
3) Use get_{entity}_associated_* for relationships.\n\
4) Use get_{entity}_known_drugs for therapeutics.\n\
5) Use fields=[...] to limit output when you only need specific fields.\n\
6) If a name fails to resolve, call search_entities to find the canonical ID.\n\
7) Use graphql_query only if no curated tool fits.\n\
8) Use workflow tools for multi-hop disease-target-drug prioritisation.\n";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchEntitiesRequest {
    #[schemars(description = "Free text to search for (gene symbol, disease name, drug name)")]
    pub query_string: String,
    #[schemars(description = "Entity kinds to search: target, disease, drug")]
    #[serde(default)]
    pub entity_names: Option<Vec<String>>,
    #[schemars(description = "Zero-based page index")]
    #[serde(default)]
    pub page_index: Option<i64>,
    #[schemars(description = "Rows per page (max 500)")]
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchFacetsRequest {
    #[schemars(description = "Free text to facet over; omit for all entities")]
    #[serde(default)]
    pub query_string: Option<String>,
    #[schemars(description = "Restrict to one facet category")]
    #[serde(default)]
    pub category_id: Option<String>,
    #[schemars(description = "Entity kinds to search: target, disease, drug")]
    #[serde(default)]
    pub entity_names: Option<Vec<String>>,
    #[schemars(description = "Zero-based page index")]
    #[serde(default)]
    pub page_index: Option<i64>,
    #[schemars(description = "Rows per page (max 500)")]
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SimilarTargetsRequest {
    #[schemars(description = "Seed target Ensembl ID or symbol (auto-resolved)")]
    pub entity_id: String,
    #[schemars(description = "Minimum similarity score, between 0 and 1")]
    #[serde(default)]
    pub threshold: Option<f64>,
    #[schemars(description = "Number of similar targets to return")]
    #[serde(default)]
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TargetInfoRequest {
    #[schemars(description = "Ensembl gene ID or symbol (auto-resolved)")]
    pub ensembl_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TargetListingRequest {
    #[schemars(description = "Ensembl gene ID or symbol (auto-resolved)")]
    pub ensembl_id: String,
    #[schemars(description = "Zero-based page index")]
    #[serde(default)]
    pub page_index: Option<i64>,
    #[schemars(description = "Rows per page (max 500)")]
    #[serde(default)]
    pub page_size: Option<i64>,
    #[schemars(description = "Dot-separated paths to keep in the response")]
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DiseaseInfoRequest {
    #[schemars(description = "EFO disease ID or name (auto-resolved)")]
    pub efo_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DiseaseTargetsRequest {
    #[schemars(description = "EFO disease ID or name (auto-resolved)")]
    pub efo_id: String,
    #[schemars(description = "Zero-based page index")]
    #[serde(default)]
    pub page_index: Option<i64>,
    #[schemars(description = "Rows per page (max 500)")]
    #[serde(default)]
    pub page_size: Option<i64>,
    #[schemars(description = "Dot-separated paths to keep in the response")]
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DrugInfoRequest {
    #[schemars(description = "ChEMBL drug ID or name (auto-resolved)")]
    pub chembl_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MapIdsRequest {
    #[schemars(description = "Free-text terms to map to canonical IDs")]
    pub query_terms: Vec<String>,
    #[schemars(description = "Entity kinds to map against: target, disease, drug")]
    #[serde(default)]
    pub entity_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GraphqlQueryRequest {
    #[schemars(description = "GraphQL query document (mutations are rejected)")]
    pub query_string: String,
    #[schemars(description = "Variables for the query")]
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[schemars(description = "Operation to run when the document has several")]
    #[serde(default)]
    pub operation_name: Option<String>,
    #[schemars(description = "Dot-separated paths to keep in the response")]
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GraphqlBatchRequest {
    #[schemars(description = "GraphQL query document executed once per variable set")]
    pub query_string: String,
    #[schemars(description = "One variables object per execution (max 50)")]
    pub variables_list: Vec<Map<String, Value>>,
    #[schemars(description = "Variable name echoed back as the result key")]
    #[serde(default)]
    pub key_field: Option<String>,
    #[schemars(description = "Operation to run when the document has several")]
    #[serde(default)]
    pub operation_name: Option<String>,
    #[schemars(description = "Concurrent executions (max 10)")]
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DrugRepurposingRequest {
    #[schemars(description = "EFO disease ID or name (auto-resolved)")]
    pub efo_id: String,
    #[schemars(description = "Keep targets scored at or above this value (0-1)")]
    #[serde(default)]
    pub min_association_score: Option<f64>,
    #[schemars(description = "Association page size, at most 200 targets")]
    #[serde(default)]
    pub max_targets: Option<i64>,
    #[schemars(description = "Skip drug rows below this clinical phase")]
    #[serde(default)]
    pub min_clinical_phase: Option<i64>,
    #[schemars(description = "Keep approved drugs only")]
    #[serde(default)]
    pub approved_only: Option<bool>,
    #[schemars(description = "Drug rows considered per target, at most 100")]
    #[serde(default)]
    pub max_drugs_per_target: Option<i64>,
    #[schemars(description = "Ranked candidates to return, at most 200")]
    #[serde(default)]
    pub max_candidates: Option<i64>,
    #[schemars(description = "Concurrent per-target lookups, at most 20")]
    #[serde(default)]
    pub max_concurrency: Option<i64>,
}

/// MCP facade over the Open Targets tool set. One shared client, one
/// optional limiter, and a statically built tool router.
#[derive(Clone)]
pub struct OpenTargetsService {
    client: Arc<OpenTargetsClient>,
    limiter: Option<Arc<RateLimiter>>,
    tool_router: ToolRouter<Self>,
}

impl OpenTargetsService {
    pub fn new(client: Arc<OpenTargetsClient>, limiter: Option<Arc<RateLimiter>>) -> Self {
        Self {
            client,
            limiter,
            tool_router: Self::tool_router(),
        }
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }
}

fn json_result<T: Serialize>(outcome: Result<T, OtMcpError>) -> CallToolResult {
    match outcome {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(err) => CallToolResult::error(vec![Content::text(format!(
                "failed to serialize result: {err}"
            ))]),
        },
        Err(err) => CallToolResult::error(vec![Content::text(err.to_string())]),
    }
}

fn text_result(outcome: Result<String, OtMcpError>) -> CallToolResult {
    match outcome {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(err) => CallToolResult::error(vec![Content::text(err.to_string())]),
    }
}

#[tool_router]
impl OpenTargetsService {
    #[tool(
        description = "Search Open Targets entities and resolve synonyms to canonical IDs. Returns direct hits plus id mappings; use this first when a name fails to resolve."
    )]
    pub async fn search_entities(
        &self,
        Parameters(request): Parameters<SearchEntitiesRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::search::search_entities(
            &self.client,
            &request.query_string,
            request.entity_names,
            request.page_index.unwrap_or(DEFAULT_PAGE_INDEX),
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(
        description = "Return facet counts to help filter search results. Omit query_string to facet over all entities."
    )]
    pub async fn search_facets(
        &self,
        Parameters(request): Parameters<SearchFacetsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::search::search_facets(
            &self.client,
            request.query_string.as_deref(),
            request.category_id.as_deref(),
            request.entity_names,
            request.page_index.unwrap_or(DEFAULT_PAGE_INDEX),
            request.page_size.unwrap_or(DEFAULT_FACETS_PAGE_SIZE),
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(
        description = "Identify targets with similar association profiles to the seed target."
    )]
    pub async fn get_similar_targets(
        &self,
        Parameters(request): Parameters<SimilarTargetsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::search::get_similar_targets(
            &self.client,
            &request.entity_id,
            request.threshold,
            request.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(description = "Retrieve core identity details for a target gene.")]
    pub async fn get_target_info(
        &self,
        Parameters(request): Parameters<TargetInfoRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::target::get_target_info(&self.client, &request.ensembl_id).await;
        Ok(json_result(outcome))
    }

    #[tool(
        description = "Return compounds with known activity on the target, including clinical phase and mechanism of action."
    )]
    pub async fn get_target_known_drugs(
        &self,
        Parameters(request): Parameters<TargetListingRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::target::get_target_known_drugs(
            &self.client,
            &request.ensembl_id,
            request.page_index.unwrap_or(DEFAULT_PAGE_INDEX),
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            request.fields.as_deref(),
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(description = "List diseases linked to a target with association scores.")]
    pub async fn get_target_associated_diseases(
        &self,
        Parameters(request): Parameters<TargetListingRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::target::get_target_associated_diseases(
            &self.client,
            &request.ensembl_id,
            request.page_index.unwrap_or(DEFAULT_PAGE_INDEX),
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            request.fields.as_deref(),
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(description = "Retrieve core metadata for an Open Targets disease entity.")]
    pub async fn get_disease_info(
        &self,
        Parameters(request): Parameters<DiseaseInfoRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::disease::get_disease_info(&self.client, &request.efo_id).await;
        Ok(json_result(outcome))
    }

    #[tool(description = "List targets associated with a disease, including evidence scores.")]
    pub async fn get_disease_associated_targets(
        &self,
        Parameters(request): Parameters<DiseaseTargetsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::disease::get_disease_associated_targets(
            &self.client,
            &request.efo_id,
            request.page_index.unwrap_or(DEFAULT_PAGE_INDEX),
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            request.fields.as_deref(),
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(description = "Fetch identity, indication, and mechanism data for a drug.")]
    pub async fn get_drug_info(
        &self,
        Parameters(request): Parameters<DrugInfoRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::drug::get_drug_info(&self.client, &request.chembl_id).await;
        Ok(json_result(outcome))
    }

    #[tool(description = "Return Open Targets Platform release metadata.")]
    pub async fn get_api_metadata(&self) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::meta::get_api_metadata(&self.client).await;
        Ok(json_result(outcome))
    }

    #[tool(description = "List sources contributing target-disease association evidence.")]
    pub async fn get_association_datasources(&self) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::meta::get_association_datasources(&self.client).await;
        Ok(json_result(outcome))
    }

    #[tool(description = "Map free-text terms to canonical Open Targets identifiers.")]
    pub async fn map_ids(
        &self,
        Parameters(request): Parameters<MapIdsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome =
            tools::meta::map_ids(&self.client, &request.query_terms, request.entity_names).await;
        Ok(json_result(outcome))
    }

    #[tool(
        description = "ADVANCED: Return the GraphQL schema in SDL format. Use to discover fields before writing a raw query."
    )]
    pub async fn graphql_schema(&self) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::graphql::graphql_schema(&self.client).await;
        Ok(text_result(outcome))
    }

    #[tool(
        description = "ADVANCED: Execute a raw GraphQL query against Open Targets. Read-only; mutations are rejected. Use only when no curated tool fits."
    )]
    pub async fn graphql_query(
        &self,
        Parameters(request): Parameters<GraphqlQueryRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::graphql::graphql_query(
            &self.client,
            &request.query_string,
            request.variables,
            request.operation_name.as_deref(),
            request.fields.as_deref(),
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(
        description = "ADVANCED: Execute one GraphQL query against many variable sets concurrently. Items fail independently; the summary reports per-item status."
    )]
    pub async fn graphql_batch_query(
        &self,
        Parameters(request): Parameters<GraphqlBatchRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let outcome = tools::graphql::graphql_batch_query(
            &self.client,
            &request.query_string,
            request.variables_list,
            request.key_field.as_deref(),
            request.operation_name.as_deref(),
            request.max_concurrency,
        )
        .await;
        Ok(json_result(outcome))
    }

    #[tool(
        description = "Find repurposing candidates by chaining disease, target, and drug evidence. Returns ranked drugs with the supporting targets behind each one."
    )]
    pub async fn get_drug_repurposing_candidates(
        &self,
        Parameters(request): Parameters<DrugRepurposingRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.throttle().await;
        let defaults = RepurposingParams::default();
        let params = RepurposingParams {
            min_association_score: request
                .min_association_score
                .unwrap_or(defaults.min_association_score),
            max_targets: request.max_targets.unwrap_or(defaults.max_targets),
            min_clinical_phase: request
                .min_clinical_phase
                .unwrap_or(defaults.min_clinical_phase),
            approved_only: request.approved_only.unwrap_or(defaults.approved_only),
            max_drugs_per_target: request
                .max_drugs_per_target
                .unwrap_or(defaults.max_drugs_per_target),
            max_candidates: request.max_candidates.unwrap_or(defaults.max_candidates),
            max_concurrency: request.max_concurrency.unwrap_or(defaults.max_concurrency),
        };
        let outcome =
            tools::workflow::get_drug_repurposing_candidates(&self.client, &request.efo_id, params)
                .await;
        Ok(json_result(outcome))
    }
}

#[tool_handler]
impl ServerHandler for OpenTargetsService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

/// Tool names with the first line of each description, sorted by name.
pub fn tool_catalog() -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = OpenTargetsService::tool_router()
        .list_all()
        .into_iter()
        .map(|tool| {
            let summary = tool
                .description
                .as_deref()
                .and_then(|text| text.lines().next())
                .unwrap_or_default()
                .trim()
                .to_string();
            (tool.name.to_string(), summary)
        })
        .collect();
    entries.sort();
    entries
}

/// Runs the MCP server on the configured transport until the peer
/// disconnects or ctrl-c arrives, then closes the shared client.
pub async fn run(settings: ServerSettings, config: ClientConfig) -> anyhow::Result<()> {
    let client = Arc::new(OpenTargetsClient::new(config)?);
    let limiter = settings.effective_rate_limit().map(|(rps, burst)| {
        info!(rps, burst, "rate limiting enabled");
        Arc::new(RateLimiter::new(rps, burst))
    });
    let service = OpenTargetsService::new(client.clone(), limiter);

    match settings.transport {
        Transport::Stdio => {
            info!("starting MCP server on stdio");
            let running = service.serve(stdio()).await?;
            tokio::select! {
                quit = running.waiting() => {
                    quit?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                }
            }
        }
        Transport::Sse => {
            let address = tokio::net::lookup_host((settings.host.as_str(), settings.port))
                .await?
                .next()
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "could not resolve bind address {}:{}",
                        settings.host,
                        settings.port
                    )
                })?;
            info!(%address, "starting MCP server over SSE");
            let shutdown = SseServer::serve(address)
                .await?
                .with_service(move || service.clone());
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            shutdown.cancel();
        }
    }

    client.close();
    Ok(())
}
