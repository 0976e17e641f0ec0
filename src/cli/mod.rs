//! Top-level CLI parsing and command execution.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use crate::config::{ClientConfig, DEFAULT_CACHE_TTL_SECS, ServerSettings};
use crate::entities::workflow::RepurposingReport;
use crate::error::OtMcpError;
use crate::server;
use crate::sources::batch::DEFAULT_BATCH_CONCURRENCY;
use crate::sources::opentargets::OpenTargetsClient;
use crate::tools;
use crate::tools::workflow::RepurposingParams;

#[derive(Parser, Debug)]
#[command(
    name = "otmcp",
    about = "Query targets, diseases, and drugs from the Open Targets Platform, or serve them as MCP tools",
    version,
    after_help = "Note: entity arguments accept native IDs (ENSG/EFO/MONDO/CHEMBL) or free-text names; names are resolved through the platform search index and the best hit wins."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON instead of Markdown
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable result caching (always fetch fresh data)
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Open Targets GraphQL endpoint override
    #[arg(long, global = true, value_name = "URL")]
    pub api: Option<String>,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the MCP server
    Serve {
        /// Transport to speak: stdio or sse
        #[arg(long)]
        transport: Option<String>,
        /// Host address to bind (SSE only)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (SSE only)
        #[arg(long)]
        port: Option<u16>,
        /// Enable global rate limiting with default settings
        #[arg(long)]
        rate_limiting: bool,
        /// Max requests per second (0 disables)
        #[arg(long, value_name = "RPS")]
        rate_limit_rps: Option<f64>,
        /// Burst capacity used when rate limiting is enabled
        #[arg(long, value_name = "N")]
        rate_limit_burst: Option<u32>,
    },
    /// List the MCP tools this server exposes
    Tools,
    /// Search entities by free text
    Search {
        query: String,
        /// Entity kinds to search (target, disease, drug)
        #[arg(long, value_delimiter = ',')]
        entities: Vec<String>,
        /// Rows to return
        #[arg(long, default_value_t = 10)]
        size: i64,
    },
    /// Get target details by Ensembl ID or symbol
    Target { id: String },
    /// Get disease details by EFO ID or name
    Disease { id: String },
    /// Get drug details by ChEMBL ID or name
    Drug { id: String },
    /// Known drugs for a target
    KnownDrugs {
        id: String,
        /// Dot-separated response paths to keep
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Targets associated with a disease
    AssociatedTargets {
        id: String,
        /// Zero-based page index
        #[arg(long, default_value_t = 0)]
        page_index: i64,
        /// Rows per page
        #[arg(long, default_value_t = 25)]
        page_size: i64,
    },
    /// Run a raw GraphQL query (read-only)
    Query {
        query: String,
        /// Inline JSON object, or @path to a file holding one
        #[arg(long)]
        variables: Option<String>,
        /// Operation to run when the document has several
        #[arg(long)]
        operation_name: Option<String>,
    },
    /// Run one GraphQL query against many variable sets
    Batch {
        query: String,
        /// Inline JSON array of variable objects, or @path to a file
        #[arg(long)]
        variables_list: String,
        /// Variable name echoed back as the result key
        #[arg(long)]
        key_field: Option<String>,
        /// Concurrent executions
        #[arg(long, default_value_t = DEFAULT_BATCH_CONCURRENCY)]
        concurrency: usize,
    },
    /// Rank drug repurposing candidates for a disease
    Repurpose {
        disease: String,
        /// Keep targets scored at or above this value (0-1)
        #[arg(long, default_value_t = 0.2)]
        min_score: f64,
        /// Association page size
        #[arg(long, default_value_t = 20)]
        max_targets: i64,
        /// Skip drug rows below this clinical phase
        #[arg(long, default_value_t = 2)]
        min_phase: i64,
        /// Keep approved drugs only
        #[arg(long)]
        approved_only: bool,
        /// Ranked candidates to return
        #[arg(long, default_value_t = 50)]
        max_candidates: i64,
    },
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base: self.api.clone(),
            cache_ttl_secs: if self.no_cache {
                0
            } else {
                DEFAULT_CACHE_TTL_SECS
            },
            ..ClientConfig::default()
        }
    }

    /// Resolve server settings for a `serve` invocation: environment first,
    /// then CLI flag overrides.
    pub fn server_launch(&self) -> Result<(ServerSettings, ClientConfig), OtMcpError> {
        let Commands::Serve {
            transport,
            host,
            port,
            rate_limiting,
            rate_limit_rps,
            rate_limit_burst,
        } = &self.command
        else {
            return Err(OtMcpError::InvalidConfig(
                "server_launch called outside of the serve command".to_string(),
            ));
        };
        let mut settings = ServerSettings::from_env()?;
        apply_serve_flags(
            &mut settings,
            transport.as_deref(),
            host.as_deref(),
            *port,
            *rate_limiting,
            *rate_limit_rps,
            *rate_limit_burst,
        )?;
        Ok((settings, self.client_config()))
    }
}

fn apply_serve_flags(
    settings: &mut ServerSettings,
    transport: Option<&str>,
    host: Option<&str>,
    port: Option<u16>,
    rate_limiting: bool,
    rate_limit_rps: Option<f64>,
    rate_limit_burst: Option<u32>,
) -> Result<(), OtMcpError> {
    if let Some(value) = transport {
        settings.transport = value.parse()?;
    }
    if let Some(value) = host {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            settings.host = trimmed.to_string();
        }
    }
    if let Some(value) = port {
        if value == 0 {
            return Err(OtMcpError::InvalidConfig(
                "--port must be between 1 and 65535".to_string(),
            ));
        }
        settings.port = value;
    }
    if rate_limiting {
        settings.rate_limit_enabled = true;
    }
    if let Some(rps) = rate_limit_rps {
        if !(rps >= 0.0) {
            return Err(OtMcpError::InvalidConfig(
                "--rate-limit-rps must be >= 0".to_string(),
            ));
        }
        settings.rate_limit_rps = rps;
    }
    if let Some(burst) = rate_limit_burst {
        if burst < 1 {
            return Err(OtMcpError::InvalidConfig(
                "--rate-limit-burst must be >= 1".to_string(),
            ));
        }
        settings.rate_limit_burst = burst;
    }
    Ok(())
}

pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let client = OpenTargetsClient::new(cli.client_config())?;
    let outcome = dispatch(&cli, &client).await;
    client.close();
    outcome
}

async fn dispatch(cli: &Cli, client: &OpenTargetsClient) -> anyhow::Result<String> {
    match &cli.command {
        Commands::Serve { .. } => {
            anyhow::bail!("serve should not go through CLI run()")
        }
        Commands::Tools => {
            let catalog = server::tool_catalog();
            if cli.json {
                let entries: Vec<Value> = catalog
                    .into_iter()
                    .map(|(name, description)| {
                        let mut entry = Map::new();
                        entry.insert("name".into(), Value::String(name));
                        entry.insert("description".into(), Value::String(description));
                        Value::Object(entry)
                    })
                    .collect();
                to_pretty(&Value::Array(entries))
            } else {
                let lines: Vec<String> = catalog
                    .into_iter()
                    .map(|(name, description)| format!("{name}: {description}"))
                    .collect();
                Ok(lines.join("\n"))
            }
        }
        Commands::Search {
            query,
            entities,
            size,
        } => {
            let names = if entities.is_empty() {
                None
            } else {
                Some(entities.clone())
            };
            let payload = tools::search::search_entities(client, query, names, 0, *size).await?;
            to_pretty(&payload)
        }
        Commands::Target { id } => {
            let payload = tools::target::get_target_info(client, id).await?;
            to_pretty(&payload)
        }
        Commands::Disease { id } => {
            let payload = tools::disease::get_disease_info(client, id).await?;
            to_pretty(&payload)
        }
        Commands::Drug { id } => {
            let payload = tools::drug::get_drug_info(client, id).await?;
            to_pretty(&payload)
        }
        Commands::KnownDrugs { id, fields } => {
            let fields = if fields.is_empty() {
                None
            } else {
                Some(fields.as_slice())
            };
            let payload = tools::target::get_target_known_drugs(client, id, 0, 10, fields).await?;
            to_pretty(&payload)
        }
        Commands::AssociatedTargets {
            id,
            page_index,
            page_size,
        } => {
            let payload = tools::disease::get_disease_associated_targets(
                client,
                id,
                *page_index,
                *page_size,
                None,
            )
            .await?;
            to_pretty(&payload)
        }
        Commands::Query {
            query,
            variables,
            operation_name,
        } => {
            let variables = variables
                .as_deref()
                .map(parse_variables_object)
                .transpose()?;
            let payload = tools::graphql::graphql_query(
                client,
                query,
                variables,
                operation_name.as_deref(),
                None,
            )
            .await?;
            to_pretty(&payload)
        }
        Commands::Batch {
            query,
            variables_list,
            key_field,
            concurrency,
        } => {
            let items = parse_variables_array(variables_list)?;
            let outcome = tools::graphql::graphql_batch_query(
                client,
                query,
                items,
                key_field.as_deref(),
                None,
                Some(*concurrency),
            )
            .await?;
            to_pretty(&outcome)
        }
        Commands::Repurpose {
            disease,
            min_score,
            max_targets,
            min_phase,
            approved_only,
            max_candidates,
        } => {
            let params = RepurposingParams {
                min_association_score: *min_score,
                max_targets: *max_targets,
                min_clinical_phase: *min_phase,
                approved_only: *approved_only,
                max_candidates: *max_candidates,
                ..RepurposingParams::default()
            };
            let report =
                tools::workflow::get_drug_repurposing_candidates(client, disease, params).await?;
            if cli.json {
                to_pretty(&report)
            } else {
                Ok(repurposing_markdown(&report))
            }
        }
    }
}

/// Main CLI execution from raw arguments.
///
/// # Errors
///
/// Returns an error when arguments cannot be parsed or when command
/// execution fails.
pub async fn execute(mut args: Vec<String>) -> anyhow::Result<String> {
    if args.is_empty() {
        args.push("otmcp".to_string());
    }
    let cli = Cli::try_parse_from(args)?;
    run(cli).await
}

fn to_pretty<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("serializing output")
}

/// `--variables` accepts an inline JSON object or `@path` to a file with one.
fn parse_variables_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match read_json_argument(raw)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("variables must be a JSON object"),
    }
}

fn parse_variables_array(raw: &str) -> anyhow::Result<Vec<Map<String, Value>>> {
    let Value::Array(items) = read_json_argument(raw)? else {
        anyhow::bail!("variables list must be a JSON array of objects");
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("variables list must be a JSON array of objects"),
        })
        .collect()
}

fn read_json_argument(raw: &str) -> anyhow::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading variables file {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("argument must be valid JSON")
}

fn repurposing_markdown(report: &RepurposingReport) -> String {
    let disease_label = report
        .disease
        .name
        .as_deref()
        .unwrap_or(report.disease.id.as_str());
    let mut out = String::new();
    out.push_str(&format!(
        "# Drug repurposing candidates for {disease_label}\n\n"
    ));
    out.push_str(&format!(
        "Evaluated {} associated targets; {} passed the score filter and {} had known drugs.\n",
        report.summary.targets_evaluated,
        report.summary.targets_passed_score_filter,
        report.summary.targets_with_known_drugs,
    ));
    if report.summary.targets_failed_drug_lookup > 0 {
        out.push_str(&format!(
            "{} drug lookups failed and were skipped.\n",
            report.summary.targets_failed_drug_lookup
        ));
    }
    out.push('\n');

    if report.candidates.is_empty() {
        out.push_str("No candidates passed the filters.\n");
    } else {
        out.push_str("| # | Drug | Type | Approved | Best phase | Best score | Targets |\n");
        out.push_str("|---|------|------|----------|------------|------------|---------|\n");
        for (rank, candidate) in report.candidates.iter().enumerate() {
            let name = candidate
                .drug
                .name
                .as_deref()
                .unwrap_or(candidate.drug.id.as_str());
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {:.3} | {} |\n",
                rank + 1,
                name,
                candidate.drug.drug_type.as_deref().unwrap_or("-"),
                if candidate.drug.is_approved { "yes" } else { "no" },
                candidate.best_phase,
                candidate.best_association_score,
                candidate.supporting_target_count,
            ));
        }
    }

    out.push('\n');
    out.push_str(&report_footer());
    out
}

fn report_footer() -> String {
    let generated = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());
    format!("_Generated {generated} from the Open Targets Platform._\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::workflow::{
        CandidateDrug, DiseaseHeader, DrugCandidate, WorkflowFilters, WorkflowSummary,
    };
    use serde_json::json;

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from([
            "otmcp",
            "serve",
            "--transport",
            "sse",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--rate-limiting",
        ])
        .expect("parses");
        match cli.command {
            Commands::Serve {
                transport,
                host,
                port,
                rate_limiting,
                ..
            } => {
                assert_eq!(transport.as_deref(), Some("sse"));
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(9000));
                assert!(rate_limiting);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn serve_flags_override_settings() {
        let mut settings = ServerSettings::default();
        apply_serve_flags(
            &mut settings,
            Some("sse"),
            Some("127.0.0.1"),
            Some(9000),
            true,
            Some(2.5),
            Some(10),
        )
        .expect("applies");
        assert_eq!(settings.transport, crate::config::Transport::Sse);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 9000);
        assert!(settings.rate_limit_enabled);
        assert_eq!(settings.effective_rate_limit(), Some((2.5, 10)));
    }

    #[test]
    fn serve_rejects_port_zero() {
        let mut settings = ServerSettings::default();
        let err = apply_serve_flags(&mut settings, None, None, Some(0), false, None, None)
            .expect_err("port zero");
        assert!(
            err.to_string()
                .contains("--port must be between 1 and 65535")
        );
    }

    #[test]
    fn serve_rejects_negative_rps() {
        let mut settings = ServerSettings::default();
        let err = apply_serve_flags(&mut settings, None, None, None, false, Some(-1.0), None)
            .expect_err("negative rps");
        assert!(err.to_string().contains("--rate-limit-rps must be >= 0"));
    }

    #[test]
    fn unsupported_transport_is_rejected() {
        let mut settings = ServerSettings::default();
        let err = apply_serve_flags(&mut settings, Some("http"), None, None, false, None, None)
            .expect_err("http transport");
        assert!(err.to_string().contains("unsupported MCP transport"));
    }

    #[test]
    fn query_command_parses_inline_variables() {
        let cli = Cli::try_parse_from([
            "otmcp",
            "query",
            "query Q($id: String!) { target(ensemblId: $id) { id } }",
            "--variables",
            r#"{"id": "ENSG00000146648"}"#,
        ])
        .expect("parses");
        let Commands::Query { variables, .. } = cli.command else {
            panic!("expected query command");
        };
        let parsed = parse_variables_object(variables.as_deref().expect("variables")).unwrap();
        assert_eq!(parsed["id"], json!("ENSG00000146648"));
    }

    #[test]
    fn variables_must_be_an_object() {
        let err = parse_variables_object("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn variables_list_rejects_non_object_items() {
        let err = parse_variables_array(r#"[{"a": 1}, 5]"#).unwrap_err();
        assert!(err.to_string().contains("array of objects"));
        let parsed = parse_variables_array(r#"[{"a": 1}, {"b": 2}]"#).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn no_cache_flag_disables_the_result_cache() {
        let cli = Cli::try_parse_from(["otmcp", "--no-cache", "tools"]).expect("parses");
        assert_eq!(cli.client_config().cache_ttl_secs, 0);

        let cli = Cli::try_parse_from(["otmcp", "tools"]).expect("parses");
        assert_eq!(cli.client_config().cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }

    #[tokio::test]
    async fn tools_command_lists_the_catalog_offline() {
        let output = execute(vec!["otmcp".into(), "tools".into()])
            .await
            .expect("runs");
        assert!(output.contains("search_entities"));
        assert!(output.contains("get_drug_repurposing_candidates"));
    }

    #[test]
    fn repurposing_report_renders_as_a_table() {
        let report = RepurposingReport {
            disease: DiseaseHeader {
                id: "EFO_0000305".into(),
                name: Some("breast carcinoma".into()),
            },
            summary: WorkflowSummary {
                targets_evaluated: 5,
                targets_passed_score_filter: 3,
                targets_with_known_drugs: 2,
                targets_failed_drug_lookup: 1,
                unique_drug_candidates: 1,
                filters: WorkflowFilters {
                    min_association_score: 0.2,
                    min_clinical_phase: 2,
                    approved_only: false,
                },
            },
            targets: Vec::new(),
            candidates: vec![DrugCandidate {
                drug: CandidateDrug {
                    id: "CHEMBL1201585".into(),
                    name: Some("TRASTUZUMAB".into()),
                    drug_type: Some("Antibody".into()),
                    is_approved: true,
                    maximum_clinical_trial_phase: Some(json!(4)),
                },
                best_association_score: 0.82,
                best_phase: 4,
                supporting_target_count: 1,
                supporting_targets: Vec::new(),
            }],
        };

        let markdown = repurposing_markdown(&report);
        assert!(markdown.contains("# Drug repurposing candidates for breast carcinoma"));
        assert!(markdown.contains("| 1 | TRASTUZUMAB | Antibody | yes | 4 | 0.820 | 1 |"));
        assert!(markdown.contains("1 drug lookups failed"));
        assert!(markdown.contains("_Generated "));
    }
}
