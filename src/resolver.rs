use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, json};

use crate::entities::mapping::{self, MapIdsData};
use crate::error::OtMcpError;
use crate::sources::opentargets::{OPEN_TARGETS_API, OpenTargetsClient};

/// Shared mapping document. The resolver only reads `id` and `score`; the
/// `map_ids` tool passes the full payload through, so both use one query.
pub const MAP_IDS_QUERY: &str = r#"query MapIds($queryTerms: [String!]!, $entityNames: [String!]) {
  mapIds(queryTerms: $queryTerms, entityNames: $entityNames) {
    total
    mappings {
      term
      hits {
        id
        name
        entity
        category
        multiplier
        prefixes
        score
        object {
          __typename
          ... on Target {
            id
            approvedSymbol
            approvedName
          }
          ... on Disease {
            id
            name
            description
          }
          ... on Drug {
            id
            name
            drugType
          }
        }
      }
    }
    aggregations {
      total
      entities {
        name
        total
        categories {
          name
          total
        }
      }
    }
  }
}"#;

static TARGET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ENSG\d+").expect("target id pattern compiles"));
static DISEASE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(EFO|MONDO|HP|DOID|Orphanet|NCIT|GO|MP|OTAR|UBERON)_\d+$")
        .expect("disease id pattern compiles")
});
static DRUG_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CHEMBL\d+$").expect("drug id pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Target,
    Disease,
    Drug,
}

impl EntityKind {
    pub fn api_name(&self) -> &'static str {
        match self {
            EntityKind::Target => "target",
            EntityKind::Disease => "disease",
            EntityKind::Drug => "drug",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            EntityKind::Target => &TARGET_ID,
            EntityKind::Disease => &DISEASE_ID,
            EntityKind::Drug => &DRUG_ID,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Whether a value already has the canonical identifier shape for the kind:
/// `ENSG...` for targets, an ontology `PREFIX_digits` for diseases, and
/// `CHEMBL...` for drugs.
pub fn looks_like_id(kind: EntityKind, value: &str) -> bool {
    kind.pattern().is_match(value.trim())
}

/// Resolve free text to a platform identifier.
///
/// Values that already look like identifiers pass through untouched with no
/// network traffic. Anything else goes through `mapIds` scoped to the kind,
/// taking the highest-scoring hit; equal scores keep the first hit the API
/// returned, so resolution is deterministic.
pub async fn resolve(
    client: &OpenTargetsClient,
    kind: EntityKind,
    value: &str,
) -> Result<String, OtMcpError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(OtMcpError::InvalidArgument(format!(
            "{kind} identifier is required."
        )));
    }
    if looks_like_id(kind, trimmed) {
        return Ok(trimmed.to_string());
    }

    let mut variables = Map::new();
    variables.insert("queryTerms".to_string(), json!([trimmed]));
    variables.insert("entityNames".to_string(), json!([kind.api_name()]));
    let data = client.execute(MAP_IDS_QUERY, Some(variables)).await?;
    let parsed: MapIdsData = serde_json::from_value(data).map_err(|err| OtMcpError::Api {
        api: OPEN_TARGETS_API,
        message: format!("unexpected mapIds payload: {err}"),
    })?;

    match mapping::best_hit(parsed.first_term_hits()) {
        Some(hit) => Ok(hit.id.clone()),
        None => Err(OtMcpError::InvalidArgument(format!(
            "Unable to resolve {kind} identifier: {trimmed}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap_or_default().len()
    }

    #[test]
    fn id_shapes_per_kind() {
        assert!(looks_like_id(EntityKind::Target, "ENSG00000157764"));
        assert!(!looks_like_id(EntityKind::Target, "BRAF"));
        assert!(!looks_like_id(EntityKind::Target, "ensg123"));

        assert!(looks_like_id(EntityKind::Disease, "EFO_0000756"));
        assert!(looks_like_id(EntityKind::Disease, "MONDO_0005105"));
        assert!(looks_like_id(EntityKind::Disease, "Orphanet_399"));
        assert!(!looks_like_id(EntityKind::Disease, "EFO_0000756X"));
        assert!(!looks_like_id(EntityKind::Disease, "asthma"));

        assert!(looks_like_id(EntityKind::Drug, "CHEMBL25"));
        assert!(!looks_like_id(EntityKind::Drug, "CHEMBL25A"));
        assert!(!looks_like_id(EntityKind::Drug, "aspirin"));
    }

    #[tokio::test]
    async fn shaped_identifiers_pass_through_without_network() {
        let server = MockServer::start().await;
        let client = OpenTargetsClient::new_for_test(server.uri());
        let resolved = resolve(&client, EntityKind::Target, "  ENSG00000157764 ")
            .await
            .unwrap();
        assert_eq!(resolved, "ENSG00000157764");
        assert_eq!(request_count(&server).await, 0);
    }

    #[tokio::test]
    async fn free_text_goes_through_map_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "mapIds": {
                        "total": 1,
                        "mappings": [{
                            "term": "melanoma",
                            "hits": [
                                {"id": "EFO_0000756", "name": "melanoma", "entity": "disease", "score": 9.0},
                                {"id": "MONDO_0005105", "name": "melanoma (disease)", "entity": "disease", "score": 4.0},
                            ],
                        }],
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let resolved = resolve(&client, EntityKind::Disease, "melanoma").await.unwrap();
        assert_eq!(resolved, "EFO_0000756");
    }

    #[tokio::test]
    async fn score_ties_keep_the_first_hit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "mapIds": {
                        "total": 1,
                        "mappings": [{
                            "term": "nsclc",
                            "hits": [
                                {"id": "EFO_0003060", "score": 5.0},
                                {"id": "EFO_0000571", "score": 5.0},
                            ],
                        }],
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let resolved = resolve(&client, EntityKind::Disease, "nsclc").await.unwrap();
        assert_eq!(resolved, "EFO_0003060");
    }

    #[tokio::test]
    async fn unresolvable_terms_are_an_argument_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"mapIds": {"total": 0, "mappings": []}}
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let err = resolve(&client, EntityKind::Disease, "definitely not a disease")
            .await
            .unwrap_err();
        assert!(matches!(err, OtMcpError::InvalidArgument(_)));
        assert!(
            err.to_string()
                .contains("Unable to resolve disease identifier: definitely not a disease")
        );
    }

    #[tokio::test]
    async fn blank_values_are_rejected() {
        let server = MockServer::start().await;
        let client = OpenTargetsClient::new_for_test(server.uri());
        let err = resolve(&client, EntityKind::Drug, "   ").await.unwrap_err();
        assert!(err.to_string().contains("drug identifier is required."));
    }
}
