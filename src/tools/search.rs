use serde_json::{Map, Value};
use tracing::info;

use crate::entities::mapping::{self, MapIdsData};
use crate::entities::search::SearchData;
use crate::error::OtMcpError;
use crate::resolver::{self, EntityKind, MAP_IDS_QUERY};
use crate::sources::opentargets::OpenTargetsClient;
use crate::util::prune_nulls;

use super::meta::default_entity_names;
use super::{validate_page_index, validate_page_size, validate_size, validate_threshold};

pub const SEARCH_ENTITIES_QUERY: &str = r#"query SearchEntities($queryString: String!, $entityNames: [String!], $pageIndex: Int!, $pageSize: Int!) {
  search(queryString: $queryString, entityNames: $entityNames, page: { index: $pageIndex, size: $pageSize }) {
    total
    hits {
      id
      entity
      name
      description
      score
      highlights
      object {
        __typename
        ... on Target {
          id
          approvedSymbol
          approvedName
          biotype
        }
        ... on Disease {
          id
          name
          description
          therapeuticAreas {
            id
            name
          }
        }
        ... on Drug {
          id
          name
          drugType
          maximumClinicalTrialPhase
          isApproved
        }
      }
    }
  }
}"#;

pub const SEARCH_FACETS_QUERY: &str = r#"query SearchFacets($queryString: String!, $categoryId: String, $entityNames: [String!], $pageIndex: Int!, $pageSize: Int!) {
  facets(queryString: $queryString, category: $categoryId, entityNames: $entityNames, page: { index: $pageIndex, size: $pageSize }) {
    total
    categories {
      name
      total
    }
    hits {
      id
      label
      category
      score
      entityIds
      datasourceId
      highlights
    }
  }
}"#;

pub const SIMILAR_TARGETS_QUERY: &str = r#"query SimilarTargets($entityId: String!, $threshold: Float, $size: Int!) {
  target(ensemblId: $entityId) {
    id
    approvedSymbol
    similarEntities(threshold: $threshold, size: $size) {
      score
      object {
        __typename
        ... on Target {
          id
          approvedSymbol
          approvedName
        }
      }
    }
  }
}"#;

const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

pub const DEFAULT_FACETS_PAGE_SIZE: i64 = 20;

async fn search_direct(
    client: &OpenTargetsClient,
    query_string: &str,
    entity_names: &[String],
    page_index: i64,
    page_size: i64,
) -> Result<Value, OtMcpError> {
    let mut variables = Map::new();
    variables.insert("queryString".into(), Value::String(query_string.into()));
    variables.insert("entityNames".into(), Value::from(entity_names.to_vec()));
    variables.insert("pageIndex".into(), Value::from(page_index));
    variables.insert("pageSize".into(), Value::from(page_size));
    client.execute(SEARCH_ENTITIES_QUERY, Some(variables)).await
}

/// Appends a compact `(id, entity, name)` list under `search.triples` so
/// callers can pick an identifier without walking the full hit objects.
fn attach_triples(mut payload: Value) -> Value {
    let triples = serde_json::from_value::<SearchData>(payload.clone())
        .map(|data| data.triples())
        .unwrap_or_default();
    if let Some(search) = payload.get_mut("search").and_then(Value::as_object_mut) {
        let rows = serde_json::to_value(&triples).unwrap_or_else(|_| Value::Array(Vec::new()));
        search.insert("triples".into(), rows);
    }
    payload
}

/// Direct search and identifier mapping run in parallel. When the mapper's
/// best hit points at a different entity than the direct top hit, the query
/// was an alias and the search is re-run with the canonical id.
pub async fn search_entities(
    client: &OpenTargetsClient,
    query_string: &str,
    entity_names: Option<Vec<String>>,
    page_index: i64,
    page_size: i64,
) -> Result<Value, OtMcpError> {
    validate_page_index(page_index)?;
    validate_page_size(page_size)?;

    let names = match entity_names {
        Some(names) if !names.is_empty() => names,
        _ => default_entity_names(),
    };

    let mapping_variables = {
        let mut variables = Map::new();
        variables.insert("queryTerms".into(), Value::from(vec![query_string.to_string()]));
        variables.insert("entityNames".into(), Value::from(names.clone()));
        variables
    };
    let (direct, mapped) = tokio::join!(
        search_direct(client, query_string, &names, page_index, page_size),
        client.execute(MAP_IDS_QUERY, Some(mapping_variables)),
    );
    let direct = direct?;
    let mapped = mapped?;

    let parsed = serde_json::from_value::<MapIdsData>(mapped).ok();
    let best = parsed
        .as_ref()
        .and_then(|data| mapping::best_hit(data.first_term_hits()));

    let direct_top_id = direct
        .pointer("/search/hits/0/id")
        .and_then(Value::as_str);
    if let Some(hit) = best
        && direct_top_id != Some(hit.id.as_str())
    {
        info!(term = %query_string, id = %hit.id, "resolving query to canonical match");
        let canonical = search_direct(client, &hit.id, &names, page_index, page_size).await?;
        return Ok(attach_triples(canonical));
    }

    Ok(attach_triples(direct))
}

pub async fn search_facets(
    client: &OpenTargetsClient,
    query_string: Option<&str>,
    category_id: Option<&str>,
    entity_names: Option<Vec<String>>,
    page_index: i64,
    page_size: i64,
) -> Result<Value, OtMcpError> {
    validate_page_index(page_index)?;
    validate_page_size(page_size)?;

    let query = match query_string {
        Some(text) if !text.is_empty() => text,
        _ => "*",
    };
    let names = match entity_names {
        Some(names) if !names.is_empty() => names,
        _ => default_entity_names(),
    };

    let mut variables = Map::new();
    variables.insert("queryString".into(), Value::String(query.into()));
    variables.insert(
        "categoryId".into(),
        category_id.map(|id| Value::String(id.into())).unwrap_or(Value::Null),
    );
    variables.insert("entityNames".into(), Value::from(names));
    variables.insert("pageIndex".into(), Value::from(page_index));
    variables.insert("pageSize".into(), Value::from(page_size));

    client
        .execute(SEARCH_FACETS_QUERY, Some(prune_nulls(variables)))
        .await
}

pub async fn get_similar_targets(
    client: &OpenTargetsClient,
    entity_id: &str,
    threshold: Option<f64>,
    size: i64,
) -> Result<Value, OtMcpError> {
    validate_threshold(threshold)?;
    validate_size(size)?;

    let id = resolver::resolve(client, EntityKind::Target, entity_id).await?;
    let mut variables = Map::new();
    variables.insert("entityId".into(), Value::String(id));
    variables.insert(
        "threshold".into(),
        Value::from(threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD)),
    );
    variables.insert("size".into(), Value::from(size));
    client.execute(SIMILAR_TARGETS_QUERY, Some(variables)).await
}
