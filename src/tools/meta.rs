use serde_json::{Map, Value};

use crate::error::OtMcpError;
use crate::resolver::MAP_IDS_QUERY;
use crate::sources::opentargets::OpenTargetsClient;

pub const API_METADATA_QUERY: &str = r#"query ApiMetadata {
  meta {
    name
    apiVersion {
      x
      y
      z
    }
    dataVersion {
      year
      month
      iteration
    }
  }
}"#;

pub const ASSOCIATION_DATASOURCES_QUERY: &str = r#"query AssociationDatasources {
  associationDatasources {
    datasource
    datatype
  }
}"#;

pub fn default_entity_names() -> Vec<String> {
    vec!["target".into(), "disease".into(), "drug".into()]
}

pub async fn get_api_metadata(client: &OpenTargetsClient) -> Result<Value, OtMcpError> {
    client.execute(API_METADATA_QUERY, None).await
}

pub async fn get_association_datasources(
    client: &OpenTargetsClient,
) -> Result<Value, OtMcpError> {
    client.execute(ASSOCIATION_DATASOURCES_QUERY, None).await
}

pub async fn map_ids(
    client: &OpenTargetsClient,
    query_terms: &[String],
    entity_names: Option<Vec<String>>,
) -> Result<Value, OtMcpError> {
    let names = match entity_names {
        Some(names) if !names.is_empty() => names,
        _ => default_entity_names(),
    };
    let mut variables = Map::new();
    variables.insert("queryTerms".into(), Value::from(query_terms.to_vec()));
    variables.insert("entityNames".into(), Value::from(names));
    client.execute(MAP_IDS_QUERY, Some(variables)).await
}
