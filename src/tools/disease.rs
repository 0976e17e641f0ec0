use serde_json::{Map, Value};

use crate::error::OtMcpError;
use crate::resolver::{self, EntityKind};
use crate::sources::opentargets::OpenTargetsClient;

use super::{apply_fields, validate_page_index, validate_page_size};

pub const DISEASE_INFO_QUERY: &str = r#"query DiseaseInfo($efoId: String!) {
  disease(efoId: $efoId) {
    id
    name
    description
    synonyms {
      relation
      terms
    }
    therapeuticAreas {
      id
      name
    }
    dbXRefs
  }
}"#;

pub const DISEASE_ASSOCIATED_TARGETS_QUERY: &str = r#"query DiseaseAssociatedTargets($efoId: String!, $pageIndex: Int!, $pageSize: Int!) {
  disease(efoId: $efoId) {
    id
    name
    associatedTargets(page: { index: $pageIndex, size: $pageSize }) {
      count
      rows {
        target {
          id
          approvedSymbol
          approvedName
          biotype
        }
        score
        datatypeScores {
          id
          score
        }
      }
    }
  }
}"#;

pub async fn get_disease_info(
    client: &OpenTargetsClient,
    efo_id: &str,
) -> Result<Value, OtMcpError> {
    let id = resolver::resolve(client, EntityKind::Disease, efo_id).await?;
    let mut variables = Map::new();
    variables.insert("efoId".into(), Value::String(id));
    client.execute(DISEASE_INFO_QUERY, Some(variables)).await
}

pub async fn get_disease_associated_targets(
    client: &OpenTargetsClient,
    efo_id: &str,
    page_index: i64,
    page_size: i64,
    fields: Option<&[String]>,
) -> Result<Value, OtMcpError> {
    validate_page_index(page_index)?;
    validate_page_size(page_size)?;
    let id = resolver::resolve(client, EntityKind::Disease, efo_id).await?;
    let mut variables = Map::new();
    variables.insert("efoId".into(), Value::String(id));
    variables.insert("pageIndex".into(), Value::from(page_index));
    variables.insert("pageSize".into(), Value::from(page_size));
    let payload = client
        .execute(DISEASE_ASSOCIATED_TARGETS_QUERY, Some(variables))
        .await?;
    Ok(apply_fields(payload, fields))
}
