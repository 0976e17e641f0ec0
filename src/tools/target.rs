use serde_json::{Map, Value};

use crate::error::OtMcpError;
use crate::resolver::{self, EntityKind};
use crate::sources::opentargets::OpenTargetsClient;

use super::{apply_fields, validate_page_index, validate_page_size};

pub const TARGET_INFO_QUERY: &str = r#"query TargetInfo($ensemblId: String!) {
  target(ensemblId: $ensemblId) {
    id
    approvedSymbol
    approvedName
    biotype
    functionDescriptions
    synonyms {
      label
      source
    }
    genomicLocation {
      chromosome
      start
      end
      strand
    }
    proteinIds {
      id
      source
    }
  }
}"#;

pub const TARGET_KNOWN_DRUGS_QUERY: &str = r#"query TargetKnownDrugs($ensemblId: String!) {
  target(ensemblId: $ensemblId) {
    knownDrugs {
      count
      rows {
        drugId
        targetId
        drug {
          id
          name
          drugType
          maximumClinicalTrialPhase
          isApproved
          description
        }
        mechanismOfAction
        disease {
          id
          name
        }
        phase
        status
        urls {
          name
          url
        }
      }
    }
  }
}"#;

pub const TARGET_ASSOCIATED_DISEASES_QUERY: &str = r#"query TargetAssociatedDiseases($ensemblId: String!, $pageIndex: Int!, $pageSize: Int!) {
  target(ensemblId: $ensemblId) {
    associatedDiseases(page: { index: $pageIndex, size: $pageSize }) {
      count
      rows {
        disease {
          id
          name
          description
          therapeuticAreas {
            id
            name
          }
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

pub async fn get_target_info(
    client: &OpenTargetsClient,
    ensembl_id: &str,
) -> Result<Value, OtMcpError> {
    let id = resolver::resolve(client, EntityKind::Target, ensembl_id).await?;
    let mut variables = Map::new();
    variables.insert("ensemblId".into(), Value::String(id));
    client.execute(TARGET_INFO_QUERY, Some(variables)).await
}

/// Page arguments are validated for interface parity with the other listing
/// tools; the known-drugs endpoint itself returns the full row set.
pub async fn get_target_known_drugs(
    client: &OpenTargetsClient,
    ensembl_id: &str,
    page_index: i64,
    page_size: i64,
    fields: Option<&[String]>,
) -> Result<Value, OtMcpError> {
    validate_page_index(page_index)?;
    validate_page_size(page_size)?;
    let id = resolver::resolve(client, EntityKind::Target, ensembl_id).await?;
    let mut variables = Map::new();
    variables.insert("ensemblId".into(), Value::String(id));
    let payload = client
        .execute(TARGET_KNOWN_DRUGS_QUERY, Some(variables))
        .await?;
    Ok(apply_fields(payload, fields))
}

pub async fn get_target_associated_diseases(
    client: &OpenTargetsClient,
    ensembl_id: &str,
    page_index: i64,
    page_size: i64,
    fields: Option<&[String]>,
) -> Result<Value, OtMcpError> {
    validate_page_index(page_index)?;
    validate_page_size(page_size)?;
    let id = resolver::resolve(client, EntityKind::Target, ensembl_id).await?;
    let mut variables = Map::new();
    variables.insert("ensemblId".into(), Value::String(id));
    variables.insert("pageIndex".into(), Value::from(page_index));
    variables.insert("pageSize".into(), Value::from(page_size));
    let payload = client
        .execute(TARGET_ASSOCIATED_DISEASES_QUERY, Some(variables))
        .await?;
    Ok(apply_fields(payload, fields))
}
