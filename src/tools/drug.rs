use serde_json::{Map, Value};

use crate::error::OtMcpError;
use crate::resolver::{self, EntityKind};
use crate::sources::opentargets::OpenTargetsClient;

pub const DRUG_INFO_QUERY: &str = r#"query DrugInfo($chemblId: String!) {
  drug(chemblId: $chemblId) {
    id
    name
    synonyms
    tradeNames
    drugType
    description
    isApproved
    hasBeenWithdrawn
    blackBoxWarning
    yearOfFirstApproval
    maximumClinicalTrialPhase
    mechanismsOfAction {
      rows {
        mechanismOfAction
        targetName
        targets {
          id
          approvedSymbol
        }
        actionType
        references {
          source
          ids
          urls
        }
      }
    }
    indications {
      rows {
        disease {
          id
          name
          therapeuticAreas {
            id
            name
          }
        }
        maxPhaseForIndication
        references {
          source
          ids
        }
      }
      count
    }
    linkedTargets {
      rows {
        id
        approvedSymbol
        biotype
      }
      count
    }
  }
}"#;

pub async fn get_drug_info(
    client: &OpenTargetsClient,
    chembl_id: &str,
) -> Result<Value, OtMcpError> {
    let id = resolver::resolve(client, EntityKind::Drug, chembl_id).await?;
    let mut variables = Map::new();
    variables.insert("chemblId".into(), Value::String(id));
    client.execute(DRUG_INFO_QUERY, Some(variables)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn chembl_ids_pass_straight_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("DrugInfo"))
            .and(body_partial_json(json!({"variables": {"chemblId": "CHEMBL941"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"drug": {"id": "CHEMBL941", "name": "IMATINIB", "isApproved": true}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let payload = get_drug_info(&client, "CHEMBL941").await.unwrap();
        assert_eq!(payload["drug"]["name"], json!("IMATINIB"));
    }

    #[tokio::test]
    async fn drug_names_resolve_through_the_mapper() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("MapIds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"mapIds": {"total": 1, "mappings": [{
                    "term": "imatinib",
                    "hits": [{"id": "CHEMBL941", "name": "IMATINIB", "entity": "drug", "score": 9.1}],
                }]}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("DrugInfo"))
            .and(body_partial_json(json!({"variables": {"chemblId": "CHEMBL941"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"drug": {"id": "CHEMBL941"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        get_drug_info(&client, "imatinib").await.unwrap();
    }
}
