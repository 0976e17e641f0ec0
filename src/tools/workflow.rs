use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use futures::StreamExt;
use serde_json::{Map, Value};
use tracing::warn;

use crate::entities::workflow::{
    CandidateDrug, DiseaseAssociations, DiseaseHeader, DiseaseTargetsData, DrugCandidate,
    RepurposingReport, SupportingTarget, TargetDrugsData, TargetSelection, WorkflowFilters,
    WorkflowSummary, coerce_phase,
};
use crate::error::OtMcpError;
use crate::resolver::{self, EntityKind};
use crate::sources::opentargets::OpenTargetsClient;

use super::{disease, target};

pub const MAX_WORKFLOW_TARGETS: i64 = 200;
pub const MAX_WORKFLOW_DRUGS_PER_TARGET: i64 = 100;
pub const MAX_WORKFLOW_CANDIDATES: i64 = 200;
pub const MAX_WORKFLOW_CONCURRENCY: i64 = 20;

/// Tuning knobs for the repurposing pipeline. All counts are hard-capped by
/// the `MAX_WORKFLOW_*` limits at call time.
#[derive(Debug, Clone)]
pub struct RepurposingParams {
    pub min_association_score: f64,
    pub max_targets: i64,
    pub min_clinical_phase: i64,
    pub approved_only: bool,
    pub max_drugs_per_target: i64,
    pub max_candidates: i64,
    pub max_concurrency: i64,
}

impl Default for RepurposingParams {
    fn default() -> Self {
        Self {
            min_association_score: 0.2,
            max_targets: 20,
            min_clinical_phase: 2,
            approved_only: false,
            max_drugs_per_target: 30,
            max_candidates: 50,
            max_concurrency: 4,
        }
    }
}

fn validate(params: &RepurposingParams) -> Result<(), OtMcpError> {
    if !(0.0..=1.0).contains(&params.min_association_score) {
        return Err(OtMcpError::InvalidArgument(
            "min_association_score must be between 0 and 1.".into(),
        ));
    }
    if params.max_targets < 1 {
        return Err(OtMcpError::InvalidArgument(
            "max_targets must be >= 1.".into(),
        ));
    }
    if params.max_targets > MAX_WORKFLOW_TARGETS {
        return Err(OtMcpError::InvalidArgument(format!(
            "max_targets must be <= {MAX_WORKFLOW_TARGETS}."
        )));
    }
    if params.min_clinical_phase < 0 {
        return Err(OtMcpError::InvalidArgument(
            "min_clinical_phase must be >= 0.".into(),
        ));
    }
    if params.max_drugs_per_target < 1 {
        return Err(OtMcpError::InvalidArgument(
            "max_drugs_per_target must be >= 1.".into(),
        ));
    }
    if params.max_drugs_per_target > MAX_WORKFLOW_DRUGS_PER_TARGET {
        return Err(OtMcpError::InvalidArgument(format!(
            "max_drugs_per_target must be <= {MAX_WORKFLOW_DRUGS_PER_TARGET}."
        )));
    }
    if params.max_candidates < 1 {
        return Err(OtMcpError::InvalidArgument(
            "max_candidates must be >= 1.".into(),
        ));
    }
    if params.max_candidates > MAX_WORKFLOW_CANDIDATES {
        return Err(OtMcpError::InvalidArgument(format!(
            "max_candidates must be <= {MAX_WORKFLOW_CANDIDATES}."
        )));
    }
    if params.max_concurrency < 1 {
        return Err(OtMcpError::InvalidArgument(
            "max_concurrency must be >= 1.".into(),
        ));
    }
    if params.max_concurrency > MAX_WORKFLOW_CONCURRENCY {
        return Err(OtMcpError::InvalidArgument(format!(
            "max_concurrency must be <= {MAX_WORKFLOW_CONCURRENCY}."
        )));
    }
    Ok(())
}

/// Chains disease resolution, association lookup, and per-target known-drug
/// fan-out into a ranked list of repurposing candidates.
///
/// Per-target lookup failures are counted and logged, never fatal; one dead
/// target still leaves the rest of the report usable.
pub async fn get_drug_repurposing_candidates(
    client: &OpenTargetsClient,
    efo_id: &str,
    params: RepurposingParams,
) -> Result<RepurposingReport, OtMcpError> {
    validate(&params)?;

    let resolved_efo_id = resolver::resolve(client, EntityKind::Disease, efo_id).await?;

    let mut variables = Map::new();
    variables.insert("efoId".into(), Value::String(resolved_efo_id.clone()));
    variables.insert("pageIndex".into(), Value::from(0));
    variables.insert("pageSize".into(), Value::from(params.max_targets));
    let associations = client
        .execute(disease::DISEASE_ASSOCIATED_TARGETS_QUERY, Some(variables))
        .await?;

    let disease = serde_json::from_value::<DiseaseTargetsData>(associations)
        .ok()
        .and_then(|data| data.disease)
        .filter(|disease| disease.id.as_deref().is_some_and(|id| !id.is_empty()));
    let Some(disease) = disease else {
        return Err(OtMcpError::InvalidArgument(format!(
            "Disease not found for identifier: {resolved_efo_id}"
        )));
    };
    let DiseaseAssociations {
        id,
        name: disease_name,
        associated_targets,
    } = disease;
    let disease_id = id.unwrap_or(resolved_efo_id);

    let all_rows = associated_targets.map(|table| table.rows).unwrap_or_default();
    let targets_evaluated = all_rows.len();

    let mut selected: Vec<TargetSelection> = Vec::new();
    for row in &all_rows {
        let Some(score) = row.score else { continue };
        if score < params.min_association_score {
            continue;
        }
        let Some(target_id) = row
            .target
            .as_ref()
            .and_then(|t| t.id.clone())
            .filter(|id| !id.is_empty())
        else {
            continue;
        };
        let target = row.target.as_ref();
        selected.push(TargetSelection {
            target_id,
            target_symbol: target.and_then(|t| t.approved_symbol.clone()),
            target_name: target.and_then(|t| t.approved_name.clone()),
            association_score: score,
        });
    }

    let mut lookups = futures::stream::iter(selected.iter().cloned().enumerate().map(
        |(index, selection)| async move {
            let mut variables = Map::new();
            variables.insert(
                "ensemblId".into(),
                Value::String(selection.target_id.clone()),
            );
            let outcome = client
                .execute(target::TARGET_KNOWN_DRUGS_QUERY, Some(variables))
                .await;
            (index, selection, outcome)
        },
    ))
    .buffer_unordered(params.max_concurrency as usize)
    .collect::<Vec<_>>()
    .await;
    lookups.sort_by_key(|(index, ..)| *index);

    let mut targets_failed_drug_lookup = 0usize;
    let mut drug_sets: Vec<(TargetSelection, Vec<_>)> = Vec::new();
    for (_, selection, outcome) in lookups {
        match outcome {
            Ok(payload) => {
                let rows = serde_json::from_value::<TargetDrugsData>(payload)
                    .ok()
                    .and_then(|data| data.target)
                    .and_then(|t| t.known_drugs)
                    .map(|k| k.rows)
                    .unwrap_or_default();
                drug_sets.push((selection, rows));
            }
            Err(err) => {
                warn!(target_id = %selection.target_id, "known drug lookup failed: {err}");
                targets_failed_drug_lookup += 1;
            }
        }
    }

    let mut candidates: Vec<DrugCandidate> = Vec::new();
    let mut index_by_drug: HashMap<String, usize> = HashMap::new();
    let mut targets_with_known_drugs = 0usize;

    for (selection, rows) in &drug_sets {
        if !rows.is_empty() {
            targets_with_known_drugs += 1;
        }
        for row in rows.iter().take(params.max_drugs_per_target as usize) {
            let drug = row.drug.as_ref();
            let Some(drug_id) = drug
                .and_then(|d| d.id.clone())
                .filter(|id| !id.is_empty())
                .or_else(|| row.drug_id.clone().filter(|id| !id.is_empty()))
            else {
                continue;
            };

            let phase = coerce_phase(row.phase.as_ref());
            if phase < params.min_clinical_phase {
                continue;
            }

            let is_approved = drug.and_then(|d| d.is_approved).unwrap_or(false);
            if params.approved_only && !is_approved {
                continue;
            }

            let support = SupportingTarget {
                target_id: selection.target_id.clone(),
                target_symbol: selection.target_symbol.clone(),
                association_score: selection.association_score,
                phase,
                status: row.status.clone(),
                mechanism_of_action: row.mechanism_of_action.clone(),
            };

            match index_by_drug.get(&drug_id) {
                Some(&index) => {
                    let candidate = &mut candidates[index];
                    if selection.association_score > candidate.best_association_score {
                        candidate.best_association_score = selection.association_score;
                    }
                    if phase > candidate.best_phase {
                        candidate.best_phase = phase;
                    }
                    // Approval only ever flips on, no supporting row can
                    // take it back.
                    if is_approved {
                        candidate.drug.is_approved = true;
                    }
                    candidate.supporting_targets.push(support);
                }
                None => {
                    index_by_drug.insert(drug_id.clone(), candidates.len());
                    candidates.push(DrugCandidate {
                        drug: CandidateDrug {
                            id: drug_id,
                            name: drug.and_then(|d| d.name.clone()),
                            drug_type: drug.and_then(|d| d.drug_type.clone()),
                            is_approved,
                            maximum_clinical_trial_phase: drug
                                .and_then(|d| d.maximum_clinical_trial_phase.clone()),
                        },
                        best_association_score: selection.association_score,
                        best_phase: phase,
                        supporting_target_count: 0,
                        supporting_targets: vec![support],
                    });
                }
            }
        }
    }

    for candidate in &mut candidates {
        candidate.supporting_targets.sort_by(|a, b| {
            b.association_score
                .partial_cmp(&a.association_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.phase.cmp(&a.phase))
        });
        let distinct: HashSet<&str> = candidate
            .supporting_targets
            .iter()
            .map(|support| support.target_id.as_str())
            .collect();
        candidate.supporting_target_count = distinct.len();
    }

    candidates.sort_by(|a, b| {
        b.drug
            .is_approved
            .cmp(&a.drug.is_approved)
            .then_with(|| {
                b.best_association_score
                    .partial_cmp(&a.best_association_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| b.best_phase.cmp(&a.best_phase))
            .then_with(|| b.supporting_target_count.cmp(&a.supporting_target_count))
    });
    candidates.truncate(params.max_candidates as usize);

    Ok(RepurposingReport {
        disease: DiseaseHeader {
            id: disease_id,
            name: disease_name,
        },
        summary: WorkflowSummary {
            targets_evaluated,
            targets_passed_score_filter: selected.len(),
            targets_with_known_drugs,
            targets_failed_drug_lookup,
            unique_drug_candidates: candidates.len(),
            filters: WorkflowFilters {
                min_association_score: params.min_association_score,
                min_clinical_phase: params.min_clinical_phase,
                approved_only: params.approved_only,
            },
        },
        targets: selected,
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap_or_default().len()
    }

    fn association_page() -> Value {
        json!({
            "data": {"disease": {
                "id": "EFO_0000270",
                "name": "asthma",
                "associatedTargets": {"count": 3, "rows": [
                    {
                        "score": 0.9,
                        "target": {"id": "ENSG00000000001", "approvedSymbol": "AAA1",
                                    "approvedName": "target one"},
                    },
                    {
                        "score": 0.5,
                        "target": {"id": "ENSG00000000002", "approvedSymbol": "BBB2",
                                    "approvedName": "target two"},
                    },
                    {
                        "score": 0.1,
                        "target": {"id": "ENSG00000000003", "approvedSymbol": "CCC3",
                                    "approvedName": "below threshold"},
                    },
                ]},
            }}
        })
    }

    async fn mount_association_page(server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_string_contains("DiseaseAssociatedTargets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(association_page()))
            .mount(server)
            .await;
    }

    async fn mount_known_drugs(server: &MockServer, ensembl_id: &str, rows: Value) {
        Mock::given(method("POST"))
            .and(body_string_contains("TargetKnownDrugs"))
            .and(body_partial_json(json!({"variables": {"ensemblId": ensembl_id}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"target": {"knownDrugs": {"count": 0, "rows": rows}}}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn parameters_are_checked_before_any_network_traffic() {
        let server = MockServer::start().await;
        let client = OpenTargetsClient::new_for_test(server.uri());

        let cases: Vec<(RepurposingParams, &str)> = vec![
            (
                RepurposingParams {
                    min_association_score: 1.5,
                    ..Default::default()
                },
                "min_association_score must be between 0 and 1.",
            ),
            (
                RepurposingParams {
                    max_targets: 0,
                    ..Default::default()
                },
                "max_targets must be >= 1.",
            ),
            (
                RepurposingParams {
                    max_targets: 201,
                    ..Default::default()
                },
                "max_targets must be <= 200.",
            ),
            (
                RepurposingParams {
                    min_clinical_phase: -1,
                    ..Default::default()
                },
                "min_clinical_phase must be >= 0.",
            ),
            (
                RepurposingParams {
                    max_drugs_per_target: 101,
                    ..Default::default()
                },
                "max_drugs_per_target must be <= 100.",
            ),
            (
                RepurposingParams {
                    max_candidates: 201,
                    ..Default::default()
                },
                "max_candidates must be <= 200.",
            ),
            (
                RepurposingParams {
                    max_concurrency: 0,
                    ..Default::default()
                },
                "max_concurrency must be >= 1.",
            ),
            (
                RepurposingParams {
                    max_concurrency: 21,
                    ..Default::default()
                },
                "max_concurrency must be <= 20.",
            ),
        ];

        for (params, message) in cases {
            let err = get_drug_repurposing_candidates(&client, "EFO_0000270", params)
                .await
                .unwrap_err();
            assert!(err.to_string().contains(message), "missing: {message}");
        }
        assert_eq!(request_count(&server).await, 0);
    }

    #[tokio::test]
    async fn approved_drugs_outrank_unapproved_ones_with_equal_scores() {
        let server = MockServer::start().await;
        mount_association_page(&server).await;
        mount_known_drugs(
            &server,
            "ENSG00000000001",
            json!([
                {
                    "drugId": "CHEMBL1",
                    "phase": 4,
                    "status": "Completed",
                    "mechanismOfAction": "inhibitor",
                    "drug": {"id": "CHEMBL1", "name": "ALPHA", "drugType": "Small molecule",
                              "isApproved": true, "maximumClinicalTrialPhase": 4},
                },
                {
                    "drugId": "CHEMBL2",
                    "phase": 2,
                    "status": "Recruiting",
                    "mechanismOfAction": "antagonist",
                    "drug": {"id": "CHEMBL2", "name": "BETA", "isApproved": false},
                },
            ]),
        )
        .await;
        mount_known_drugs(
            &server,
            "ENSG00000000002",
            json!([
                {
                    "drugId": "CHEMBL2",
                    "phase": 3,
                    "drug": {"id": "CHEMBL2", "name": "BETA", "isApproved": false},
                },
                {
                    "drugId": "CHEMBL3",
                    "phase": 1,
                    "drug": {"id": "CHEMBL3", "name": "GAMMA", "isApproved": false},
                },
            ]),
        )
        .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let report = get_drug_repurposing_candidates(
            &client,
            "EFO_0000270",
            RepurposingParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.disease.id, "EFO_0000270");
        assert_eq!(report.disease.name.as_deref(), Some("asthma"));

        assert_eq!(report.summary.targets_evaluated, 3);
        assert_eq!(report.summary.targets_passed_score_filter, 2);
        assert_eq!(report.summary.targets_with_known_drugs, 2);
        assert_eq!(report.summary.targets_failed_drug_lookup, 0);
        assert_eq!(report.summary.unique_drug_candidates, 2);

        // ALPHA and BETA both peak at 0.9; approval decides the order.
        // GAMMA never reaches phase 2 and is dropped.
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.candidates[0].drug.id, "CHEMBL1");
        assert!(report.candidates[0].drug.is_approved);
        assert_eq!(report.candidates[1].drug.id, "CHEMBL2");
        assert_eq!(report.candidates[1].best_association_score, 0.9);
        assert_eq!(report.candidates[1].best_phase, 3);
        assert_eq!(report.candidates[1].supporting_target_count, 2);

        // Supporting rows ranked by score before phase.
        let supports = &report.candidates[1].supporting_targets;
        assert_eq!(supports[0].target_id, "ENSG00000000001");
        assert_eq!(supports[0].phase, 2);
        assert_eq!(supports[1].target_id, "ENSG00000000002");
        assert_eq!(supports[1].phase, 3);
    }

    #[tokio::test]
    async fn one_failing_target_does_not_sink_the_report() {
        let server = MockServer::start().await;
        mount_association_page(&server).await;
        mount_known_drugs(
            &server,
            "ENSG00000000001",
            json!([
                {
                    "drugId": "CHEMBL1",
                    "phase": 4,
                    "drug": {"id": "CHEMBL1", "name": "ALPHA", "isApproved": true},
                },
            ]),
        )
        .await;
        Mock::given(method("POST"))
            .and(body_string_contains("TargetKnownDrugs"))
            .and(body_partial_json(json!({"variables": {"ensemblId": "ENSG00000000002"}})))
            .respond_with(ResponseTemplate::new(500).set_body_string("worker crashed"))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let report = get_drug_repurposing_candidates(
            &client,
            "EFO_0000270",
            RepurposingParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.summary.targets_failed_drug_lookup, 1);
        assert_eq!(report.summary.targets_with_known_drugs, 1);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].drug.id, "CHEMBL1");
    }

    #[tokio::test]
    async fn a_missing_disease_is_a_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("DiseaseAssociatedTargets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"disease": null}
            })))
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let err = get_drug_repurposing_candidates(
            &client,
            "EFO_9999999",
            RepurposingParams::default(),
        )
        .await
        .unwrap_err();

        assert!(err.is_validation());
        assert!(
            err.to_string()
                .contains("Disease not found for identifier: EFO_9999999")
        );
    }

    #[tokio::test]
    async fn free_text_diseases_go_through_the_resolver() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("MapIds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"mapIds": {"total": 0, "mappings": []}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenTargetsClient::new_for_test(server.uri());
        let err = get_drug_repurposing_candidates(
            &client,
            "asthsma",
            RepurposingParams::default(),
        )
        .await
        .unwrap_err();

        assert!(
            err.to_string()
                .contains("Unable to resolve disease identifier: asthsma")
        );
    }
}
