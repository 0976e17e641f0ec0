use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data root of the association page fetched for the repurposing workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct DiseaseTargetsData {
    #[serde(default)]
    pub disease: Option<DiseaseAssociations>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseAssociations {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub associated_targets: Option<AssociationTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationTable {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub rows: Vec<AssociationRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationRow {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub target: Option<AssociatedTarget>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedTarget {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub approved_symbol: Option<String>,
    #[serde(default)]
    pub approved_name: Option<String>,
}

/// Data root of the known-drugs lookup for one target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetDrugsData {
    #[serde(default)]
    pub target: Option<TargetKnownDrugs>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetKnownDrugs {
    #[serde(default)]
    pub known_drugs: Option<KnownDrugTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnownDrugTable {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub rows: Vec<KnownDrugRow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownDrugRow {
    #[serde(default)]
    pub drug_id: Option<String>,
    #[serde(default)]
    pub phase: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mechanism_of_action: Option<String>,
    #[serde(default)]
    pub drug: Option<KnownDrug>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownDrug {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub drug_type: Option<String>,
    #[serde(default)]
    pub is_approved: Option<bool>,
    #[serde(default)]
    pub maximum_clinical_trial_phase: Option<Value>,
}

/// Clinical phases arrive as integers, but some records carry strings or
/// fractional values. Anything that is not a plain non-negative integer
/// counts as phase 0 rather than failing the whole workflow.
pub fn coerce_phase(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(number)) => number.as_i64().unwrap_or(0),
        Some(Value::String(text))
            if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) =>
        {
            text.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Disease header echoed back in the workflow report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseHeader {
    pub id: String,
    pub name: Option<String>,
}

/// One target that passed the association-score filter.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSelection {
    pub target_id: String,
    pub target_symbol: Option<String>,
    pub target_name: Option<String>,
    pub association_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingTarget {
    pub target_id: String,
    pub target_symbol: Option<String>,
    pub association_score: f64,
    pub phase: i64,
    pub status: Option<String>,
    pub mechanism_of_action: Option<String>,
}

/// Drug identity carried inside a ranked candidate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDrug {
    pub id: String,
    pub name: Option<String>,
    pub drug_type: Option<String>,
    pub is_approved: bool,
    pub maximum_clinical_trial_phase: Option<Value>,
}

/// One ranked drug with the evidence that put it on the list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugCandidate {
    pub drug: CandidateDrug,
    pub best_association_score: f64,
    pub best_phase: i64,
    pub supporting_target_count: usize,
    pub supporting_targets: Vec<SupportingTarget>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFilters {
    pub min_association_score: f64,
    pub min_clinical_phase: i64,
    pub approved_only: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub targets_evaluated: usize,
    pub targets_passed_score_filter: usize,
    pub targets_with_known_drugs: usize,
    pub targets_failed_drug_lookup: usize,
    pub unique_drug_candidates: usize,
    pub filters: WorkflowFilters,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepurposingReport {
    pub disease: DiseaseHeader,
    pub summary: WorkflowSummary,
    pub targets: Vec<TargetSelection>,
    pub candidates: Vec<DrugCandidate>,
}
