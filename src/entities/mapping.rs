use serde::Deserialize;

/// Data root of the `mapIds` query.
#[derive(Debug, Clone, Deserialize)]
pub struct MapIdsData {
    #[serde(rename = "mapIds", default)]
    pub map_ids: Option<MappingResults>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingResults {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub mappings: Vec<TermMapping>,
}

/// Candidate hits for one free-text term.
#[derive(Debug, Clone, Deserialize)]
pub struct TermMapping {
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub hits: Vec<MappingHit>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingHit {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub score: f64,
}

impl MapIdsData {
    /// Hits for the first mapped term, in API order.
    pub fn first_term_hits(&self) -> &[MappingHit] {
        self.map_ids
            .as_ref()
            .and_then(|results| results.mappings.first())
            .map(|mapping| mapping.hits.as_slice())
            .unwrap_or(&[])
    }
}

/// Highest-scoring hit. Ties keep the earliest hit so repeated lookups pick
/// the same entity regardless of how the API orders equal scores.
pub fn best_hit(hits: &[MappingHit]) -> Option<&MappingHit> {
    hits.iter().fold(None, |best, hit| match best {
        Some(current) if hit.score > current.score => Some(hit),
        None => Some(hit),
        _ => best,
    })
}
