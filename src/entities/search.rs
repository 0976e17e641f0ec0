use serde::{Deserialize, Serialize};

/// Data root of the `search` query, reduced to the parts the tools inspect.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchData {
    #[serde(default)]
    pub search: Option<SearchResults>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub hits: Vec<SearchTriple>,
}

/// Compact `(id, entity, name)` row attached to search responses so agents
/// can pick an identifier without walking the full hit objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTriple {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SearchData {
    pub fn total(&self) -> i64 {
        self.search.as_ref().map(|s| s.total).unwrap_or(0)
    }

    pub fn triples(&self) -> Vec<SearchTriple> {
        self.search
            .as_ref()
            .map(|s| s.hits.clone())
            .unwrap_or_default()
    }
}
