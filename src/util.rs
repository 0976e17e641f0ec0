use serde_json::{Map, Value};

/// Remove null-valued entries from a GraphQL variables map. The API treats an
/// explicit null differently from an omitted argument, so optional arguments
/// that were never supplied must not be sent at all.
pub fn prune_nulls(variables: Map<String, Value>) -> Map<String, Value> {
    variables
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .collect()
}

/// Prune a response to the dot-separated `fields` paths.
///
/// Arrays are traversed element-wise without consuming a path segment, so
/// `target.evidences.rows.id` keeps only `id` inside each row. Keys not named
/// by any path are dropped, as are array elements and branches where no path
/// matched. An empty remaining path selects the whole subtree.
pub fn project_fields(value: &Value, fields: &[String]) -> Value {
    let paths: Vec<Vec<&str>> = fields
        .iter()
        .map(|field| {
            field
                .split('.')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .collect::<Vec<&str>>()
        })
        .filter(|path| !path.is_empty())
        .collect();
    if paths.is_empty() {
        return value.clone();
    }
    project(value, &paths).unwrap_or_else(|| Value::Object(Map::new()))
}

fn project(value: &Value, paths: &[Vec<&str>]) -> Option<Value> {
    if paths.iter().any(|path| path.is_empty()) {
        return Some(value.clone());
    }
    match value {
        Value::Array(items) => {
            let kept: Vec<Value> = items
                .iter()
                .filter_map(|item| project(item, paths))
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(Value::Array(kept))
            }
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                let tails: Vec<Vec<&str>> = paths
                    .iter()
                    .filter(|path| path[0] == key.as_str())
                    .map(|path| path[1..].to_vec())
                    .collect();
                if tails.is_empty() {
                    continue;
                }
                if let Some(sub) = project(child, &tails) {
                    out.insert(key.clone(), sub);
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(Value::Object(out))
            }
        }
        _ => None,
    }
}
