use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

/// Stable cache key for a (query, variables) pair.
///
/// The key material is the verbatim query text plus a canonical compact
/// serialization of the variables with object keys sorted recursively, so two
/// logically identical variable maps fingerprint the same regardless of
/// insertion order. Absent and empty variables are equivalent. The material is
/// md5-hashed to keep keys short.
pub fn fingerprint(query: &str, variables: Option<&Map<String, Value>>) -> String {
    let material = match variables {
        Some(vars) if !vars.is_empty() => {
            let mut out = String::with_capacity(query.len() + 64);
            out.push_str(query);
            out.push(':');
            write_canonical(&Value::Object(vars.clone()), &mut out);
            out
        }
        _ => query.to_string(),
    };
    format!("{:x}", md5::compute(material.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (position, key) in keys.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                // Display on Value is infallible and JSON-escapes the key.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    last_used: u64,
}

/// Bounded LRU store for query results with per-entry TTL.
///
/// TTL is measured from insertion: a read hit bumps the recency position but
/// never refreshes the timestamp. A TTL of zero disables the cache entirely,
/// nothing is stored or returned. Reads hand out independent deep copies, so
/// callers can mutate what they get back without touching cached state.
pub struct QueryCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    tick: u64,
}

impl QueryCache {
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
            tick: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Value> {
        if self.ttl.is_zero() {
            return None;
        }
        let expired = {
            let entry = self.entries.get(key)?;
            entry.inserted_at.elapsed() >= self.ttl
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.value.clone())
    }

    pub fn set(&mut self, key: String, value: Value) {
        if self.ttl.is_zero() {
            return;
        }
        self.tick += 1;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                last_used: self.tick,
            },
        );
        while self.entries.len() > self.max_entries {
            self.evict_lru();
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in pairs {
            map.insert((*key).to_string(), value.clone());
        }
        map
    }

    #[test]
    fn fingerprint_is_stable_under_key_order() {
        let forward = vars(&[("a", json!(1)), ("b", json!({"y": 2, "x": [1, 2]}))]);
        let reversed = vars(&[("b", json!({"x": [1, 2], "y": 2})), ("a", json!(1))]);
        assert_eq!(
            fingerprint("query { meta }", Some(&forward)),
            fingerprint("query { meta }", Some(&reversed)),
        );
    }

    #[test]
    fn fingerprint_distinguishes_values_and_queries() {
        let a = vars(&[("id", json!("ENSG1"))]);
        let b = vars(&[("id", json!("ENSG2"))]);
        assert_ne!(
            fingerprint("query { target }", Some(&a)),
            fingerprint("query { target }", Some(&b)),
        );
        assert_ne!(
            fingerprint("query { target }", Some(&a)),
            fingerprint("query { disease }", Some(&a)),
        );
    }

    #[test]
    fn fingerprint_treats_missing_and_empty_variables_alike() {
        let empty = Map::new();
        assert_eq!(
            fingerprint("query { meta }", None),
            fingerprint("query { meta }", Some(&empty)),
        );
    }

    #[test]
    fn get_returns_deep_copies() {
        let mut cache = QueryCache::new(3600, 8);
        cache.set("k".to_string(), json!({"rows": [1, 2, 3]}));

        let mut first = cache.get("k").unwrap();
        first["rows"] = json!([1]);

        let second = cache.get("k").unwrap();
        assert_eq!(second["rows"], json!([1, 2, 3]));
    }

    #[test]
    fn capacity_overflow_evicts_least_recently_used() {
        let mut cache = QueryCache::new(3600, 2);
        cache.set("a".to_string(), json!(1));
        cache.set("b".to_string(), json!(2));
        cache.set("c".to_string(), json!(3));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("a"));
        assert!(cache.contains_key("b"));
        assert!(cache.contains_key("c"));
    }

    #[test]
    fn read_hit_protects_entry_from_eviction() {
        let mut cache = QueryCache::new(3600, 2);
        cache.set("a".to_string(), json!(1));
        cache.set("b".to_string(), json!(2));
        assert!(cache.get("a").is_some());
        cache.set("c".to_string(), json!(3));

        assert!(cache.contains_key("a"));
        assert!(!cache.contains_key("b"));
        assert!(cache.contains_key("c"));
    }

    #[test]
    fn zero_ttl_disables_the_cache() {
        let mut cache = QueryCache::new(0, 8);
        cache.set("k".to_string(), json!(1));
        assert!(cache.is_empty());
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn expired_entries_are_purged_on_read() {
        let mut cache = QueryCache::new(0, 8);
        // Rebuild with a sub-second TTL via the raw fields to keep the
        // constructor surface in whole seconds.
        cache.ttl = Duration::from_millis(20);
        cache.set("k".to_string(), json!(1));

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn hit_preserves_the_insertion_timestamp() {
        let mut cache = QueryCache::new(0, 8);
        cache.ttl = Duration::from_millis(100);
        cache.set("k".to_string(), json!(1));

        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("k").is_none(), "TTL runs from insertion, not last access");
    }
}
