//! Per-invocation state
//!
//! The fact store, the visited set and the loop state that owns both.
//! Nothing here is shared between invocations.

use crate::models::{Decision, LoopPhase};
use crate::sources::SourceRecord;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;

/// Reserved field carrying the most recent source failure
pub const ERROR_FIELD: &str = "error";

/// Everything learned about the subject so far
#[derive(Debug, Clone, Default, Serialize)]
pub struct FactStore {
    fields: Map<String, Value>,
    /// field -> source that last wrote it
    provenance: BTreeMap<String, String>,
    /// source -> failure reason
    source_errors: BTreeMap<String, String>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one source result. Same-named fields are overwritten.
    pub fn merge(&mut self, source: &str, record: &SourceRecord) {
        match record {
            SourceRecord::Facts(facts) => {
                for (field, value) in facts {
                    self.fields.insert(field.clone(), value.clone());
                    self.provenance.insert(field.clone(), source.to_string());
                }
            }
            SourceRecord::Failure(reason) => {
                self.fields
                    .insert(ERROR_FIELD.to_string(), Value::String(reason.clone()));
                self.source_errors
                    .insert(source.to_string(), reason.clone());
            }
        }
    }

    /// True when a usable (non-error) field is present
    pub fn has_field(&self, field: &str) -> bool {
        field != ERROR_FIELD && self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn usable_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(k, _)| k.as_str() != ERROR_FIELD)
    }

    pub fn has_usable_facts(&self) -> bool {
        self.usable_fields().next().is_some()
    }

    /// Nothing usable was learned, only failures
    pub fn is_error_only(&self) -> bool {
        !self.has_usable_facts() && !self.source_errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn source_errors(&self) -> &BTreeMap<String, String> {
        &self.source_errors
    }

    pub fn provenance_of(&self, field: &str) -> Option<&str> {
        self.provenance.get(field).map(String::as_str)
    }

    /// Raw field map, including the reserved error field
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// SHA-256 over the canonical JSON of the fields
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();

        if serde_json::to_writer(&mut HashWriter(&mut hasher), &self.fields).is_err() {
            return String::new();
        }

        hex::encode(hasher.finalize())
    }
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sources consulted during one invocation. Grows only.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the source was already recorded
    pub fn insert(&mut self, source: &str) -> bool {
        if !self.seen.insert(source.to_string()) {
            return false;
        }
        self.order.push(source.to_string());
        true
    }

    pub fn contains(&self, source: &str) -> bool {
        self.seen.contains(source)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Visit order
    pub fn as_slice(&self) -> &[String] {
        &self.order
    }
}

/// Transient state of one orchestration loop
#[derive(Debug, Default)]
pub struct LoopState {
    pub facts: FactStore,
    pub visited: VisitedSet,
    pub phase: LoopPhase,
    pub last_decision: Option<Decision>,
    pub pending_source: Option<String>,
    pub decisions_made: usize,
    pub final_output: Option<Value>,
}

impl LoopState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facts(value: Value) -> SourceRecord {
        match value {
            Value::Object(map) => SourceRecord::Facts(map),
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut store = FactStore::new();
        store.merge("identity", &facts(json!({"id": "101", "name": "Alice"})));
        store.merge("directory", &facts(json!({"name": "Alice Dev", "email": "a@x.co"})));

        assert_eq!(store.get("name"), Some(&json!("Alice Dev")));
        assert_eq!(store.get("id"), Some(&json!("101")));
        assert_eq!(store.provenance_of("name"), Some("directory"));
        assert_eq!(store.provenance_of("id"), Some("identity"));
    }

    #[test]
    fn test_failures_are_data() {
        let mut store = FactStore::new();
        store.merge("identity", &SourceRecord::Failure("timeout".into()));
        store.merge("directory", &SourceRecord::Failure("not found".into()));

        assert!(store.is_error_only());
        assert!(!store.has_field(ERROR_FIELD));
        assert_eq!(store.get(ERROR_FIELD), Some(&json!("not found")));
        assert_eq!(store.source_errors().len(), 2);
        assert_eq!(store.source_errors()["identity"], "timeout");
    }

    #[test]
    fn test_partial_failure_is_not_error_only() {
        let mut store = FactStore::new();
        store.merge("identity", &facts(json!({"name": "Alice Dev"})));
        store.merge("directory", &SourceRecord::Failure("connection failed".into()));

        assert!(!store.is_error_only());
        assert!(store.has_usable_facts());
        assert_eq!(store.usable_fields().count(), 1);
    }

    #[test]
    fn test_empty_store_is_not_error_only() {
        let store = FactStore::new();
        assert!(store.is_empty());
        assert!(!store.is_error_only());
    }

    #[test]
    fn test_digest_is_stable() {
        let mut a = FactStore::new();
        a.merge("identity", &facts(json!({"name": "Alice Dev", "id": "101"})));
        let mut b = FactStore::new();
        b.merge("identity", &facts(json!({"id": "101", "name": "Alice Dev"})));

        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        b.merge("directory", &facts(json!({"dept": "Backend"})));
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_visited_set_rejects_duplicates() {
        let mut visited = VisitedSet::new();
        assert!(visited.insert("identity"));
        assert!(visited.insert("directory"));
        assert!(!visited.insert("identity"));

        assert_eq!(visited.len(), 2);
        assert_eq!(visited.as_slice(), &["identity".to_string(), "directory".to_string()]);
        assert!(visited.contains("directory"));
    }

    #[test]
    fn test_loop_state_starts_deciding() {
        let state = LoopState::new();
        assert_eq!(state.phase, LoopPhase::Deciding);
        assert!(state.visited.is_empty());
        assert!(state.facts.is_empty());
    }
}
