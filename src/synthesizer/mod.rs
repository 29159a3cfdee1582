//! Result synthesizer trait and implementations
//!
//! Turns the final fact store into the caller-facing structured answer.
//! Every implementation returns the same shape:
//!
//! `{"status": "complete" | "partial" | "not_found", "data": {..}, "missing": [..], "errors": {..}}`
//!
//! `not_found` drops `data` and carries `"message": "Subject not found"` instead.
//!
//! `data` only ever holds values that are present in the fact store.

use crate::classifier::{IntentClassifier, RequirementSet};
use crate::state::FactStore;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub mod gemini;
pub use gemini::GeminiSynthesizer;

pub const STATUS_COMPLETE: &str = "complete";
pub const STATUS_PARTIAL: &str = "partial";
pub const STATUS_NOT_FOUND: &str = "not_found";
pub const NOT_FOUND_MESSAGE: &str = "Subject not found";

/// Trait for result formatting backends
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synthesize(&self, request_text: &str, facts: &FactStore) -> Result<Value>;
}

/// Deterministic synthesizer. No external calls.
#[derive(Debug, Clone, Default)]
pub struct TemplateSynthesizer {
    classifier: IntentClassifier,
}

impl TemplateSynthesizer {
    pub fn new(classifier: IntentClassifier) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn synthesize(&self, request_text: &str, facts: &FactStore) -> Result<Value> {
        let requirements = self.classifier.classify(request_text);
        let data = select_requested(&requirements, facts);
        Ok(shape_output(&requirements, data, facts))
    }
}

/// Required fields present in the store. Falls back to every usable field
/// when none of them is required.
pub fn select_requested(requirements: &RequirementSet, facts: &FactStore) -> Map<String, Value> {
    let requested: Map<String, Value> = facts
        .usable_fields()
        .filter(|(field, _)| requirements.requires(field))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if requested.is_empty() {
        facts
            .usable_fields()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    } else {
        requested
    }
}

/// Wrap selected data into the fixed output shape
pub fn shape_output(
    requirements: &RequirementSet,
    data: Map<String, Value>,
    facts: &FactStore,
) -> Value {
    let missing: Vec<&str> = requirements
        .fields()
        .filter(|f| !data.contains_key(*f))
        .collect();

    let mut output = if !facts.has_usable_facts() || data.is_empty() {
        json!({
            "status": STATUS_NOT_FOUND,
            "message": NOT_FOUND_MESSAGE,
            "missing": missing,
        })
    } else {
        let status = if missing.is_empty() {
            STATUS_COMPLETE
        } else {
            STATUS_PARTIAL
        };
        json!({
            "status": status,
            "data": data,
            "missing": missing,
        })
    };

    if !facts.source_errors().is_empty() {
        output["errors"] = json!(facts.source_errors());
    }

    output
}

/// Remove markdown code fences around a structured payload
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after_fence = &trimmed[start + 3..];
    // Skip the info string ("json", "JSON", ...) up to the end of the line
    let body_start = match after_fence.find('\n') {
        Some(nl) if after_fence[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => nl + 1,
        _ => after_fence
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(after_fence.len()),
    };
    let body = &after_fence[body_start..];

    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceRecord;

    fn store(pairs: &[(&str, Value)]) -> FactStore {
        let mut facts = FactStore::new();
        for (source, body) in pairs {
            facts.merge(source, &SourceRecord::from_body(body.clone()));
        }
        facts
    }

    async fn synth(text: &str, facts: &FactStore) -> Value {
        TemplateSynthesizer::default()
            .synthesize(text, facts)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_basic_request_returns_name_only() {
        let facts = store(&[("identity", json!({"id": "101", "name": "Alice Dev"}))]);
        let output = synth("name", &facts).await;

        assert_eq!(output["status"], STATUS_COMPLETE);
        assert_eq!(output["data"], json!({"name": "Alice Dev"}));
        assert_eq!(output["missing"], json!([]));
        assert!(output.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_full_profile_complete() {
        let facts = store(&[
            ("identity", json!({"id": "101", "name": "Alice Dev"})),
            ("directory", json!({"email": "alice@tech.co", "dept": "Backend"})),
        ]);
        let output = synth("full profile", &facts).await;

        assert_eq!(output["status"], STATUS_COMPLETE);
        assert_eq!(
            output["data"],
            json!({"name": "Alice Dev", "email": "alice@tech.co", "dept": "Backend"})
        );
    }

    #[tokio::test]
    async fn test_partial_never_fabricates() {
        let facts = store(&[
            ("identity", json!({"id": "101", "name": "Alice Dev"})),
            ("directory", json!({"error": "Connection failed"})),
        ]);
        let output = synth("full profile", &facts).await;

        assert_eq!(output["status"], STATUS_PARTIAL);
        assert_eq!(output["data"], json!({"name": "Alice Dev"}));
        assert_eq!(output["missing"], json!(["dept", "email"]));
        assert_eq!(output["errors"], json!({"directory": "Connection failed"}));
    }

    #[tokio::test]
    async fn test_error_only_is_not_found() {
        let facts = store(&[
            ("identity", json!({"error": "User not found in Identity Service"})),
            ("directory", json!({"error": "User not found in Directory Service"})),
        ]);
        let output = synth("full profile", &facts).await;

        assert_eq!(output["status"], STATUS_NOT_FOUND);
        assert!(output.get("data").is_none());
        assert_eq!(output["message"], "Subject not found");
        assert_eq!(output["errors"]["identity"], "User not found in Identity Service");
        assert_eq!(output["errors"]["directory"], "User not found in Directory Service");
        assert_ne!(output, json!({}));
    }

    #[tokio::test]
    async fn test_unrequested_facts_fall_back_to_everything() {
        let facts = store(&[("directory", json!({"email": "bob@arch.co"}))]);
        let output = synth("name", &facts).await;

        assert_eq!(output["status"], STATUS_PARTIAL);
        assert_eq!(output["data"], json!({"email": "bob@arch.co"}));
        assert_eq!(output["missing"], json!(["name"]));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(
            strip_code_fences("Here you go:\n```JSON\n{\"a\": 1}\n```\nThanks"),
            "{\"a\": 1}"
        );
    }
}
