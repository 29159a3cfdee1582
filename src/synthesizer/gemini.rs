//! Gemini-powered synthesizer
//!
//! The backend proposes the answer; the contract is enforced here. Values the
//! backend invents or alters are dropped, as are fields the request did not
//! ask for, and the payload is re-shaped so callers always see the same
//! structure as the template synthesizer.

use crate::classifier::IntentClassifier;
use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::state::FactStore;
use crate::synthesizer::{select_requested, shape_output, strip_code_fences, Synthesizer};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = r#"You format lookup results for an internal directory service.

Rules:
- Return ONLY a single JSON object
- No explanation text, no markdown
- Use only fields and values present in the collected data
- Never invent or guess missing fields
- Include only the fields the user request asks for"#;

pub struct GeminiSynthesizer {
    client: GeminiClient,
    classifier: IntentClassifier,
}

impl GeminiSynthesizer {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client,
            classifier: IntentClassifier::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    fn build_prompt(request_text: &str, facts: &FactStore) -> String {
        let collected: Map<String, Value> = facts
            .usable_fields()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        format!(
            r#"User Request: {}
Data Collected: {}

Task: Provide a clean, structured JSON response.
If data is missing, just show what was found.
RETURN ONLY JSON. NO CHAT."#,
            request_text,
            Value::Object(collected)
        )
    }
}

#[async_trait]
impl Synthesizer for GeminiSynthesizer {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn synthesize(&self, request_text: &str, facts: &FactStore) -> Result<Value> {
        let requirements = self.classifier.classify(request_text);

        // Nothing to format; not-found never depends on the backend
        if !facts.has_usable_facts() {
            return Ok(shape_output(&requirements, Map::new(), facts));
        }

        let prompt = Self::build_prompt(request_text, facts);
        let raw = self.client.generate(&prompt, SYSTEM_PROMPT).await?;

        let proposed = parse_backend_payload(&raw)?;
        let mut data: Map<String, Value> = enforce_facts(proposed, facts)
            .into_iter()
            .filter(|(field, _)| {
                let required = requirements.requires(field);
                if !required {
                    debug!(field = %field, "Dropping field the request did not ask for");
                }
                required
            })
            .collect();

        // Backfill requested fields the backend left out
        for (field, value) in select_requested(&requirements, facts) {
            if requirements.requires(&field) && !data.contains_key(&field) {
                debug!(field = %field, "Backfilling field omitted by backend");
                data.insert(field, value);
            }
        }

        // No required field was collected at all
        if data.is_empty() {
            data = select_requested(&requirements, facts);
        }

        Ok(shape_output(&requirements, data, facts))
    }
}

/// Parse the backend text into a field map
fn parse_backend_payload(raw: &str) -> Result<Map<String, Value>> {
    let cleaned = strip_code_fences(raw);

    let parsed: Value = serde_json::from_str(cleaned).map_err(|e| {
        OrchestrationError::SynthesisError(format!(
            "Backend returned non-JSON output: {} | raw={}",
            e, raw
        ))
    })?;

    let Value::Object(mut map) = parsed else {
        return Err(OrchestrationError::SynthesisError(format!(
            "Backend returned JSON that is not an object: {}",
            cleaned
        )));
    };

    // Accept either a flat object or one nested under "data"
    if let Some(Value::Object(inner)) = map.remove("data") {
        return Ok(inner);
    }

    Ok(map)
}

/// Keep only entries that match the fact store exactly
fn enforce_facts(proposed: Map<String, Value>, facts: &FactStore) -> Map<String, Value> {
    proposed
        .into_iter()
        .filter(|(field, value)| {
            let genuine = facts.has_field(field) && facts.get(field) == Some(value);
            if !genuine {
                warn!(field = %field, "Dropping field not backed by collected data");
            }
            genuine
        })
        .collect()
}
