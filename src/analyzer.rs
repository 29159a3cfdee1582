//! Gap analyzer
//!
//! Decides which source, if any, to consult next. Pure and deterministic:
//! no I/O, no clock, no randomness.

use crate::classifier::{IntentClassifier, RequirementSet};
use crate::models::{Decision, SourceDescriptor};
use crate::state::{FactStore, VisitedSet};
use serde::Serialize;

/// Decision plus the reasoning behind it
#[derive(Debug, Clone, Serialize)]
pub struct GapAnalysis {
    pub decision: Decision,
    /// Required fields absent from the fact store
    pub gaps: Vec<String>,
    /// Required fields no configured source provides
    pub unreachable: Vec<String>,
}

/// Chooses the next action for the orchestration loop
pub trait DecisionPolicy: Send + Sync {
    fn requirements(&self, request_text: &str) -> RequirementSet;

    fn next_action(
        &self,
        requirements: &RequirementSet,
        facts: &FactStore,
        visited: &VisitedSet,
        sources: &[&SourceDescriptor],
    ) -> GapAnalysis;
}

#[derive(Debug, Clone, Default)]
pub struct GapAnalyzer {
    classifier: IntentClassifier,
}

impl GapAnalyzer {
    pub fn new(classifier: IntentClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn requirements(&self, request_text: &str) -> RequirementSet {
        self.classifier.classify(request_text)
    }

    /// Next action for the given request text
    pub fn decide(
        &self,
        request_text: &str,
        facts: &FactStore,
        visited: &VisitedSet,
        sources: &[&SourceDescriptor],
    ) -> Decision {
        let requirements = self.requirements(request_text);
        Self::analyze(&requirements, facts, visited, sources).decision
    }

    /// Walk sources in priority order; pick the first unvisited one that can
    /// still fill a required gap.
    pub fn analyze(
        requirements: &RequirementSet,
        facts: &FactStore,
        visited: &VisitedSet,
        sources: &[&SourceDescriptor],
    ) -> GapAnalysis {
        let gaps: Vec<String> = requirements
            .fields()
            .filter(|f| !facts.has_field(f))
            .map(str::to_string)
            .collect();

        let unreachable: Vec<String> = requirements
            .fields()
            .filter(|f| !sources.iter().any(|s| s.provides.iter().any(|p| p == f)))
            .map(str::to_string)
            .collect();

        let next = sources.iter().find(|source| {
            !visited.contains(&source.id)
                && source
                    .provides
                    .iter()
                    .any(|field| !facts.has_field(field) && requirements.requires(field))
        });

        let decision = match next {
            Some(source) => Decision::Consult(source.id.clone()),
            None => Decision::Stop,
        };

        GapAnalysis {
            decision,
            gaps,
            unreachable,
        }
    }
}

impl DecisionPolicy for GapAnalyzer {
    fn requirements(&self, request_text: &str) -> RequirementSet {
        self.classifier.classify(request_text)
    }

    fn next_action(
        &self,
        requirements: &RequirementSet,
        facts: &FactStore,
        visited: &VisitedSet,
        sources: &[&SourceDescriptor],
    ) -> GapAnalysis {
        Self::analyze(requirements, facts, visited, sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentRule;
    use crate::sources::SourceRecord;
    use serde_json::{json, Value};

    fn table() -> Vec<SourceDescriptor> {
        vec![
            SourceDescriptor::new("identity", "http://a", "/users/{subject_id}", &["id", "name"]),
            SourceDescriptor::new("directory", "http://b", "/directory/{subject_id}", &["email", "dept"]),
        ]
    }

    fn facts_from(pairs: &[(&str, Value)]) -> FactStore {
        let mut store = FactStore::new();
        for (source, value) in pairs {
            store.merge(source, &SourceRecord::from_body(value.clone()));
        }
        store
    }

    fn decide(text: &str, facts: &FactStore, visited: &VisitedSet) -> Decision {
        let sources = table();
        let refs: Vec<&SourceDescriptor> = sources.iter().collect();
        GapAnalyzer::default().decide(text, facts, visited, &refs)
    }

    #[test]
    fn test_empty_store_consults_identity_first() {
        let facts = FactStore::new();
        let visited = VisitedSet::new();

        assert_eq!(decide("name", &facts, &visited), Decision::Consult("identity".into()));
        assert_eq!(decide("full profile", &facts, &visited), Decision::Consult("identity".into()));
    }

    #[test]
    fn test_basic_request_stops_after_identity() {
        let facts = facts_from(&[("identity", json!({"id": "101", "name": "Alice Dev"}))]);
        let mut visited = VisitedSet::new();
        visited.insert("identity");

        assert_eq!(decide("name", &facts, &visited), Decision::Stop);
    }

    #[test]
    fn test_basic_request_stops_even_when_identity_failed() {
        let facts = facts_from(&[("identity", json!({"error": "not found"}))]);
        let mut visited = VisitedSet::new();
        visited.insert("identity");

        assert_eq!(decide("name", &facts, &visited), Decision::Stop);
    }

    #[test]
    fn test_full_profile_goes_to_directory() {
        let facts = facts_from(&[("identity", json!({"id": "101", "name": "Alice Dev"}))]);
        let mut visited = VisitedSet::new();
        visited.insert("identity");

        assert_eq!(
            decide("full profile", &facts, &visited),
            Decision::Consult("directory".into())
        );
    }

    #[test]
    fn test_full_profile_goes_to_directory_after_identity_failure() {
        let facts = facts_from(&[("identity", json!({"error": "Connection failed"}))]);
        let mut visited = VisitedSet::new();
        visited.insert("identity");

        assert_eq!(
            decide("full profile", &facts, &visited),
            Decision::Consult("directory".into())
        );
    }

    #[test]
    fn test_visited_is_a_veto() {
        let facts = facts_from(&[
            ("identity", json!({"error": "timeout"})),
            ("directory", json!({"error": "timeout"})),
        ]);
        let mut visited = VisitedSet::new();
        visited.insert("identity");
        visited.insert("directory");

        assert_eq!(decide("full profile", &facts, &visited), Decision::Stop);
    }

    #[test]
    fn test_skips_source_whose_fields_are_present() {
        // Directory data already present, e.g. merged by an earlier source
        let facts = facts_from(&[(
            "identity",
            json!({"name": "Alice Dev", "email": "alice@tech.co", "dept": "Backend"}),
        )]);
        let mut visited = VisitedSet::new();
        visited.insert("identity");

        assert_eq!(decide("full profile", &facts, &visited), Decision::Stop);
    }

    #[test]
    fn test_unreachable_fields_still_stop() {
        let analyzer = GapAnalyzer::new(IntentClassifier::new(vec![IntentRule {
            name: "phone",
            phrases: &["phone"],
            fields: &["phone"],
        }]));
        let sources = table();
        let refs: Vec<&SourceDescriptor> = sources.iter().collect();
        let requirements = analyzer.requirements("phone number");

        let mut facts = FactStore::new();
        let mut visited = VisitedSet::new();
        let mut steps = 0;

        loop {
            let analysis = GapAnalyzer::analyze(&requirements, &facts, &visited, &refs);
            assert_eq!(analysis.unreachable, vec!["phone".to_string()]);
            match analysis.decision {
                Decision::Consult(id) => {
                    facts.merge(&id, &SourceRecord::Failure("down".into()));
                    assert!(visited.insert(&id));
                    steps += 1;
                }
                Decision::Stop => break,
            }
            assert!(steps <= refs.len());
        }

        assert_eq!(steps, 1);
        assert!(facts.is_error_only());
    }

    #[test]
    fn test_gaps_report() {
        let analyzer = GapAnalyzer::default();
        let sources = table();
        let refs: Vec<&SourceDescriptor> = sources.iter().collect();
        let facts = facts_from(&[("identity", json!({"name": "Alice Dev"}))]);

        let analysis = GapAnalyzer::analyze(
            &analyzer.requirements("full profile"),
            &facts,
            &VisitedSet::new(),
            &refs,
        );
        assert_eq!(analysis.gaps, vec!["dept".to_string(), "email".to_string()]);
        assert!(analysis.unreachable.is_empty());
    }

    #[test]
    fn test_policy_matches_analyze() {
        let analyzer = GapAnalyzer::default();
        let sources = table();
        let refs: Vec<&SourceDescriptor> = sources.iter().collect();
        let policy: &dyn DecisionPolicy = &analyzer;

        let requirements = policy.requirements("full profile");
        let analysis = policy.next_action(&requirements, &FactStore::new(), &VisitedSet::new(), &refs);
        assert_eq!(analysis.decision, Decision::Consult("identity".into()));
    }

    #[test]
    fn test_decisions_are_deterministic() {
        let facts = facts_from(&[("identity", json!({"name": "Bob Architect"}))]);
        let mut visited = VisitedSet::new();
        visited.insert("identity");

        let first = decide("email", &facts, &visited);
        for _ in 0..5 {
            assert_eq!(decide("email", &facts, &visited), first);
        }
        assert_eq!(first, Decision::Consult("directory".into()));
    }
}
