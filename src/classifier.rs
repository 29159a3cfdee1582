//! Intent Classifier
//!
//! Turns free request text into the set of fields the caller wants, using an
//! explicit rule table:
//! - "name", "what is 101 called?" -> basic identity (`name`)
//! - "full profile", "everything about 101" -> `name`, `email`, `dept`
//! - "email for 102" -> `name`, `email`

use serde::Serialize;
use std::collections::BTreeSet;

/// One row of the rule table: any phrase match adds `fields`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentRule {
    pub name: &'static str,
    pub phrases: &'static [&'static str],
    pub fields: &'static [&'static str],
}

/// Required for every request. The identity record anchors a lookup.
pub const BASELINE_FIELDS: &[&str] = &["name"];

/// Static rule table, zero allocation
pub const INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        name: "full_profile",
        phrases: &["full", "profile", "all", "everything", "details"],
        fields: &["name", "email", "dept"],
    },
    IntentRule {
        name: "contact",
        phrases: &["email", "mail", "contact"],
        fields: &["email"],
    },
    IntentRule {
        name: "department",
        phrases: &["dept", "department", "team", "business unit"],
        fields: &["dept"],
    },
    IntentRule {
        name: "identity",
        phrases: &["id", "identity", "who"],
        fields: &["id", "name"],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Nothing beyond the baseline identity fields
    BasicIdentity,
    FullProfile,
    /// Specific extra fields, not the whole profile
    Targeted,
}

/// Fields a request calls for, plus the rules that produced them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementSet {
    fields: BTreeSet<String>,
    matched_rules: Vec<&'static str>,
}

impl RequirementSet {
    pub fn requires(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn matched_rules(&self) -> &[&'static str] {
        &self.matched_rules
    }

    pub fn kind(&self) -> IntentKind {
        if self.matched_rules.contains(&"full_profile") {
            IntentKind::FullProfile
        } else if self.fields.iter().all(|f| BASELINE_FIELDS.contains(&f.as_str()) || f == "id") {
            IntentKind::BasicIdentity
        } else {
            IntentKind::Targeted
        }
    }
}

/// Rule-table classifier
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl IntentClassifier {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// Classify request text into required fields
    pub fn classify(&self, request_text: &str) -> RequirementSet {
        let words = tokenize(request_text);

        let mut fields: BTreeSet<String> =
            BASELINE_FIELDS.iter().map(|f| f.to_string()).collect();
        let mut matched_rules = Vec::new();

        for rule in &self.rules {
            if rule.phrases.iter().any(|p| contains_phrase(&words, p)) {
                fields.extend(rule.fields.iter().map(|f| f.to_string()));
                matched_rules.push(rule.name);
            }
        }

        RequirementSet {
            fields,
            matched_rules,
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(INTENT_RULES.to_vec())
    }
}

/// Lower-cased alphanumeric words
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-word match; multi-word phrases must appear consecutively
fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }

    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}
