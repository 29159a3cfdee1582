//! Core data models for the lookup orchestrator

use crate::error::OrchestrationError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const MAX_SUBJECT_ID_LEN: usize = 64;
const MAX_REQUEST_TEXT_LEN: usize = 1024;

//
// ================= Request =================
//

/// A validated lookup request. Fields are fixed once constructed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LookupRequest {
    subject_id: String,
    request_text: String,
}

impl LookupRequest {
    pub fn new(subject_id: impl Into<String>, request_text: impl Into<String>) -> Result<Self> {
        let subject_id = subject_id.into().trim().to_string();
        let request_text = request_text.into().trim().to_string();

        if subject_id.is_empty() {
            return Err(OrchestrationError::MalformedRequest(
                "subject id must not be empty".to_string(),
            ));
        }

        if subject_id.len() > MAX_SUBJECT_ID_LEN {
            return Err(OrchestrationError::MalformedRequest(format!(
                "subject id exceeds {} characters",
                MAX_SUBJECT_ID_LEN
            )));
        }

        // The id is substituted into source URL paths
        if let Some(bad) = subject_id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(OrchestrationError::MalformedRequest(format!(
                "subject id contains invalid character {:?}",
                bad
            )));
        }

        // "." and ".." would resolve to a parent path
        if subject_id.chars().all(|c| c == '.') {
            return Err(OrchestrationError::MalformedRequest(
                "subject id must not be a relative path segment".to_string(),
            ));
        }

        if request_text.is_empty() {
            return Err(OrchestrationError::MalformedRequest(
                "request text must not be empty".to_string(),
            ));
        }

        if request_text.chars().count() > MAX_REQUEST_TEXT_LEN {
            return Err(OrchestrationError::MalformedRequest(format!(
                "request text exceeds {} characters",
                MAX_REQUEST_TEXT_LEN
            )));
        }

        Ok(Self {
            subject_id,
            request_text,
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn request_text(&self) -> &str {
        &self.request_text
    }
}

//
// ================= Sources =================
//

/// Static description of one backend data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub id: String,
    pub base_url: String,
    /// Path appended to `base_url`; `{subject_id}` is replaced per call
    pub path_template: String,
    /// Fields a successful response is expected to contribute
    pub provides: Vec<String>,
}

impl SourceDescriptor {
    pub fn new(id: &str, base_url: &str, path_template: &str, provides: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            path_template: path_template.to_string(),
            provides: provides.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn url_for(&self, subject_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            self.path_template.replace("{subject_id}", subject_id)
        )
    }
}

//
// ================= Loop =================
//

/// Next action chosen by the gap analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "source", rename_all = "lowercase")]
pub enum Decision {
    Consult(String),
    Stop,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Consult(source) => write!(f, "CONSULT {}", source),
            Decision::Stop => write!(f, "STOP"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoopPhase {
    #[default]
    Deciding,
    Fetching,
    Done,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub invocation_id: Uuid,
    pub subject_id: String,
    pub output: serde_json::Value,
    /// Sources consulted, in the order they were fetched
    pub visited: Vec<String>,
    pub reasoning_trace: Vec<String>,
    pub facts_digest: String,
    pub execution_time_ms: u64,
}
