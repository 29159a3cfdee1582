//! Data source trait and registry
//!
//! A source answers a lookup by subject id with either a record of fields or
//! a failure marker. Failures never surface as `Err`: the loop treats them as
//! data. HTTP-backed sources call the external identity and directory services.

use crate::config::Config;
use crate::error::OrchestrationError;
use crate::models::SourceDescriptor;
use crate::state::ERROR_FIELD;
use crate::Result;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one source lookup
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Facts(Map<String, Value>),
    Failure(String),
}

impl SourceRecord {
    /// Classify a decoded response body.
    ///
    /// An object carrying the reserved `error` key is the sources' not-found
    /// marker; anything that is not an object is malformed.
    pub fn from_body(body: Value) -> Self {
        match body {
            Value::Object(map) => match map.get(ERROR_FIELD) {
                Some(Value::String(reason)) => SourceRecord::Failure(reason.clone()),
                Some(other) => SourceRecord::Failure(other.to_string()),
                None => SourceRecord::Facts(map),
            },
            other => SourceRecord::Failure(format!(
                "Malformed response body: expected JSON object, got {}",
                json_kind(&other)
            )),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SourceRecord::Failure(_))
    }

    /// Wire form: the field map, or `{"error": reason}`
    pub fn to_value(&self) -> Value {
        match self {
            SourceRecord::Facts(map) => Value::Object(map.clone()),
            SourceRecord::Failure(reason) => {
                let mut map = Map::new();
                map.insert(ERROR_FIELD.to_string(), Value::String(reason.clone()));
                Value::Object(map)
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Trait for a single data source
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// One lookup attempt. No retries, no caching.
    async fn fetch(&self, subject_id: &str) -> SourceRecord;
}

/// Ordered set of sources. Registration order is consultation priority.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Register a source. Ids must be unique.
    pub fn register(&mut self, source: Arc<dyn DataSource>) -> Result<()> {
        if self.get(source.id()).is_some() {
            return Err(OrchestrationError::ConfigError(format!(
                "Duplicate source id: {}",
                source.id()
            )));
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.iter().find(|s| s.id() == id).cloned()
    }

    /// Descriptors in priority order
    pub fn descriptors(&self) -> Vec<&SourceDescriptor> {
        self.sources.iter().map(|s| s.descriptor()).collect()
    }

    pub fn list(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the connection-pooled client shared by every HTTP source
pub fn build_http_client() -> Result<Client> {
    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .build()?;

    Ok(client)
}

/// Source reached with `GET base_url + path`
pub struct HttpDataSource {
    descriptor: SourceDescriptor,
    client: Client,
    timeout: Duration,
}

impl HttpDataSource {
    pub fn new(descriptor: SourceDescriptor, client: Client, timeout: Duration) -> Self {
        Self {
            descriptor,
            client,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl DataSource for HttpDataSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, subject_id: &str) -> SourceRecord {
        let url = self.descriptor.url_for(subject_id);
        debug!(source = %self.descriptor.id, url = %url, "Calling data source");

        let response = match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(source = %self.descriptor.id, error = %e, "Data source call failed");
                let reason = if e.is_timeout() {
                    format!("Request timed out after {}s", self.timeout.as_secs_f32())
                } else {
                    format!("Connection failed: {}", e)
                };
                return SourceRecord::Failure(reason);
            }
        };

        let status = response.status();
        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %self.descriptor.id, %status, error = %e, "Unreadable response body");
                return SourceRecord::Failure(format!("Invalid JSON response: {}", e));
            }
        };

        match SourceRecord::from_body(body) {
            SourceRecord::Facts(_) if !status.is_success() => {
                warn!(source = %self.descriptor.id, %status, "Data source returned error status");
                SourceRecord::Failure(format!("{} returned {}", self.descriptor.id, status))
            }
            record => record,
        }
    }
}

/// In-memory source backed by a fixed table of records
pub struct StaticDataSource {
    descriptor: SourceDescriptor,
    records: HashMap<String, Value>,
    missing_reason: String,
}

impl StaticDataSource {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        let missing_reason = format!("Subject not found in {}", descriptor.id);
        Self {
            descriptor,
            records: HashMap::new(),
            missing_reason,
        }
    }

    pub fn with_record(mut self, subject_id: &str, record: Value) -> Self {
        self.records.insert(subject_id.to_string(), record);
        self
    }
}

#[async_trait::async_trait]
impl DataSource for StaticDataSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, subject_id: &str) -> SourceRecord {
        match self.records.get(subject_id) {
            Some(record) => SourceRecord::from_body(record.clone()),
            None => SourceRecord::Failure(self.missing_reason.clone()),
        }
    }
}

/// Create the registry of HTTP-backed sources described by the config.
pub fn create_default_registry(config: &Config) -> Result<SourceRegistry> {
    let client = build_http_client()?;
    let mut registry = SourceRegistry::new();

    for descriptor in config.source_descriptors() {
        registry.register(Arc::new(HttpDataSource::new(
            descriptor,
            client.clone(),
            config.source_timeout,
        )))?;
    }

    Ok(registry)
}
