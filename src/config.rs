//! Environment configuration
//!
//! Values come from the process environment (optionally seeded from `.env`).

use crate::error::OrchestrationError;
use crate::models::SourceDescriptor;
use crate::Result;
use std::env;
use std::time::Duration;

const DEFAULT_IDENTITY_URL: &str = "http://localhost:8001";
const DEFAULT_DIRECTORY_URL: &str = "http://localhost:8002";
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesizerKind {
    Template,
    Gemini,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub identity_url: String,
    pub directory_url: String,
    pub source_timeout: Duration,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub synthesizer: SynthesizerKind,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            source_timeout: Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            synthesizer: SynthesizerKind::Template,
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source_timeout = match non_empty("SOURCE_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    OrchestrationError::ConfigError(format!(
                        "SOURCE_TIMEOUT_SECS must be a whole number of seconds, got {:?}",
                        raw
                    ))
                })?;
                if secs == 0 {
                    return Err(OrchestrationError::ConfigError(
                        "SOURCE_TIMEOUT_SECS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.source_timeout,
        };

        let port = match non_empty("PORT").or_else(|| non_empty("API_PORT")) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                OrchestrationError::ConfigError(format!("PORT must be a valid port, got {:?}", raw))
            })?,
            None => defaults.port,
        };

        let gemini_api_key = non_empty("GEMINI_API_KEY");

        let synthesizer = match non_empty("SYNTHESIZER").map(|s| s.trim().to_lowercase()) {
            Some(kind) if kind == "template" => SynthesizerKind::Template,
            Some(kind) if kind == "gemini" => SynthesizerKind::Gemini,
            Some(other) => {
                return Err(OrchestrationError::ConfigError(format!(
                    "SYNTHESIZER must be 'template' or 'gemini', got {:?}",
                    other
                )))
            }
            None if gemini_api_key.is_some() => SynthesizerKind::Gemini,
            None => SynthesizerKind::Template,
        };

        if synthesizer == SynthesizerKind::Gemini && gemini_api_key.is_none() {
            return Err(OrchestrationError::ConfigError(
                "SYNTHESIZER=gemini requires GEMINI_API_KEY".to_string(),
            ));
        }

        Ok(Self {
            identity_url: non_empty("IDENTITY_SERVICE_URL").unwrap_or(defaults.identity_url),
            directory_url: non_empty("DIRECTORY_SERVICE_URL").unwrap_or(defaults.directory_url),
            source_timeout,
            gemini_api_key,
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            synthesizer,
            port,
        })
    }

    /// Source table in consultation priority order
    pub fn source_descriptors(&self) -> Vec<SourceDescriptor> {
        vec![
            SourceDescriptor::new(
                "identity",
                &self.identity_url,
                "/users/{subject_id}",
                &["id", "name"],
            ),
            SourceDescriptor::new(
                "directory",
                &self.directory_url,
                "/directory/{subject_id}",
                &["email", "dept"],
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.identity_url, "http://localhost:8001");
        assert_eq!(config.directory_url, "http://localhost:8002");
        assert_eq!(config.source_timeout, Duration::from_secs(5));
        assert_eq!(config.synthesizer, SynthesizerKind::Template);
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("IDENTITY_SERVICE_URL", "http://id.internal:9001"),
            ("SOURCE_TIMEOUT_SECS", "2"),
            ("API_PORT", "9000"),
            ("GEMINI_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.identity_url, "http://id.internal:9001");
        assert_eq!(config.source_timeout, Duration::from_secs(2));
        assert_eq!(config.port, 9000);
        assert_eq!(config.synthesizer, SynthesizerKind::Gemini);
    }

    #[test]
    fn test_explicit_template_wins_over_key() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("SYNTHESIZER", "Template"),
        ]))
        .unwrap();
        assert_eq!(config.synthesizer, SynthesizerKind::Template);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup_from(&[("SOURCE_TIMEOUT_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("SOURCE_TIMEOUT_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("PORT", "99999")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("SYNTHESIZER", "gpt")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("SYNTHESIZER", "gemini")])).is_err());
    }

    #[test]
    fn test_source_table() {
        let descriptors = Config::default().source_descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].url_for("101"), "http://localhost:8001/users/101");
        assert_eq!(descriptors[1].url_for("101"), "http://localhost:8002/directory/101");
        assert_eq!(descriptors[1].provides, vec!["email", "dept"]);
    }
}
