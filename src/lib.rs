//! Lumen Lookup Orchestrator
//!
//! Gathers facts about a subject from independent backend services:
//! - Classifies the request into the fields it needs
//! - Consults one source at a time, only while a required field is missing
//! - Never consults a source twice in one invocation
//! - Records source failures as data, not as errors
//! - Synthesizes a structured answer with an explicit not-found outcome
//!
//! LOOP:
//! DECIDE → FETCH → MERGE → DECIDE? → SYNTHESIZE

pub mod agent;
pub mod analyzer;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gemini;
pub mod models;
pub mod sources;
pub mod state;
pub mod synthesizer;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
pub use classifier::{IntentClassifier, IntentKind, RequirementSet};
