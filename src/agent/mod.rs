//! Main orchestrator - implements the gap-driven lookup loop
//!
//! DECIDING → FETCHING → DECIDING → ... → DONE → SYNTHESIZE

use crate::analyzer::{DecisionPolicy, GapAnalyzer};
use crate::config::{Config, SynthesizerKind};
use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::models::{Decision, LookupRequest, LoopPhase, OrchestrationResult};
use crate::sources::{create_default_registry, SourceRecord, SourceRegistry};
use crate::state::LoopState;
use crate::synthesizer::{GeminiSynthesizer, Synthesizer, TemplateSynthesizer};
use crate::Result;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Main orchestrator. Built once, shared across invocations; holds no
/// per-invocation state.
pub struct Orchestrator {
    registry: SourceRegistry,
    policy: Box<dyn DecisionPolicy>,
    synthesizer: Box<dyn Synthesizer>,
}

impl Orchestrator {
    pub fn new(
        registry: SourceRegistry,
        analyzer: GapAnalyzer,
        synthesizer: Box<dyn Synthesizer>,
    ) -> Self {
        Self::with_policy(registry, Box::new(analyzer), synthesizer)
    }

    /// Use a custom decision policy in place of the gap analyzer
    pub fn with_policy(
        registry: SourceRegistry,
        policy: Box<dyn DecisionPolicy>,
        synthesizer: Box<dyn Synthesizer>,
    ) -> Self {
        Self {
            registry,
            policy,
            synthesizer,
        }
    }

    /// Wire HTTP sources and the configured synthesizer
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = create_default_registry(config)?;

        let synthesizer: Box<dyn Synthesizer> = match config.synthesizer {
            SynthesizerKind::Template => Box::new(TemplateSynthesizer::default()),
            SynthesizerKind::Gemini => {
                let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                    OrchestrationError::ConfigError("GEMINI_API_KEY not set".to_string())
                })?;
                let client = GeminiClient::new(api_key, &config.gemini_model)?;
                Box::new(GeminiSynthesizer::new(client))
            }
        };

        Ok(Self::new(registry, GapAnalyzer::default(), synthesizer))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn synthesizer_name(&self) -> &'static str {
        self.synthesizer.name()
    }

    /// Validate raw input and run the loop
    pub async fn run(&self, subject_id: &str, request_text: &str) -> Result<OrchestrationResult> {
        let request = LookupRequest::new(subject_id, request_text)?;
        self.execute(&request).await
    }

    /// Run the loop for an already validated request
    pub async fn execute(&self, request: &LookupRequest) -> Result<OrchestrationResult> {
        let start_time = Instant::now();
        let invocation_id = Uuid::new_v4();
        let mut reasoning_trace = Vec::new();

        info!(
            invocation_id = %invocation_id,
            subject_id = %request.subject_id(),
            request = %request.request_text(),
            "Orchestrator: starting lookup"
        );

        let requirements = self.policy.requirements(request.request_text());
        let sources = self.registry.descriptors();
        // Every source at most once, plus the final stop
        let max_decisions = sources.len() + 1;

        reasoning_trace.push(format!(
            "INPUT: subject {} - {:?}",
            request.subject_id(),
            request.request_text()
        ));
        reasoning_trace.push(format!(
            "CLASSIFY: {:?} requires [{}]",
            requirements.kind(),
            requirements.fields().collect::<Vec<_>>().join(", ")
        ));

        let mut state = LoopState::new();

        loop {
            match state.phase {
                LoopPhase::Deciding => {
                    if state.decisions_made >= max_decisions {
                        warn!(
                            decisions = state.decisions_made,
                            "Decision budget exhausted - stopping"
                        );
                        reasoning_trace.push("DECIDE: budget exhausted, STOP".to_string());
                        state.phase = LoopPhase::Done;
                        continue;
                    }

                    let analysis = self.policy.next_action(
                        &requirements,
                        &state.facts,
                        &state.visited,
                        &sources,
                    );
                    state.decisions_made += 1;

                    info!(decision = %analysis.decision, gaps = ?analysis.gaps, "Agent decision");
                    reasoning_trace.push(format!("DECIDE: {}", analysis.decision));

                    match &analysis.decision {
                        Decision::Consult(source_id) if state.visited.contains(source_id) => {
                            warn!(source = %source_id, "Re-selection of visited source vetoed");
                            reasoning_trace.push(format!("VETO: {} already consulted", source_id));
                            state.phase = LoopPhase::Done;
                        }
                        Decision::Consult(source_id) => {
                            state.pending_source = Some(source_id.clone());
                            state.phase = LoopPhase::Fetching;
                        }
                        Decision::Stop => {
                            if !analysis.unreachable.is_empty() {
                                debug!(
                                    fields = ?analysis.unreachable,
                                    "Requested fields have no configured source"
                                );
                            }
                            state.phase = LoopPhase::Done;
                        }
                    }

                    state.last_decision = Some(analysis.decision);
                }

                LoopPhase::Fetching => {
                    let Some(source_id) = state.pending_source.take() else {
                        state.phase = LoopPhase::Deciding;
                        continue;
                    };

                    let source = self
                        .registry
                        .get(&source_id)
                        .ok_or_else(|| OrchestrationError::SourceNotFound(source_id.clone()))?;

                    info!(source = %source_id, "Calling data source");
                    let fetch_started = Instant::now();
                    let record = source.fetch(request.subject_id()).await;
                    let elapsed_ms = fetch_started.elapsed().as_millis() as u64;

                    match &record {
                        SourceRecord::Facts(facts) => {
                            debug!(source = %source_id, fields = facts.len(), "Source contributed facts");
                            reasoning_trace.push(format!(
                                "FETCH: {} - {} field(s) ({} ms)",
                                source_id,
                                facts.len(),
                                elapsed_ms
                            ));
                        }
                        SourceRecord::Failure(reason) => {
                            warn!(source = %source_id, reason = %reason, "Source contributed no usable facts");
                            reasoning_trace.push(format!(
                                "FETCH: {} - failed: {} ({} ms)",
                                source_id, reason, elapsed_ms
                            ));
                        }
                    }

                    state.facts.merge(&source_id, &record);
                    state.visited.insert(&source_id);
                    state.phase = LoopPhase::Deciding;
                }

                LoopPhase::Done => break,
            }
        }

        reasoning_trace.push(format!("SYNTHESIZE: {}", self.synthesizer.name()));

        state.final_output = Some(
            self.synthesizer
                .synthesize(request.request_text(), &state.facts)
                .await?,
        );

        let status = state
            .final_output
            .as_ref()
            .and_then(|o| o.get("status"))
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string();
        reasoning_trace.push(format!("COMPLETE: {}", status));

        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            invocation_id = %invocation_id,
            visited = ?state.visited.as_slice(),
            status = %status,
            execution_time_ms,
            "Lookup complete"
        );

        Ok(OrchestrationResult {
            invocation_id,
            subject_id: request.subject_id().to_string(),
            output: state.final_output.take().unwrap_or_default(),
            visited: state.visited.as_slice().to_vec(),
            reasoning_trace,
            facts_digest: state.facts.digest(),
            execution_time_ms,
        })
    }
}
