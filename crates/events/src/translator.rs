//! Translation of engine callbacks into observer log messages.
//!
//! Each [`EngineEvent`] produces zero or more [`LogMessage`]s with a short
//! human-readable summary. Embedded payloads (prompts, tool inputs, model
//! responses) are bounded to a configurable number of characters. The full,
//! unfiltered event is always written to the diagnostic log first.

use std::sync::Arc;

use crewcast_core::log_message::{truncate, LogMessage, LogSource};
use crewcast_core::types::{short_id, JobId};
use serde_json::Value;

use crate::engine::EngineCallbacks;
use crate::event::EngineEvent;
use crate::sink::LogSink;
use crate::thought::{extract_thought, is_thought_line};

/// `tracing` target of the durable diagnostic log.
pub const DIAGNOSTIC_TARGET: &str = "crewcast::diagnostic";

const DEFAULT_AGENT: &str = "Agent";
const DEFAULT_TEXT_SOURCE: &str = "System/Agent";
const UNKNOWN_MODEL: &str = "unknown model";

/// Tool names that hand work to another agent.
const DELEGATION_TOOLS: [&str; 2] = ["delegate work to coworker", "ask question to coworker"];

/// Engine callback sink for one job.
pub struct EventTranslator {
    job_id: JobId,
    sink: Arc<dyn LogSink>,
    payload_chars: usize,
}

impl EventTranslator {
    pub fn new(job_id: JobId, sink: Arc<dyn LogSink>, payload_chars: usize) -> Self {
        tracing::debug!(job_id = %job_id, "Event translator created");
        Self {
            job_id,
            sink,
            payload_chars,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Render one event into the messages observers should see.
    pub fn translate(&self, event: &EngineEvent) -> Vec<LogMessage> {
        match event {
            EngineEvent::JobStarted { name, input_keys } => vec![LogMessage::structured(
                LogSource::Pipeline,
                "Crew Start",
                format!("Crew '{name}' started. Inputs: [{}].", input_keys.join(", ")),
            )],

            EngineEvent::UnitStarted { name, input_keys } => vec![LogMessage::structured(
                LogSource::Pipeline,
                "Chain Start",
                format!(
                    "Chain '{name}' started. Input keys: [{}].",
                    input_keys.join(", ")
                ),
            )],

            EngineEvent::UnitFinished { name, output } => vec![LogMessage::structured(
                LogSource::Pipeline,
                "Chain End",
                format!(
                    "Chain '{name}' finished. Output: '{}'",
                    self.bound(&value_text(output))
                ),
            )],

            EngineEvent::ModelStarted { model, prompts } => {
                let model = model.as_deref().unwrap_or(UNKNOWN_MODEL);
                let body = match prompts.first() {
                    Some(first) => format!(
                        "Model '{model}' called with {} prompt(s). First prompt: '{}'",
                        prompts.len(),
                        self.bound(first)
                    ),
                    None => format!("Model '{model}' called without prompts."),
                };
                vec![LogMessage::structured(LogSource::ModelCall, "LLM Start", body)]
            }

            EngineEvent::ModelFinished { generations, raw } => {
                let response = match generations.first() {
                    Some(text) => text.clone(),
                    None => value_text(raw),
                };
                vec![LogMessage::structured(
                    LogSource::ModelCall,
                    "LLM End",
                    format!("Model call finished. Response: '{}'", self.bound(&response)),
                )]
            }

            EngineEvent::ToolStarted { tool, input } => vec![LogMessage::structured(
                LogSource::ToolCall,
                "Tool Start",
                format!("Running tool '{tool}' with input: '{}'", self.bound(input)),
            )],

            EngineEvent::ToolFinished {
                tool,
                agent,
                output,
            } => {
                let kind = match agent.as_deref() {
                    Some(agent) if !agent.is_empty() => format!("{agent} - {tool} Output"),
                    _ => format!("{tool} Output"),
                };
                vec![LogMessage::structured(
                    LogSource::ToolCall,
                    kind,
                    format!("'{}'", self.bound(output)),
                )]
            }

            EngineEvent::ToolFailed { tool, error } => vec![LogMessage::structured(
                LogSource::ToolCall,
                "Tool Error",
                format!("Tool '{tool}' failed: {}", self.bound(error)),
            )],

            EngineEvent::AgentAction {
                agent,
                tool,
                tool_input,
                log,
            } => {
                let agent = agent.as_deref().unwrap_or(DEFAULT_AGENT);
                let mut messages = Vec::with_capacity(2);

                if let Some(thought) = extract_thought(log) {
                    messages.push(LogMessage::structured(
                        LogSource::Agent,
                        format!("{agent} Thought"),
                        thought,
                    ));
                }

                let source = if is_delegation(tool) {
                    LogSource::Delegation
                } else {
                    LogSource::Agent
                };
                messages.push(LogMessage::structured(
                    source,
                    format!("{agent} Action"),
                    format!(
                        "Plans tool '{tool}' with input: '{}'",
                        self.bound(&value_text(tool_input))
                    ),
                ));
                messages
            }

            EngineEvent::AgentFinished { agent, output } => vec![LogMessage::structured(
                LogSource::Agent,
                format!("{} Finish", agent.as_deref().unwrap_or(DEFAULT_AGENT)),
                format!("Step finished. Output: '{}'", self.bound(output)),
            )],

            EngineEvent::Text { source, text } => {
                let text = text.trim();
                // Reasoning already reaches observers through agent actions.
                if text.is_empty() || is_thought_line(text) {
                    return Vec::new();
                }
                vec![LogMessage::structured(
                    LogSource::Text,
                    format!("{} Info", source.as_deref().unwrap_or(DEFAULT_TEXT_SOURCE)),
                    text,
                )]
            }

            EngineEvent::Unstructured { kind, fields } => {
                let body = if fields.is_empty() {
                    "(no fields)".to_string()
                } else {
                    fields
                        .iter()
                        .map(|(key, value)| format!("{key}: {}", self.bound(&value_text(value))))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                vec![LogMessage::structured(LogSource::Unrecognized, kind.clone(), body)]
            }
        }
    }

    fn bound(&self, text: &str) -> String {
        truncate(text, self.payload_chars).into_owned()
    }

    fn record_diagnostic(&self, event: &EngineEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(_) => format!("{event:?}"),
        };
        tracing::info!(
            target: DIAGNOSTIC_TARGET,
            job_id = %self.job_id,
            job = %short_id(&self.job_id),
            event = event.name(),
            payload = %payload,
            "Engine callback",
        );
    }
}

impl EngineCallbacks for EventTranslator {
    fn on_event(&self, event: EngineEvent) {
        self.record_diagnostic(&event);
        for message in self.translate(&event) {
            self.sink.emit(message);
        }
    }
}

fn is_delegation(tool: &str) -> bool {
    let tool = tool.to_lowercase();
    DELEGATION_TOOLS.iter().any(|name| tool.starts_with(name))
}

/// Strings are shown without JSON quotes, everything else as compact JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
