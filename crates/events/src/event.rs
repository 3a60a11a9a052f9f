//! Lifecycle callbacks emitted by a work engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A callback from the work engine.
///
/// Recognized kinds get a dedicated rendering; anything else is carried
/// as [`EngineEvent::Unstructured`] and rendered as a field listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The whole job started.
    JobStarted {
        name: String,
        #[serde(default)]
        input_keys: Vec<String>,
    },

    /// A sub-unit (chain, task, agent step) started.
    UnitStarted {
        name: String,
        #[serde(default)]
        input_keys: Vec<String>,
    },

    UnitFinished {
        name: String,
        #[serde(default)]
        output: Value,
    },

    ModelStarted {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        prompts: Vec<String>,
    },

    /// A model call returned. `generations` holds the extracted texts;
    /// `raw` the response as the engine saw it, used when no text could
    /// be extracted.
    ModelFinished {
        #[serde(default)]
        generations: Vec<String>,
        #[serde(default)]
        raw: Value,
    },

    ToolStarted {
        tool: String,
        #[serde(default)]
        input: String,
    },

    ToolFinished {
        tool: String,
        #[serde(default)]
        agent: Option<String>,
        #[serde(default)]
        output: String,
    },

    ToolFailed {
        tool: String,
        error: String,
    },

    /// An agent decided on its next action. `log` is the full model
    /// output that led to the decision, reasoning included.
    AgentAction {
        #[serde(default)]
        agent: Option<String>,
        tool: String,
        #[serde(default)]
        tool_input: Value,
        #[serde(default)]
        log: String,
    },

    AgentFinished {
        #[serde(default)]
        agent: Option<String>,
        #[serde(default)]
        output: String,
    },

    /// Free-form text.
    Text {
        #[serde(default)]
        source: Option<String>,
        text: String,
    },

    /// Any callback kind without a dedicated variant.
    Unstructured {
        kind: String,
        #[serde(default)]
        fields: BTreeMap<String, Value>,
    },
}

impl EngineEvent {
    /// Stable snake_case name of the event kind.
    pub fn name(&self) -> &str {
        match self {
            EngineEvent::JobStarted { .. } => "job_started",
            EngineEvent::UnitStarted { .. } => "unit_started",
            EngineEvent::UnitFinished { .. } => "unit_finished",
            EngineEvent::ModelStarted { .. } => "model_started",
            EngineEvent::ModelFinished { .. } => "model_finished",
            EngineEvent::ToolStarted { .. } => "tool_started",
            EngineEvent::ToolFinished { .. } => "tool_finished",
            EngineEvent::ToolFailed { .. } => "tool_failed",
            EngineEvent::AgentAction { .. } => "agent_action",
            EngineEvent::AgentFinished { .. } => "agent_finished",
            EngineEvent::Text { .. } => "text",
            EngineEvent::Unstructured { kind, .. } => kind,
        }
    }

    /// Interpret a loosely-typed JSON callback payload.
    ///
    /// Payloads that match a recognized kind become that variant. Anything
    /// else, including recognized kinds with an unexpected shape, becomes
    /// [`EngineEvent::Unstructured`] keeping every field.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<EngineEvent>(value.clone()) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(error = %err, "Unrecognized engine callback shape");
                Self::unstructured_from(value)
            }
        }
    }

    fn unstructured_from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                let mut fields: BTreeMap<String, Value> = map.into_iter().collect();
                let kind = match fields.remove("event") {
                    Some(Value::String(kind)) => kind,
                    Some(other) => other.to_string(),
                    None => "unknown".to_string(),
                };
                EngineEvent::Unstructured { kind, fields }
            }
            other => EngineEvent::Unstructured {
                kind: "unknown".to_string(),
                fields: BTreeMap::from([("value".to_string(), other)]),
            },
        }
    }
}
