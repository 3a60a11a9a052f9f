//! Scripted stand-in for the agent crew.
//!
//! [`ScriptedCrew`] walks a fixed roster of agents through the same
//! callback sequence a real agent framework produces (sub-unit start,
//! model call, reasoning + action, tool call, step result) and narrates
//! to the console along the way. It lets the service run end-to-end
//! without a language model behind it.

use std::io::Write;
use std::time::Duration;

use crewcast_events::{EngineContext, EngineEvent, JobOutput, JobSpec, WorkEngine};
use serde_json::json;

/// One agent of the crew.
#[derive(Debug, Clone)]
pub struct AgentRole {
    pub name: String,
    pub goal: String,
    pub tool: String,
}

impl AgentRole {
    pub fn new(name: impl Into<String>, goal: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: goal.into(),
            tool: tool.into(),
        }
    }
}

/// Default roster: a lead who plans and delegates, and a reporter.
pub fn default_roster() -> Vec<AgentRole> {
    vec![
        AgentRole::new(
            "Lead Data Scientist",
            "Break the request down into an analysis plan",
            "Delegate work to coworker",
        ),
        AgentRole::new(
            "Reporting Analyst",
            "Summarize the findings for the user",
            "Summarize CSV",
        ),
    ]
}

pub struct ScriptedCrew {
    roster: Vec<AgentRole>,
    step_delay: Duration,
}

impl ScriptedCrew {
    pub fn new(roster: Vec<AgentRole>, step_delay: Duration) -> Self {
        Self { roster, step_delay }
    }

    /// Default roster with the given pacing.
    pub fn with_step_delay(step_delay: Duration) -> Self {
        Self::new(default_roster(), step_delay)
    }

    fn run_agent(
        &self,
        agent: &AgentRole,
        spec: &JobSpec,
        dataset: &str,
        ctx: &EngineContext<'_>,
    ) -> anyhow::Result<String> {
        let mut console = ctx.console();
        let agent_name = Some(agent.name.clone());

        ctx.emit(EngineEvent::UnitStarted {
            name: agent.name.clone(),
            input_keys: spec.inputs.keys().cloned().collect(),
        });
        writeln!(console, "# Agent: {}", agent.name)?;
        writeln!(console, "## Task: {}", agent.goal)?;

        let prompt = format!(
            "You are the {}. {}. User request: {}",
            agent.name, agent.goal, spec.task
        );
        ctx.emit(EngineEvent::ModelStarted {
            model: Some(spec.model.clone()),
            prompts: vec![prompt],
        });
        ctx.sleep(self.step_delay)?;

        let thought = format!(
            "Thought: To {} I will use {} on {dataset}.\nThe request is: {}",
            agent.goal.to_lowercase(),
            agent.tool,
            spec.task
        );
        let tool_input = json!({ "dataset_path": dataset, "task": spec.task });
        let log = format!(
            "{thought}\nAction: {}\nAction Input: {tool_input}",
            agent.tool
        );
        ctx.emit(EngineEvent::ModelFinished {
            generations: vec![log.clone()],
            raw: serde_json::Value::Null,
        });
        ctx.emit(EngineEvent::AgentAction {
            agent: agent_name.clone(),
            tool: agent.tool.clone(),
            tool_input: tool_input.clone(),
            log,
        });

        ctx.emit(EngineEvent::ToolStarted {
            tool: agent.tool.clone(),
            input: tool_input.to_string(),
        });
        // Narration arrives in fragments, the way an unbuffered writer
        // produces it.
        write!(console, "Using tool: {}", agent.tool)?;
        ctx.sleep(self.step_delay)?;
        writeln!(console, " ... done")?;

        let output = format!("{} finished: {} for '{}'", agent.name, agent.goal, spec.task);
        ctx.emit(EngineEvent::ToolFinished {
            tool: agent.tool.clone(),
            agent: agent_name.clone(),
            output: output.clone(),
        });
        ctx.emit(EngineEvent::AgentFinished {
            agent: agent_name,
            output: output.clone(),
        });
        ctx.emit(EngineEvent::UnitFinished {
            name: agent.name.clone(),
            output: json!({ "output": output }),
        });
        ctx.checkpoint()?;

        Ok(output)
    }
}

impl Default for ScriptedCrew {
    fn default() -> Self {
        Self::with_step_delay(Duration::from_millis(400))
    }
}

impl WorkEngine for ScriptedCrew {
    fn name(&self) -> &str {
        "scripted-crew"
    }

    fn run(&self, spec: &JobSpec, ctx: &EngineContext<'_>) -> anyhow::Result<JobOutput> {
        let dataset = spec.input_str("dataset_path").unwrap_or("").to_string();
        tracing::info!(agents = self.roster.len(), model = %spec.model, "Scripted crew starting");

        ctx.emit(EngineEvent::JobStarted {
            name: "data-science-crew".to_string(),
            input_keys: spec.inputs.keys().cloned().collect(),
        });
        writeln!(ctx.console(), "Crew execution started: {}", spec.task)?;

        let mut report = Vec::with_capacity(self.roster.len());
        for agent in &self.roster {
            ctx.checkpoint()?;
            report.push(self.run_agent(agent, spec, &dataset, ctx)?);
        }

        writeln!(ctx.console(), "Crew execution finished")?;

        Ok(JobOutput::Structured(json!({
            "task": spec.task,
            "model": spec.model,
            "report": report.join("\n"),
            "steps": report.len(),
        })))
    }
}
