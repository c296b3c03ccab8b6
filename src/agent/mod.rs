//! Retrieval-first ReAct answering loop.
//!
//! One question per run, no memory between runs. Each turn asks the completion model for
//! the next step, runs the named tool, and appends the observation to the scratchpad until
//! a final answer is accepted or the step budget runs out.
//!
//! Ordering is enforced here rather than trusted to the prompt:
//! * web search requested before any retrieval is refused with a corrective observation;
//! * a final answer before any retrieval triggers a retriever run on the question itself;
//! * a final answer while every retrieval came back empty or failed, with no web search yet,
//!   triggers a web search on the question itself;
//! * if no tool produced anything usable, the answer is replaced with
//!   [`INSUFFICIENT_INFORMATION`].

use crate::llm::{CompletionModel, CompletionRequest};
use crate::tools::{Tool, ToolKind, ToolOutput};
use parser::{parse_turn, ParsedTurn};
use std::fmt;
use thiserror::Error;

pub mod parser;
pub mod prompt;

/// Answer given when no tool observation carried usable information.
pub const INSUFFICIENT_INFORMATION: &str =
    "I do not have enough information to answer that question based on the website's content.";

/// Answer given when the step budget ran out before a final answer.
pub const STEP_BUDGET_EXHAUSTED: &str =
    "I could not finish researching that question within the allowed number of steps.";

/// Loop settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Site name used in the prompt.
    pub site_name: String,
    /// Model turns allowed per question.
    pub max_steps: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap per turn.
    pub max_tokens: usize,
}

impl AgentConfig {
    /// Defaults for `site_name`: six steps, temperature 0.3, 1024 tokens.
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            max_steps: 6,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// What happened on one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// A tool ran.
    Tool {
        /// Tool that ran.
        kind: ToolKind,
        /// Query it received.
        input: String,
        /// True when the loop ran it to enforce ordering rather than the model asking.
        forced: bool,
    },
    /// The model's turn was refused.
    Rejected {
        /// Why, as shown to the model.
        reason: String,
    },
}

/// One entry in the run trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    /// Model reasoning for the turn.
    pub thought: String,
    /// Action taken.
    pub action: StepAction,
    /// Text fed back to the model.
    pub observation: String,
    /// True when the observation carried at least one source.
    pub usable: bool,
}

impl TraceStep {
    /// Tool that ran on this step, if any.
    pub fn tool(&self) -> Option<ToolKind> {
        match self.action {
            StepAction::Tool { kind, .. } => Some(kind),
            StepAction::Rejected { .. } => None,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A final answer was accepted.
    FinalAnswer,
    /// The step budget ran out.
    StepBudget,
}

/// Outcome of one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    /// Text for the user.
    pub answer: String,
    /// Every step taken, in order.
    pub steps: Vec<TraceStep>,
    /// Why the loop ended.
    pub stop: StopReason,
}

impl AgentRun {
    /// Tools in the order they ran.
    pub fn tool_sequence(&self) -> Vec<ToolKind> {
        self.steps.iter().filter_map(TraceStep::tool).collect()
    }
}

/// Hard failures; tool problems never end up here.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The completion backend failed.
    #[error("completion model failed: {0:#}")]
    Completion(#[source] anyhow::Error),
}

/// The answering loop with its model and tools.
pub struct Agent {
    model: Box<dyn CompletionModel>,
    retriever: Box<dyn Tool>,
    web_search: Box<dyn Tool>,
    config: AgentConfig,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent").field("config", &self.config).finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Progress {
    retrieval_attempted: bool,
    retrieval_usable: bool,
    web_search_attempted: bool,
    any_usable: bool,
}

impl Agent {
    /// Builds the loop. `retriever` and `web_search` must report the matching [`ToolKind`].
    pub fn new(
        model: Box<dyn CompletionModel>,
        retriever: Box<dyn Tool>,
        web_search: Box<dyn Tool>,
        config: AgentConfig,
    ) -> Self {
        debug_assert_eq!(retriever.kind(), ToolKind::Retriever);
        debug_assert_eq!(web_search.kind(), ToolKind::WebSearch);
        Self {
            model,
            retriever,
            web_search,
            config,
        }
    }

    /// Loop settings.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn tool(&self, kind: ToolKind) -> &dyn Tool {
        match kind {
            ToolKind::Retriever => self.retriever.as_ref(),
            ToolKind::WebSearch => self.web_search.as_ref(),
        }
    }

    /// Answers one question.
    pub fn run(&self, question: &str) -> Result<AgentRun, AgentError> {
        let question = question.trim();
        let tools = [self.retriever.as_ref(), self.web_search.as_ref()];
        let stop = [prompt::STOP_SEQUENCE];
        let mut scratchpad = String::new();
        let mut steps = Vec::new();
        let mut progress = Progress::default();

        for turn in 0..self.config.max_steps {
            let prompt = prompt::render(&self.config.site_name, question, &tools, &scratchpad);
            let request = CompletionRequest {
                prompt: &prompt,
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                stop: &stop,
            };
            let raw = self.model.complete(&request).map_err(AgentError::Completion)?;
            let step = match parse_turn(&raw) {
                ParsedTurn::Final { thought, answer } => {
                    if !progress.retrieval_attempted {
                        tracing::info!(turn, "final answer before retrieval; running retriever");
                        self.run_tool(ToolKind::Retriever, question, thought, true, &mut progress)
                    } else if !progress.retrieval_usable && !progress.web_search_attempted {
                        tracing::info!(turn, "retrieval came back empty; running web search");
                        self.run_tool(ToolKind::WebSearch, question, thought, true, &mut progress)
                    } else {
                        let answer = if progress.any_usable {
                            answer
                        } else {
                            INSUFFICIENT_INFORMATION.to_string()
                        };
                        tracing::info!(turn, steps = steps.len(), "final answer accepted");
                        return Ok(AgentRun {
                            answer,
                            steps,
                            stop: StopReason::FinalAnswer,
                        });
                    }
                }
                ParsedTurn::Action {
                    thought,
                    tool: ToolKind::WebSearch,
                    ..
                } if !progress.retrieval_attempted => rejected(
                    thought,
                    format!(
                        "{} may only be used after {} has been tried. Use {} first.",
                        ToolKind::WebSearch,
                        ToolKind::Retriever,
                        ToolKind::Retriever
                    ),
                ),
                ParsedTurn::Action {
                    thought,
                    tool,
                    input,
                } => self.run_tool(tool, &input, thought, false, &mut progress),
                ParsedTurn::Invalid { thought, reason } => {
                    tracing::warn!(turn, %reason, "rejecting malformed model turn");
                    rejected(thought, reason.to_string())
                }
            };
            append_scratchpad(&mut scratchpad, &step);
            steps.push(step);
        }

        tracing::warn!(max_steps = self.config.max_steps, "step budget exhausted");
        Ok(AgentRun {
            answer: STEP_BUDGET_EXHAUSTED.to_string(),
            steps,
            stop: StopReason::StepBudget,
        })
    }

    fn run_tool(
        &self,
        kind: ToolKind,
        input: &str,
        thought: String,
        forced: bool,
        progress: &mut Progress,
    ) -> TraceStep {
        let tool = self.tool(kind);
        let result = tool.run(input);
        let usable = matches!(result, Ok(ToolOutput::Sources(_)));
        if let Err(err) = &result {
            tracing::warn!(tool = %kind, error = %err, "tool failed");
        }
        match kind {
            ToolKind::Retriever => {
                progress.retrieval_attempted = true;
                progress.retrieval_usable |= usable;
            }
            ToolKind::WebSearch => progress.web_search_attempted = true,
        }
        progress.any_usable |= usable;
        TraceStep {
            thought,
            action: StepAction::Tool {
                kind,
                input: input.to_string(),
                forced,
            },
            observation: tool.render(&result),
            usable,
        }
    }
}

fn rejected(thought: String, reason: String) -> TraceStep {
    TraceStep {
        thought,
        observation: reason.clone(),
        action: StepAction::Rejected { reason },
        usable: false,
    }
}

fn append_scratchpad(scratchpad: &mut String, step: &TraceStep) {
    let thought = if step.thought.is_empty() {
        "I need to decide on the next action."
    } else {
        step.thought.as_str()
    };
    match &step.action {
        StepAction::Tool { kind, input, .. } => scratchpad.push_str(&format!(
            "{thought}\nAction: {kind}\nAction Input: {input}\nObservation: {}\nThought: ",
            step.observation
        )),
        StepAction::Rejected { .. } => scratchpad.push_str(&format!(
            "{thought}\nObservation: {}\nThought: ",
            step.observation
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Source, ToolError, RETRIEVER_EMPTY};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        turns: Mutex<VecDeque<&'static str>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(turns: &[&'static str]) -> (Self, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    turns: Mutex::new(turns.iter().copied().collect()),
                    prompts: prompts.clone(),
                },
                prompts,
            )
        }
    }

    impl CompletionModel for Scripted {
        fn complete(&self, request: &CompletionRequest<'_>) -> anyhow::Result<String> {
            assert_eq!(request.stop, [prompt::STOP_SEQUENCE]);
            self.prompts.lock().unwrap().push(request.prompt.to_string());
            let next = self.turns.lock().unwrap().pop_front();
            Ok(next.unwrap_or("Thought: I keep thinking").to_string())
        }
    }

    struct Canned {
        kind: ToolKind,
        result: fn() -> Result<ToolOutput, ToolError>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Tool for Canned {
        fn kind(&self) -> ToolKind {
            self.kind
        }
        fn description(&self) -> String {
            "canned".into()
        }
        fn run(&self, query: &str) -> Result<ToolOutput, ToolError> {
            self.calls.lock().unwrap().push(query.to_string());
            (self.result)()
        }
        fn empty_message(&self) -> String {
            match self.kind {
                ToolKind::Retriever => RETRIEVER_EMPTY.into(),
                ToolKind::WebSearch => "No relevant information found on the revnix.com website.".into(),
            }
        }
    }

    fn found() -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Sources(vec![Source {
            rank: 1,
            text_excerpt: "Revnix is a software company founded in 2020.".into(),
            origin_url: None,
        }]))
    }

    fn nothing() -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Empty)
    }

    fn broken() -> Result<ToolOutput, ToolError> {
        Err(ToolError::Search(anyhow::anyhow!("backend down")))
    }

    struct Harness {
        agent: Agent,
        retriever_calls: Arc<Mutex<Vec<String>>>,
        web_calls: Arc<Mutex<Vec<String>>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    fn harness(
        turns: &[&'static str],
        retriever: fn() -> Result<ToolOutput, ToolError>,
        web: fn() -> Result<ToolOutput, ToolError>,
        max_steps: usize,
    ) -> Harness {
        let (model, prompts) = Scripted::new(turns);
        let retriever_calls = Arc::new(Mutex::new(Vec::new()));
        let web_calls = Arc::new(Mutex::new(Vec::new()));
        let mut config = AgentConfig::new("Revnix");
        config.max_steps = max_steps;
        let agent = Agent::new(
            Box::new(model),
            Box::new(Canned {
                kind: ToolKind::Retriever,
                result: retriever,
                calls: retriever_calls.clone(),
            }),
            Box::new(Canned {
                kind: ToolKind::WebSearch,
                result: web,
                calls: web_calls.clone(),
            }),
            config,
        );
        Harness {
            agent,
            retriever_calls,
            web_calls,
            prompts,
        }
    }

    const RETRIEVE: &str = "I should search the knowledge base.\nAction: retrieve_site_info\nAction Input: Revnix founding year";
    const SEARCH: &str = "The knowledge base had nothing.\nAction: site_web_search\nAction Input: Revnix founding year";
    const FINAL: &str = "Thought: I now know the final answer\nFinal Answer: Revnix was founded in 2020.";

    #[test]
    fn relevant_retrieval_never_falls_back() {
        let h = harness(&[RETRIEVE, FINAL], found, found, 6);
        let run = h.agent.run("When was Revnix founded?").unwrap();
        assert_eq!(run.stop, StopReason::FinalAnswer);
        assert_eq!(run.answer, "Revnix was founded in 2020.");
        assert_eq!(run.tool_sequence(), vec![ToolKind::Retriever]);
        assert!(h.web_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_retrieval_forces_fallback_before_final() {
        let h = harness(&[RETRIEVE, FINAL, FINAL], nothing, found, 6);
        let run = h.agent.run("When was Revnix founded?").unwrap();
        assert_eq!(
            run.tool_sequence(),
            vec![ToolKind::Retriever, ToolKind::WebSearch]
        );
        assert_eq!(run.steps[0].observation, RETRIEVER_EMPTY);
        assert!(matches!(
            run.steps[1].action,
            StepAction::Tool { forced: true, .. }
        ));
        assert_eq!(
            *h.web_calls.lock().unwrap(),
            vec!["When was Revnix founded?".to_string()]
        );
        assert_eq!(run.answer, "Revnix was founded in 2020.");
    }

    #[test]
    fn model_driven_fallback_after_empty_retrieval() {
        let h = harness(&[RETRIEVE, SEARCH, FINAL], nothing, found, 6);
        let run = h.agent.run("When was Revnix founded?").unwrap();
        assert_eq!(
            run.tool_sequence(),
            vec![ToolKind::Retriever, ToolKind::WebSearch]
        );
        assert!(matches!(
            run.steps[1].action,
            StepAction::Tool { forced: false, .. }
        ));
        assert_eq!(run.stop, StopReason::FinalAnswer);
    }

    #[test]
    fn web_search_first_is_refused() {
        let h = harness(&[SEARCH, RETRIEVE, FINAL], found, found, 6);
        let run = h.agent.run("When was Revnix founded?").unwrap();
        assert!(matches!(run.steps[0].action, StepAction::Rejected { .. }));
        assert!(run.steps[0].observation.contains("retrieve_site_info first"));
        assert_eq!(run.tool_sequence(), vec![ToolKind::Retriever]);
        assert!(h.web_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn early_final_answer_runs_retriever() {
        let h = harness(&[FINAL, FINAL], found, found, 6);
        let run = h.agent.run("When was Revnix founded?").unwrap();
        assert_eq!(run.tool_sequence(), vec![ToolKind::Retriever]);
        assert_eq!(
            *h.retriever_calls.lock().unwrap(),
            vec!["When was Revnix founded?".to_string()]
        );
        assert_eq!(run.answer, "Revnix was founded in 2020.");
    }

    #[test]
    fn malformed_turn_becomes_corrective_observation() {
        let h = harness(
            &["Action: google\nAction Input: revnix", RETRIEVE, FINAL],
            found,
            found,
            6,
        );
        let run = h.agent.run("When was Revnix founded?").unwrap();
        assert_eq!(run.stop, StopReason::FinalAnswer);
        let StepAction::Rejected { reason } = &run.steps[0].action else {
            panic!("first step should be rejected");
        };
        assert!(reason.contains("`google` is not a valid tool"));
        let prompts = h.prompts.lock().unwrap();
        assert!(prompts[1].contains("Observation: `google` is not a valid tool"));
    }

    #[test]
    fn nothing_usable_means_insufficient_information() {
        let h = harness(&[RETRIEVE, FINAL, FINAL], broken, nothing, 6);
        let run = h.agent.run("Who is the CEO's cat?").unwrap();
        assert_eq!(
            run.tool_sequence(),
            vec![ToolKind::Retriever, ToolKind::WebSearch]
        );
        assert!(run.steps[0].observation.starts_with("Error"));
        assert_eq!(run.answer, INSUFFICIENT_INFORMATION);
    }

    #[test]
    fn step_budget_returns_partial_trace() {
        let h = harness(&[RETRIEVE, RETRIEVE, RETRIEVE], found, found, 3);
        let run = h.agent.run("When was Revnix founded?").unwrap();
        assert_eq!(run.stop, StopReason::StepBudget);
        assert_eq!(run.steps.len(), 3);
        assert_eq!(run.answer, STEP_BUDGET_EXHAUSTED);
    }

    #[test]
    fn observations_accumulate_in_scratchpad() {
        let h = harness(&[RETRIEVE, FINAL], found, found, 6);
        h.agent.run("When was Revnix founded?").unwrap();
        let prompts = h.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].ends_with("Thought: "));
        assert!(prompts[1].contains(
            "Action: retrieve_site_info\nAction Input: Revnix founding year\nObservation: [Source 1]:"
        ));
    }
}
