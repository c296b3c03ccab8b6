//! ReAct prompt template.

use super::parser::tool_list;
use crate::tools::{Tool, ToolKind};

/// Generation stops here so the model never writes its own observations.
pub const STOP_SEQUENCE: &str = "\nObservation:";

/// Fills the template for one turn.
pub fn render(site_name: &str, question: &str, tools: &[&dyn Tool], scratchpad: &str) -> String {
    let tool_lines = tools
        .iter()
        .map(|tool| format!("{}: {}", tool.kind().name(), tool.description()))
        .collect::<Vec<_>>()
        .join("\n");
    let retriever = ToolKind::Retriever.name();
    let web = ToolKind::WebSearch.name();
    format!(
        "You are a helpful AI assistant for {site_name}.

INSTRUCTIONS:
- ALWAYS use the {retriever} tool first to search the {site_name} knowledge base
- Analyze the retriever's Observation carefully
- If the retriever returns no relevant information or an empty result:
    - THEN use the {web} tool to search the {site_name} website
- NEVER use {web} unless the retriever fails
- Answer strictly based on tool observations
- If no tool provides information, clearly say you do not have enough information

TOOLS:
{tool_lines}

FORMAT:
Question: the input question
Thought: decide what to do
Action: one of [{tools}]
Action Input: input to the action
Observation: result
... (repeat if needed)
Thought: I now know the final answer
Final Answer: answer to the user

Begin!

Question: {question}
Thought: {scratchpad}",
        tools = tool_list(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolError, ToolOutput};

    struct Named(ToolKind);

    impl Tool for Named {
        fn kind(&self) -> ToolKind {
            self.0
        }
        fn description(&self) -> String {
            format!("does {}", self.0)
        }
        fn run(&self, _: &str) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::Empty)
        }
        fn empty_message(&self) -> String {
            String::new()
        }
    }

    #[test]
    fn lists_tools_and_ends_with_scratchpad() {
        let retriever = Named(ToolKind::Retriever);
        let web = Named(ToolKind::WebSearch);
        let prompt = render(
            "Revnix",
            "When was Revnix founded?",
            &[&retriever, &web],
            "checking\nObservation: x\nThought: ",
        );
        assert!(prompt.contains("retrieve_site_info: does retrieve_site_info"));
        assert!(prompt.contains("Action: one of [retrieve_site_info, site_web_search]"));
        assert!(prompt.contains("Question: When was Revnix founded?\nThought: checking"));
        assert!(prompt.ends_with("Thought: "));
    }
}
