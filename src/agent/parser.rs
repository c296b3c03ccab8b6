//! Parses one ReAct-formatted model turn into a typed step.

use crate::tools::ToolKind;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

const FINAL_ANSWER: &str = "Final Answer:";

/// What the model asked for on one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTurn {
    /// The model is done.
    Final {
        /// Reasoning before the answer.
        thought: String,
        /// Answer text.
        answer: String,
    },
    /// The model wants a tool run.
    Action {
        /// Reasoning before the action.
        thought: String,
        /// Tool to run.
        tool: ToolKind,
        /// Query passed to the tool.
        input: String,
    },
    /// The turn could not be understood.
    Invalid {
        /// Whatever reasoning could be salvaged.
        thought: String,
        /// What was wrong.
        reason: InvalidTurn,
    },
}

/// Why a turn was rejected; rendered back to the model as a corrective observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTurn {
    /// Neither an action nor a final answer was found.
    #[error("Invalid Format: Missing 'Action:' after 'Thought:'")]
    MissingAction,
    /// `Action:` without a usable `Action Input:`.
    #[error("Invalid Format: Missing 'Action Input:' after 'Action:'")]
    MissingActionInput,
    /// The action named a tool that does not exist.
    #[error("`{0}` is not a valid tool, try one of [{list}]", list = tool_list())]
    UnknownTool(String),
    /// Both an action and a final answer were emitted.
    #[error("Invalid Format: produced both a final answer and an action; emit only one")]
    ActionAndFinalAnswer,
    /// `Final Answer:` followed by nothing.
    #[error("Invalid Format: 'Final Answer:' must be followed by the answer")]
    EmptyFinalAnswer,
}

/// Comma-separated tool names, as listed in the prompt.
pub fn tool_list() -> String {
    ToolKind::ALL
        .iter()
        .map(|kind| kind.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn action_regex() -> &'static Regex {
    static ACTION: OnceLock<Regex> = OnceLock::new();
    ACTION.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action regex")
    })
}

fn bare_action_regex() -> &'static Regex {
    static BARE: OnceLock<Regex> = OnceLock::new();
    BARE.get_or_init(|| Regex::new(r"Action\s*\d*\s*:").expect("bare action regex"))
}

/// Parses one model completion. Anything after a hallucinated `Observation:` is ignored.
pub fn parse_turn(raw: &str) -> ParsedTurn {
    let text = raw
        .find("\nObservation:")
        .map_or(raw, |cut| &raw[..cut]);
    let final_pos = text.find(FINAL_ANSWER);

    if let Some(caps) = action_regex().captures(text) {
        let whole = caps.get(0).map_or(0, |m| m.start());
        let thought = thought_before(text, final_pos.map_or(whole, |pos| pos.min(whole)));
        if final_pos.is_some() {
            return ParsedTurn::Invalid {
                thought,
                reason: InvalidTurn::ActionAndFinalAnswer,
            };
        }
        let name = caps.get(1).map_or("", |m| m.as_str());
        let input = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .trim()
            .trim_matches('"')
            .trim();
        return match name.parse::<ToolKind>() {
            Err(unknown) => ParsedTurn::Invalid {
                thought,
                reason: InvalidTurn::UnknownTool(unknown.0),
            },
            Ok(_) if input.is_empty() => ParsedTurn::Invalid {
                thought,
                reason: InvalidTurn::MissingActionInput,
            },
            Ok(tool) => ParsedTurn::Action {
                thought,
                tool,
                input: input.to_string(),
            },
        };
    }

    if let Some(pos) = final_pos {
        let thought = thought_before(text, pos);
        let answer = text[pos + FINAL_ANSWER.len()..].trim();
        if answer.is_empty() {
            return ParsedTurn::Invalid {
                thought,
                reason: InvalidTurn::EmptyFinalAnswer,
            };
        }
        return ParsedTurn::Final {
            thought,
            answer: answer.to_string(),
        };
    }

    let reason = if bare_action_regex().is_match(text) {
        InvalidTurn::MissingActionInput
    } else {
        InvalidTurn::MissingAction
    };
    ParsedTurn::Invalid {
        thought: thought_before(text, text.len()),
        reason,
    }
}

fn thought_before(text: &str, end: usize) -> String {
    let head = text[..end].trim();
    head.strip_prefix("Thought:").unwrap_or(head).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_action() {
        let turn = parse_turn(
            "I should check the knowledge base.\nAction: retrieve_site_info\nAction Input: \"founding year\"",
        );
        assert_eq!(
            turn,
            ParsedTurn::Action {
                thought: "I should check the knowledge base.".into(),
                tool: ToolKind::Retriever,
                input: "founding year".into(),
            }
        );
    }

    #[test]
    fn parses_final_answer() {
        let turn = parse_turn("Thought: I now know the final answer\nFinal Answer: Revnix was founded in 2020.");
        assert_eq!(
            turn,
            ParsedTurn::Final {
                thought: "I now know the final answer".into(),
                answer: "Revnix was founded in 2020.".into(),
            }
        );
    }

    #[test]
    fn ignores_hallucinated_observation() {
        let turn = parse_turn(
            "Action: site_web_search\nAction Input: careers\nObservation: made up\nFinal Answer: nope",
        );
        assert!(matches!(
            turn,
            ParsedTurn::Action { tool: ToolKind::WebSearch, ref input, .. } if input == "careers"
        ));
    }

    #[test]
    fn rejects_unknown_tool() {
        let turn = parse_turn("Action: google\nAction Input: revnix");
        let ParsedTurn::Invalid { reason, .. } = turn else {
            panic!("expected invalid turn");
        };
        assert_eq!(reason, InvalidTurn::UnknownTool("google".into()));
        assert_eq!(
            reason.to_string(),
            "`google` is not a valid tool, try one of [retrieve_site_info, site_web_search]"
        );
    }

    #[test]
    fn rejects_action_plus_final() {
        let turn = parse_turn("Final Answer: 2020\nAction: retrieve_site_info\nAction Input: x");
        assert!(matches!(
            turn,
            ParsedTurn::Invalid {
                reason: InvalidTurn::ActionAndFinalAnswer,
                ..
            }
        ));
    }

    #[test]
    fn classifies_missing_parts() {
        assert!(matches!(
            parse_turn("I am thinking about it."),
            ParsedTurn::Invalid {
                reason: InvalidTurn::MissingAction,
                ..
            }
        ));
        assert!(matches!(
            parse_turn("Action: retrieve_site_info"),
            ParsedTurn::Invalid {
                reason: InvalidTurn::MissingActionInput,
                ..
            }
        ));
        assert!(matches!(
            parse_turn("Final Answer:   "),
            ParsedTurn::Invalid {
                reason: InvalidTurn::EmptyFinalAnswer,
                ..
            }
        ));
    }
}
