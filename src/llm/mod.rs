//! Text-completion backends driving the answering loop.

use anyhow::Result;
use clap::ValueEnum;

mod anthropic;
mod openai;

pub use anthropic::AnthropicModel;
pub use openai::OpenAiCompatibleModel;

/// Which completion API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmProvider {
    /// `/chat/completions` on any OpenAI-compatible endpoint (OpenAI, Groq, vLLM).
    Openai,
    /// Anthropic messages API.
    Anthropic,
}

/// Request envelope shared by the backends.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Full prompt, sent as a single user turn.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: usize,
    /// Sequences that end generation early.
    pub stop: &'a [&'a str],
}

/// Black-box text completion.
pub trait CompletionModel: Send + Sync {
    /// Returns the model's continuation of `request.prompt`.
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;
}
