//! Startup wiring for the question-answering service.
//!
//! [`Assistant::initialize`] validates credentials, builds the index from the corpus, and
//! assembles the agent. [`ServiceState`] keeps the outcome: a ready assistant, or the
//! reason it is not ready, so request handlers never see a half-built service.

use crate::agent::{Agent, AgentConfig, TraceStep};
use crate::chunker::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::corpus::{load_documents, CorpusError};
use crate::embedder::{Embedder, HashingEmbedder, OpenAiEmbedder, DEFAULT_OPENAI_BASE_URL};
use crate::index::{
    IndexError, IndexStore, IngestReport, MemoryIndex, Metric, QdrantIndex, VectorIndex,
    DEFAULT_COLLECTION,
};
use crate::llm::{AnthropicModel, CompletionModel, LlmProvider, OpenAiCompatibleModel};
use crate::tools::{RetrieverTool, TavilyClient, WebSearchTool};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Answer shown when the loop itself fails.
pub const PROCESSING_ERROR_ANSWER: &str =
    "I apologize, but I encountered an error while processing your question. Please try again.";

/// Vector store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexBackend {
    /// Qdrant over REST.
    Qdrant,
    /// In-process brute force; rebuilt on every start.
    Memory,
}

/// Embedding backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// OpenAI-compatible embeddings API.
    Openai,
    /// Offline feature hashing.
    Hashing,
}

/// Flags for the assistant binary.
#[derive(Args, Debug, Clone)]
pub struct AssistantArgs {
    /// Corpus file produced by the crawler
    #[arg(long, env = "SITESAGE_CORPUS", default_value = "site_corpus.txt")]
    pub corpus: PathBuf,

    /// Domain the fallback web search is restricted to, e.g. revnix.com
    #[arg(long, env = "SITESAGE_SEARCH_DOMAIN")]
    pub search_domain: String,

    /// Display name used in prompts (defaults to the first label of the domain)
    #[arg(long, env = "SITESAGE_SITE_NAME")]
    pub site_name: Option<String>,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters shared by neighbouring chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// Vector store backend
    #[arg(long, env = "SITESAGE_INDEX_BACKEND", value_enum, default_value_t = IndexBackend::Qdrant)]
    pub index_backend: IndexBackend,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,

    /// Qdrant API key (optional for local clusters)
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    pub qdrant_api_key: Option<String>,

    /// Collection holding the chunk vectors
    #[arg(long, env = "SITESAGE_COLLECTION", default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Similarity metric used when the collection is created
    #[arg(long, value_enum, default_value_t = Metric::Cosine)]
    pub metric: Metric,

    /// Chunks returned per retrieval (at most 3)
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,

    /// Embedding backend
    #[arg(long, env = "SITESAGE_EMBEDDER", value_enum, default_value_t = EmbedderKind::Openai)]
    pub embedder: EmbedderKind,

    /// API key for the embeddings endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Embeddings endpoint base URL
    #[arg(long, env = "SITESAGE_EMBEDDING_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub embedding_base_url: String,

    /// Embedding model name
    #[arg(long, default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Embedding vector length
    #[arg(long, default_value_t = 384)]
    pub embedding_dimensions: usize,

    /// Tavily API key for the fallback web search
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    pub tavily_api_key: Option<String>,

    /// Completion API flavour
    #[arg(long, env = "SITESAGE_LLM_PROVIDER", value_enum, default_value_t = LlmProvider::Openai)]
    pub llm_provider: LlmProvider,

    /// Completion API base URL
    #[arg(long, env = "SITESAGE_LLM_BASE_URL", default_value = "https://api.groq.com/openai/v1")]
    pub llm_base_url: String,

    /// Completion model name
    #[arg(long, env = "SITESAGE_LLM_MODEL", default_value = "llama-3.3-70b-versatile")]
    pub llm_model: String,

    /// Completion API key
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.3)]
    pub temperature: f32,

    /// Token cap per model turn
    #[arg(long, default_value_t = 1024)]
    pub max_completion_tokens: usize,

    /// Model turns allowed per question
    #[arg(long, default_value_t = 6)]
    pub max_steps: usize,

    /// Timeout for every outbound API call, in seconds
    #[arg(long, default_value_t = 60)]
    pub http_timeout_secs: u64,
}

/// Invalid or missing settings; fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A selected backend needs a credential that was not supplied.
    #[error("missing required credential {0}")]
    MissingCredential(&'static str),
    /// A setting has an unusable value.
    #[error("invalid setting {name}: {reason}")]
    Invalid {
        /// Flag name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Startup failures.
#[derive(Debug, Error)]
pub enum InitError {
    /// Settings were rejected before any network call.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The corpus could not be read.
    #[error("failed to load corpus {}: {source}", .path.display())]
    Corpus {
        /// Corpus path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: CorpusError,
    },
    /// Collection setup or ingestion failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// An API client could not be built.
    #[error("failed to build {client} client: {source:#}")]
    Client {
        /// Which client.
        client: &'static str,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

/// Request rejected before reaching the agent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AskError {
    /// Blank question.
    #[error("question cannot be empty")]
    EmptyQuestion,
    /// Startup failed; carries the reason.
    #[error("assistant is not ready: {0}")]
    NotReady(String),
}

/// Runs the agent on `question`, collapsing loop failures into a fixed apology.
pub fn ask(agent: &Agent, question: &str) -> String {
    ask_with_trace(agent, question).0
}

/// Like [`ask`], also returning the steps taken. A failed run has no trace.
pub fn ask_with_trace(agent: &Agent, question: &str) -> (String, Vec<TraceStep>) {
    match agent.run(question) {
        Ok(run) => {
            tracing::debug!(steps = run.steps.len(), stop = ?run.stop, "question answered");
            (run.answer, run.steps)
        }
        Err(err) => {
            tracing::error!(error = %err, "answering loop failed");
            (PROCESSING_ERROR_ANSWER.to_string(), Vec::new())
        }
    }
}

/// Fully initialized, immutable question-answering service.
#[derive(Debug)]
pub struct Assistant {
    agent: Agent,
    ingest: IngestReport,
}

impl Assistant {
    /// Wraps an already assembled agent.
    pub fn from_agent(agent: Agent, ingest: IngestReport) -> Self {
        Self { agent, ingest }
    }

    /// Validates settings, populates the index if it is empty, and builds the agent.
    pub fn initialize(args: &AssistantArgs) -> Result<Self, InitError> {
        let tavily_key = require(&args.tavily_api_key, "TAVILY_API_KEY")?;
        let llm_key = require(&args.llm_api_key, "LLM_API_KEY")?;
        let domain = normalize_domain(&args.search_domain)?;
        let site_name = args
            .site_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| site_name_from_domain(&domain));
        let timeout = Duration::from_secs(args.http_timeout_secs.max(1));

        let embedder = build_embedder(args, timeout)?;
        let backend = build_backend(args, timeout)?;
        let store = IndexStore::new(backend, embedder, args.collection.clone(), args.metric);
        store.ensure_collection()?;

        let documents = load_documents(&args.corpus).map_err(|source| InitError::Corpus {
            path: args.corpus.clone(),
            source,
        })?;
        let chunks = Chunker::new(args.chunk_size, args.chunk_overlap).chunk_documents(&documents);
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            corpus = %args.corpus.display(),
            "corpus chunked"
        );
        let ingest = store.ingest(&chunks)?;
        tracing::info!(%ingest, "index ready");

        let search = TavilyClient::new(tavily_key, timeout).map_err(|source| InitError::Client {
            client: "Tavily",
            source,
        })?;
        let model = build_model(args, llm_key, timeout)?;
        let mut config = AgentConfig::new(site_name);
        config.max_steps = args.max_steps.max(1);
        config.temperature = args.temperature;
        config.max_tokens = args.max_completion_tokens;

        let agent = Agent::new(
            model,
            Box::new(RetrieverTool::new(store, args.top_k, config.site_name.clone())),
            Box::new(WebSearchTool::new(Box::new(search), domain)),
            config,
        );
        Ok(Self { agent, ingest })
    }

    /// Answers one question; see [`ask`].
    pub fn ask(&self, question: &str) -> String {
        ask(&self.agent, question)
    }

    /// Answers one question and returns the trace; see [`ask_with_trace`].
    pub fn ask_with_trace(&self, question: &str) -> (String, Vec<TraceStep>) {
        ask_with_trace(&self.agent, question)
    }

    /// The underlying loop.
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// What startup ingestion did.
    pub fn ingest_report(&self) -> IngestReport {
        self.ingest
    }
}

/// Whether the service can take questions.
#[derive(Debug)]
pub enum ServiceState {
    /// Startup failed; holds the reason.
    NotReady(String),
    /// Serving.
    Ready(Assistant),
}

impl ServiceState {
    /// Runs [`Assistant::initialize`], recording failure instead of returning it.
    pub fn start(args: &AssistantArgs) -> Self {
        match Assistant::initialize(args) {
            Ok(assistant) => ServiceState::Ready(assistant),
            Err(err) => {
                tracing::error!(error = %err, "assistant failed to initialize");
                ServiceState::NotReady(err.to_string())
            }
        }
    }

    /// True once startup succeeded.
    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceState::Ready(_))
    }

    /// Validates and answers one question.
    pub fn ask(&self, question: &str) -> Result<String, AskError> {
        let assistant = match self {
            ServiceState::NotReady(reason) => return Err(AskError::NotReady(reason.clone())),
            ServiceState::Ready(assistant) => assistant,
        };
        if question.trim().is_empty() {
            return Err(AskError::EmptyQuestion);
        }
        Ok(assistant.ask(question))
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingCredential(name))
}

/// Reduces `https://www.revnix.com/about` or `revnix.com` to a bare host.
fn normalize_domain(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_ascii_lowercase();
    if host.is_empty() || !host.contains('.') {
        return Err(ConfigError::Invalid {
            name: "search-domain",
            reason: format!("`{raw}` is not a domain"),
        });
    }
    Ok(host)
}

fn site_name_from_domain(domain: &str) -> String {
    let label = domain.split('.').next().unwrap_or(domain);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => domain.to_string(),
    }
}

fn build_embedder(args: &AssistantArgs, timeout: Duration) -> Result<Box<dyn Embedder>, InitError> {
    if args.embedding_dimensions == 0 {
        return Err(ConfigError::Invalid {
            name: "embedding-dimensions",
            reason: "must be positive".into(),
        }
        .into());
    }
    match args.embedder {
        EmbedderKind::Hashing => Ok(Box::new(HashingEmbedder::new(args.embedding_dimensions))),
        EmbedderKind::Openai => {
            let key = require(&args.openai_api_key, "OPENAI_API_KEY")?;
            let embedder = OpenAiEmbedder::new(
                key,
                &args.embedding_base_url,
                args.embedding_model.clone(),
                args.embedding_dimensions,
                timeout,
            )
            .map_err(|source| InitError::Client {
                client: "embeddings",
                source,
            })?;
            Ok(Box::new(embedder))
        }
    }
}

fn build_backend(args: &AssistantArgs, timeout: Duration) -> Result<Box<dyn VectorIndex>, InitError> {
    match args.index_backend {
        IndexBackend::Memory => Ok(Box::new(MemoryIndex::new())),
        IndexBackend::Qdrant => {
            let index = QdrantIndex::new(&args.qdrant_url, args.qdrant_api_key.as_deref(), timeout)
                .map_err(|source| InitError::Client {
                    client: "Qdrant",
                    source,
                })?;
            Ok(Box::new(index))
        }
    }
}

fn build_model(
    args: &AssistantArgs,
    api_key: &str,
    timeout: Duration,
) -> Result<Box<dyn CompletionModel>, InitError> {
    let client_err = |source| InitError::Client {
        client: "completion",
        source,
    };
    Ok(match args.llm_provider {
        LlmProvider::Openai => Box::new(
            OpenAiCompatibleModel::new(api_key, &args.llm_base_url, args.llm_model.clone(), timeout)
                .map_err(client_err)?,
        ),
        LlmProvider::Anthropic => Box::new(
            AnthropicModel::new(api_key, &args.llm_base_url, args.llm_model.clone(), timeout)
                .map_err(client_err)?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::INSUFFICIENT_INFORMATION;
    use crate::llm::CompletionRequest;
    use crate::tools::{SearchHit, SearchProvider};
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[derive(Parser)]
    #[command(args_override_self = true)]
    struct Harness {
        #[command(flatten)]
        assistant: AssistantArgs,
    }

    fn args(extra: &[&str]) -> AssistantArgs {
        let mut argv = vec![
            "assistant",
            "--search-domain",
            "https://www.revnix.com/",
            "--tavily-api-key",
            "tvly-test",
            "--llm-api-key",
            "gsk-test",
            "--embedder",
            "hashing",
            "--index-backend",
            "memory",
        ];
        argv.extend_from_slice(extra);
        Harness::parse_from(argv).assistant
    }

    #[test]
    fn missing_search_key_is_fatal() {
        let err = Assistant::initialize(&args(&["--tavily-api-key", ""])).unwrap_err();
        assert!(matches!(
            err,
            InitError::Config(ConfigError::MissingCredential("TAVILY_API_KEY"))
        ));
    }

    #[test]
    fn missing_embedding_key_is_fatal() {
        let err = Assistant::initialize(&args(&["--embedder", "openai", "--openai-api-key", " "]))
            .unwrap_err();
        assert!(matches!(
            err,
            InitError::Config(ConfigError::MissingCredential("OPENAI_API_KEY"))
        ));
    }

    #[test]
    fn failed_start_is_not_ready() {
        let state = ServiceState::start(&args(&["--llm-api-key", ""]));
        assert!(!state.is_ready());
        let err = state.ask("When was Revnix founded?").unwrap_err();
        assert_eq!(
            err,
            AskError::NotReady("missing required credential LLM_API_KEY".into())
        );
    }

    #[test]
    fn initializes_offline_and_indexes_corpus() {
        let mut corpus = tempfile::NamedTempFile::new().unwrap();
        write!(
            corpus,
            "\n{rule}\nURL: https://revnix.com/about\n{rule}\nRevnix is a software company founded in 2020.\n",
            rule = "=".repeat(90)
        )
        .unwrap();
        let path = corpus.path().to_str().unwrap().to_string();
        let assistant = Assistant::initialize(&args(&["--corpus", &path])).unwrap();
        assert_eq!(assistant.ingest_report(), IngestReport::Inserted { count: 1 });
        assert_eq!(assistant.agent().config().site_name, "Revnix");
        assert_eq!(assistant.agent().config().max_steps, 6);
    }

    #[test]
    fn missing_corpus_is_reported() {
        let err = Assistant::initialize(&args(&["--corpus", "/definitely/not/here.txt"]))
            .unwrap_err();
        assert!(matches!(err, InitError::Corpus { .. }));
    }

    #[test]
    fn domain_normalization() {
        assert_eq!(normalize_domain("https://www.Revnix.com/about").unwrap(), "revnix.com");
        assert_eq!(normalize_domain("revnix.com").unwrap(), "revnix.com");
        assert!(normalize_domain("localhost").is_err());
        assert_eq!(site_name_from_domain("revnix.com"), "Revnix");
    }

    struct AlwaysFinal;

    impl CompletionModel for AlwaysFinal {
        fn complete(&self, _: &CompletionRequest<'_>) -> anyhow::Result<String> {
            Ok("Final Answer: made up".into())
        }
    }

    struct NoHits;

    impl SearchProvider for NoHits {
        fn search(&self, _: &str, _: usize, _: &[String]) -> anyhow::Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    struct Offline;

    impl CompletionModel for Offline {
        fn complete(&self, _: &CompletionRequest<'_>) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn ready_with(model: Box<dyn CompletionModel>) -> ServiceState {
        let store = IndexStore::new(
            Box::new(MemoryIndex::new()),
            Box::new(HashingEmbedder::new(32)),
            "kb",
            Metric::Cosine,
        );
        store.ensure_collection().unwrap();
        let agent = Agent::new(
            model,
            Box::new(RetrieverTool::new(store, 3, "Revnix")),
            Box::new(WebSearchTool::new(Box::new(NoHits), "revnix.com")),
            AgentConfig::new("Revnix"),
        );
        ServiceState::Ready(Assistant::from_agent(
            agent,
            IngestReport::Inserted { count: 0 },
        ))
    }

    #[test]
    fn ready_state_rejects_blank_question() {
        let state = ready_with(Box::new(AlwaysFinal));
        assert_eq!(state.ask("   \n"), Err(AskError::EmptyQuestion));
    }

    #[test]
    fn empty_knowledge_never_fabricates() {
        let state = ready_with(Box::new(AlwaysFinal));
        assert_eq!(
            state.ask("Who founded Revnix?").unwrap(),
            INSUFFICIENT_INFORMATION
        );
    }

    #[test]
    fn model_failure_degrades_to_apology() {
        let state = ready_with(Box::new(Offline));
        assert_eq!(
            state.ask("Who founded Revnix?").unwrap(),
            PROCESSING_ERROR_ANSWER
        );
    }

    #[test]
    fn traced_model_failure_degrades_to_apology() {
        let ServiceState::Ready(assistant) = ready_with(Box::new(Offline)) else {
            panic!("expected a ready service");
        };
        let (answer, steps) = assistant.ask_with_trace("Who founded Revnix?");
        assert_eq!(answer, PROCESSING_ERROR_ANSWER);
        assert!(steps.is_empty());
    }

    #[test]
    fn traced_answer_keeps_steps() {
        let ServiceState::Ready(assistant) = ready_with(Box::new(AlwaysFinal)) else {
            panic!("expected a ready service");
        };
        let (answer, steps) = assistant.ask_with_trace("Who founded Revnix?");
        assert_eq!(answer, INSUFFICIENT_INFORMATION);
        assert_eq!(steps.len(), 2);
    }
}
