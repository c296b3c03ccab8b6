#![warn(missing_docs)]
//! Single-site crawler and retrieval-first question answering.
//!
//! Offline: [`Crawler`] walks one site breadth-first and appends each unique page to a
//! flat corpus file. At startup: the corpus is chunked, embedded and loaded into an
//! [`IndexStore`]. Per question: an [`Agent`] consults the index first and a domain-scoped
//! web search only when the index has nothing.

pub mod agent;
pub mod assistant;
pub mod canonical;
pub mod chunker;
pub mod controls;
pub mod corpus;
pub mod crawler;
pub mod embedder;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod llm;
pub mod telemetry;
pub mod tools;

pub use agent::{Agent, AgentConfig, AgentRun, StopReason, TraceStep, INSUFFICIENT_INFORMATION};
pub use assistant::{ask, ask_with_trace, Assistant, AssistantArgs, AskError, ConfigError, InitError, ServiceState};
pub use chunker::{Chunk, Chunker};
pub use controls::{CrawlArgs, CrawlControls};
pub use corpus::{CorpusDocument, CorpusWriter, PageRecord};
pub use crawler::{CrawlReport, CrawlState, Crawler, SkipReason, StepOutcome};
pub use extract::ContentExtractor;
pub use fetch::{FetchError, FetchedPage, HttpFetcher, PageFetcher, StaticFetcher};
pub use index::{IndexError, IndexStore, IngestReport, Metric, VectorIndex};
pub use tools::{Source, Tool, ToolKind, ToolOutput};
