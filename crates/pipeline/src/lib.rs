//! Question routing pipeline.
//!
//! Routes a natural-language question to a semantic FAQ index or to a
//! structured data store and synthesizes the answer, batched or streamed,
//! while accumulating conversation context across turns.
//!
//! Collaborators are injected as trait objects:
//! - [`ReasoningService`]: every model call (rewrite, plan, summarize, synthesize, embed, stream)
//! - [`CollectionRegistry`]: enabled collections and their exposed fields
//! - [`StructuredStore`]: count and list queries over records
//! - [`SemanticIndex`]: nearest-neighbor FAQ lookup

pub mod aggregate;
pub mod ask;
pub mod config;
pub mod context;
pub mod dataset;
pub mod deadline;
pub mod faq;
pub mod filter;
pub mod memory;
pub mod planner;
pub mod reasoning;
pub mod registry;
pub mod rewrite;
pub mod semantic;
pub mod stream;
pub mod structured;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use aggregate::{GENERIC_ERROR_ANSWER, UNAVAILABLE_ANSWER};
pub use ask::{AskOutcome, Pipeline, Reply};
pub use config::PipelineConfig;
pub use context::{accumulate, merge_facts};
pub use dataset::Dataset;
pub use faq::{EmbeddingWorker, FaqCommitted, FaqEntry, FaqStore};
pub use filter::sanitize;
pub use memory::MemoryStore;
pub use reasoning::{LlmReasoner, ReasoningService};
pub use registry::{CachedRegistry, CollectionRegistry, StaticRegistry};
pub use semantic::{MemoryIndex, SemanticIndex};
pub use stream::StreamChannel;
pub use structured::StructuredStore;
pub use types::{
    AskRequest, AskResponse, ChatTurn, CollectionDescriptor, ConversationContext, FaqMatch,
    Intent, Operation, QueryPlan, RetrievalResult, StreamEvent,
};
