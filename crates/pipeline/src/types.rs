//! Core types for the routing pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object used for facts, records and filter mappings.
pub type JsonMap = Map<String, Value>;

/// Running conversation state, owned by the caller and threaded through every turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationContext {
    /// Raw questions, oldest first
    pub history: Vec<String>,

    /// Distinct keywords in first-seen order
    pub keywords: Vec<String>,

    /// Personal details extracted from earlier turns
    pub facts: JsonMap,

    /// Most recent raw question
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_question: Option<String>,
}

/// An enabled structured collection and the fields it may expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescriptor {
    pub name: String,
    pub exposed_fields: Vec<String>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, exposed_fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            exposed_fields,
        }
    }

    pub fn exposes(&self, field: &str) -> bool {
        self.exposed_fields.iter().any(|f| f == field)
    }
}

/// Which knowledge source answers the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Faq,
    Realtime,
}

/// Shape of a structured query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    List,
    Count,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Count => "count",
        }
    }
}

/// A validated query plan. Only plans produced by the planner reach retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Filter tree in the store's `$operator` grammar
    pub filters: Value,
    /// Sort keys as `field:asc` / `field:desc`
    pub sort: Vec<String>,
    pub operation: Operation,
}

impl QueryPlan {
    /// The plan every failure path falls back to.
    pub fn faq() -> Self {
        Self {
            intent: Intent::Faq,
            collection: None,
            filters: Value::Object(JsonMap::new()),
            sort: Vec::new(),
            operation: Operation::List,
        }
    }

    pub fn is_realtime(&self) -> bool {
        self.intent == Intent::Realtime
    }
}

/// Output of the structured retriever.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RetrievalResult {
    Count {
        collection: String,
        value: u64,
    },
    List {
        collection: String,
        schema: Vec<String>,
        items: Vec<JsonMap>,
    },
    None,
}

impl RetrievalResult {
    /// Result kind as named in the synthesis contract.
    pub fn kind(&self) -> &'static str {
        match self {
            RetrievalResult::Count { .. } => "count",
            RetrievalResult::List { .. } => "list",
            RetrievalResult::None => "none",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RetrievalResult::None)
    }
}

/// One semantic FAQ hit. Lower distance is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqMatch {
    pub answer: String,
    pub distance: f32,
}

/// One prior chat turn supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Incoming question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AskRequest {
    pub question: String,
    pub history: Vec<ChatTurn>,
    pub context: ConversationContext,
    /// Ask for the streamed FAQ answer
    pub stream: bool,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }
}

/// Batched answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AskResponse {
    #[serde(rename = "text")]
    Text { content: String },

    #[serde(rename = "text+collection")]
    TextCollection {
        content: String,
        title: String,
        schema: Vec<String>,
        items: Vec<JsonMap>,
    },
}

impl AskResponse {
    pub fn text(content: impl Into<String>) -> Self {
        AskResponse::Text {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            AskResponse::Text { content } => content,
            AskResponse::TextCollection { content, .. } => content,
        }
    }
}

/// One event on a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Token { value: String },
    Done,
}
