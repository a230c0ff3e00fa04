pub mod http;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One extracted `(type, value)` pair attached to a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    pub entity_type: String,
    pub value: String,
}

/// A completed recording: transcript text plus the entities the pipeline
/// extracted from it. Produced by the backend, never mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub date: String,
    pub title: String,
    pub raw: String,
    pub entities: Vec<SessionEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TodoItem {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub date: String,
    pub title: String,
    pub target_type: String,
    pub target_id: String,
    pub confidence: f32,
    #[serde(default)]
    pub source_document: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeRelation {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f32,
}

/// Summarized projection of the extracted-knowledge store. Fully replaced
/// on each refresh; never merged incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeOverview {
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub events: Vec<String>,
    pub relations: Vec<KnowledgeRelation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphMeta {
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub predicate: String,
    pub confidence: f32,
}

/// Node/edge projection of the same knowledge store, fully replaced on each
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphModel {
    pub meta: GraphMeta,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Payload of the backend's `processing:progress` channel. The terminal
/// event of a pipeline run carries `percent == 100`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: String,
    pub message: String,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    Network(String),
    Backend(String),
    InvalidResponse(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(message) => write!(f, "Network error: {message}"),
            Self::Backend(message) => write!(f, "Backend error: {message}"),
            Self::InvalidResponse(message) => write!(f, "Invalid backend response: {message}"),
        }
    }
}

impl std::error::Error for GatewayError {}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request/response surface of the backend. The controller treats every
/// response as authoritative; local state is only ever a cache of what this
/// interface last reported.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    async fn start(&self) -> GatewayResult<()>;

    /// Stops the active recording and returns a reference to the captured
    /// audio (an opaque path/handle string usable with [`Self::process`]).
    async fn stop(&self) -> GatewayResult<String>;

    /// Ground-truth recording state.
    async fn is_recording(&self) -> GatewayResult<bool>;

    /// Submits captured audio to the extraction pipeline. Completion is
    /// signalled out-of-band through `processing:progress` events.
    async fn process(&self, audio_ref: &str) -> GatewayResult<()>;

    async fn list_sessions(&self) -> GatewayResult<Vec<Session>>;

    async fn list_todos(&self) -> GatewayResult<Vec<TodoItem>>;

    async fn confirm_todo(&self, todo_id: &str) -> GatewayResult<()>;

    async fn ignore_todo(&self, todo_id: &str) -> GatewayResult<()>;

    async fn get_knowledge_overview(&self) -> GatewayResult<KnowledgeOverview>;

    async fn get_knowledge_graph(&self) -> GatewayResult<GraphModel>;
}
