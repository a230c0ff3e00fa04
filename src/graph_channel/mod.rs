use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gateway::GraphModel;

pub const GRAPH_MESSAGE_KIND: &str = "KNOWLEDGE_GRAPH";

/// Typed envelope pushed to the rendering surface. The surface never writes
/// back; delivery is best-effort and idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMessage {
    pub kind: String,
    pub payload: GraphModel,
}

impl GraphMessage {
    fn wrap(model: GraphModel) -> Self {
        Self {
            kind: GRAPH_MESSAGE_KIND.to_string(),
            payload: model,
        }
    }
}

/// Transport seam toward the rendering surface. Production emits a Tauri
/// event; tests record messages.
pub trait GraphSink: Send + Sync {
    fn push(&self, message: &GraphMessage);
}

/// One-way push channel to the graph rendering surface. Remembers the latest
/// model so a surface that signals ready after a fetch still receives it.
pub struct GraphChannel {
    sink: Arc<dyn GraphSink>,
    latest: Mutex<Option<GraphModel>>,
}

impl GraphChannel {
    pub fn new(sink: Arc<dyn GraphSink>) -> Self {
        Self {
            sink,
            latest: Mutex::new(None),
        }
    }

    /// A fresh model arrived from the backend: cache it and push immediately.
    pub fn model_updated(&self, model: GraphModel) {
        let message = GraphMessage::wrap(model.clone());
        match self.latest.lock() {
            Ok(mut latest) => *latest = Some(model),
            Err(poisoned) => *poisoned.into_inner() = Some(model),
        }
        debug!("pushing knowledge graph model to rendering surface");
        self.sink.push(&message);
    }

    /// The surface (re)announced readiness. Replays the cached model if one
    /// exists; a surface that is ready before any fetch gets nothing and
    /// waits for the next update.
    pub fn surface_ready(&self) {
        let cached = match self.latest.lock() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match cached {
            Some(model) => {
                debug!("graph surface ready, replaying cached model");
                self.sink.push(&GraphMessage::wrap(model));
            }
            None => {
                debug!("graph surface ready before any model was fetched");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::gateway::{GraphEdge, GraphMeta, GraphNode};

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingSink {
        messages: Mutex<Vec<GraphMessage>>,
    }

    impl GraphSink for RecordingSink {
        fn push(&self, message: &GraphMessage) {
            self.messages.lock().unwrap().push(message.clone());
        }
    }

    fn model(generated_at: &str) -> GraphModel {
        GraphModel {
            meta: GraphMeta {
                generated_at: generated_at.to_string(),
            },
            nodes: vec![GraphNode {
                id: "person:alice".to_string(),
                label: "Alice".to_string(),
                node_type: "person".to_string(),
            }],
            edges: vec![GraphEdge {
                from: "person:alice".to_string(),
                to: "org:initech".to_string(),
                predicate: "works_at".to_string(),
                confidence: 1.0,
            }],
        }
    }

    fn channel() -> (GraphChannel, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let channel = GraphChannel::new(Arc::clone(&sink) as Arc<dyn GraphSink>);
        (channel, sink)
    }

    #[test]
    fn model_update_pushes_immediately() {
        let (channel, sink) = channel();

        channel.model_updated(model("2026-08-29T12:00:00Z"));

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, GRAPH_MESSAGE_KIND);
        assert_eq!(messages[0].payload.nodes[0].label, "Alice");
    }

    #[test]
    fn ready_before_any_model_pushes_nothing() {
        let (channel, sink) = channel();

        channel.surface_ready();

        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn ready_after_update_replays_the_cached_model() {
        let (channel, sink) = channel();

        channel.model_updated(model("2026-08-29T12:00:00Z"));
        channel.surface_ready();

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1].payload.meta.generated_at,
            "2026-08-29T12:00:00Z"
        );
    }

    #[test]
    fn later_update_replaces_the_replayed_model() {
        let (channel, sink) = channel();

        channel.model_updated(model("2026-08-29T12:00:00Z"));
        channel.model_updated(model("2026-08-29T13:00:00Z"));
        channel.surface_ready();

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[2].payload.meta.generated_at,
            "2026-08-29T13:00:00Z"
        );
    }
}
