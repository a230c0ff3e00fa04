use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gateway::{CommandGateway, GraphModel, KnowledgeOverview, Session, TodoItem};
use crate::graph_channel::GraphChannel;
use crate::toggle_controller::ControllerLifetime;

/// Notification surface for cache replacements. Production emits Tauri
/// events so views re-render; tests record calls.
pub trait CacheEvents: Send + Sync {
    fn sessions_updated(&self, sessions: &[Session]);
    fn todos_updated(&self, todos: &[TodoItem]);
    fn knowledge_updated(&self, overview: &KnowledgeOverview);
}

#[derive(Debug, Default)]
struct CacheStore {
    sessions: RwLock<Vec<Session>>,
    todos: RwLock<Vec<TodoItem>>,
    knowledge: RwLock<Option<KnowledgeOverview>>,
    graph: RwLock<Option<GraphModel>>,
}

/// Owns the four read caches and their refresh policies. Each cache is
/// populated only from gateway responses; a failed fetch keeps the previous
/// value and is logged, never surfaced. After `shutdown`, a gateway response
/// that is still in flight is discarded instead of touching a cache or
/// emitting an event.
pub struct CacheCoordinator {
    gateway: Arc<dyn CommandGateway>,
    events: Arc<dyn CacheEvents>,
    graph_channel: Arc<GraphChannel>,
    store: CacheStore,
    todos_loaded: AtomicBool,
    lifetime: ControllerLifetime,
}

impl CacheCoordinator {
    pub fn new(
        gateway: Arc<dyn CommandGateway>,
        events: Arc<dyn CacheEvents>,
        graph_channel: Arc<GraphChannel>,
    ) -> Self {
        Self {
            gateway,
            events,
            graph_channel,
            store: CacheStore::default(),
            todos_loaded: AtomicBool::new(false),
            lifetime: ControllerLifetime::new(),
        }
    }

    pub fn shutdown(&self) {
        self.lifetime.shut_down();
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.store.sessions.read().await.clone()
    }

    pub async fn todos(&self) -> Vec<TodoItem> {
        self.store.todos.read().await.clone()
    }

    pub async fn knowledge(&self) -> Option<KnowledgeOverview> {
        self.store.knowledge.read().await.clone()
    }

    pub async fn graph(&self) -> Option<GraphModel> {
        self.store.graph.read().await.clone()
    }

    /// Eager startup warm-up: sessions and todos. Does not mark the todos
    /// view as loaded; its first activation still refetches.
    pub async fn warm_up(&self) {
        self.refresh_sessions().await;
        self.refresh_todos().await;
    }

    pub async fn refresh_sessions(&self) {
        let fetched = self.gateway.list_sessions().await;
        if !self.lifetime.is_alive() {
            debug!("discarding sessions fetch result after shutdown");
            return;
        }

        match fetched {
            Ok(sessions) => {
                debug!(count = sessions.len(), "sessions cache replaced");
                *self.store.sessions.write().await = sessions.clone();
                self.events.sessions_updated(&sessions);
            }
            Err(error) => {
                warn!(error = %error, "sessions refresh failed, keeping cached value");
            }
        }
    }

    /// Returns whether the list was actually replaced.
    pub async fn refresh_todos(&self) -> bool {
        let fetched = self.gateway.list_todos().await;
        if !self.lifetime.is_alive() {
            debug!("discarding todos fetch result after shutdown");
            return false;
        }

        match fetched {
            Ok(todos) => {
                debug!(count = todos.len(), "todos cache replaced");
                *self.store.todos.write().await = todos.clone();
                self.events.todos_updated(&todos);
                true
            }
            Err(error) => {
                warn!(error = %error, "todos refresh failed, keeping cached value");
                false
            }
        }
    }

    /// First successful activation fetches; later activations reuse the
    /// cache. A failed first fetch leaves the flag clear so the next
    /// activation retries.
    pub async fn activate_todos_view(&self) {
        if self.todos_loaded.swap(true, Ordering::AcqRel) {
            debug!("todos view re-activated, cache already loaded");
            return;
        }
        if !self.refresh_todos().await {
            self.todos_loaded.store(false, Ordering::Release);
        }
    }

    /// Considered possibly stale on every activation: always refetched.
    pub async fn activate_knowledge_view(&self) {
        let fetched = self.gateway.get_knowledge_overview().await;
        if !self.lifetime.is_alive() {
            debug!("discarding knowledge overview fetch result after shutdown");
            return;
        }

        match fetched {
            Ok(overview) => {
                *self.store.knowledge.write().await = Some(overview.clone());
                self.events.knowledge_updated(&overview);
            }
            Err(error) => {
                warn!(error = %error, "knowledge overview refresh failed, keeping cached value");
            }
        }
    }

    /// Fetches the graph model and pushes it into the rendering surface.
    pub async fn activate_graph_view(&self) {
        let fetched = self.gateway.get_knowledge_graph().await;
        if !self.lifetime.is_alive() {
            debug!("discarding knowledge graph fetch result after shutdown");
            return;
        }

        match fetched {
            Ok(model) => {
                *self.store.graph.write().await = Some(model.clone());
                self.graph_channel.model_updated(model);
            }
            Err(error) => {
                warn!(error = %error, "knowledge graph refresh failed, keeping cached value");
            }
        }
    }

    /// Confirms a to-do, then refetches the whole list. The cache is never
    /// patched optimistically; the visible list is whatever the backend
    /// reports after the mutation.
    pub async fn confirm_todo(&self, todo_id: &str) -> Result<(), String> {
        let result = self
            .gateway
            .confirm_todo(todo_id)
            .await
            .map_err(|error| error.to_string());

        if !self.lifetime.is_alive() {
            return result;
        }
        if result.is_ok() {
            info!(todo_id = %todo_id, "todo confirmed");
        }
        self.refresh_todos().await;
        result
    }

    pub async fn ignore_todo(&self, todo_id: &str) -> Result<(), String> {
        let result = self
            .gateway
            .ignore_todo(todo_id)
            .await
            .map_err(|error| error.to_string());

        if !self.lifetime.is_alive() {
            return result;
        }
        if result.is_ok() {
            info!(todo_id = %todo_id, "todo ignored");
        }
        self.refresh_todos().await;
        result
    }
}
