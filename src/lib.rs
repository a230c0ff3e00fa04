#![allow(dead_code)]

mod data_cache;
mod gateway;
mod graph_channel;
mod hotkey_service;
mod logging;
mod progress_stream;
mod status_notifier;
mod toggle_controller;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use data_cache::{CacheCoordinator, CacheEvents};
use gateway::http::{BackendConfig, HttpCommandGateway};
use gateway::{CommandGateway, GraphModel, KnowledgeOverview, Session, TodoItem};
use graph_channel::{GraphChannel, GraphMessage, GraphSink};
use hotkey_service::{HotkeyBinding, DEFAULT_SHORTCUT};
use progress_stream::{ProgressDelegate, ProgressIndicator, ProgressMonitor};
use serde::Serialize;
use status_notifier::{AppStatus, StatusLine, StatusNotifier};
use tauri::{AppHandle, Emitter, Manager};
use toggle_controller::{RecordingState, RecordingToggleController, ToggleDelegate};
use tracing::{error, info};

const EVENT_STATUS_CHANGED: &str = "lucida://status-changed";
const EVENT_RECORDING_STATE_CHANGED: &str = "lucida://recording-state-changed";
const EVENT_SESSIONS_UPDATED: &str = "lucida://sessions-updated";
const EVENT_TODOS_UPDATED: &str = "lucida://todos-updated";
const EVENT_KNOWLEDGE_UPDATED: &str = "lucida://knowledge-updated";
const EVENT_PROGRESS_UPDATED: &str = "lucida://progress-updated";
const EVENT_KNOWLEDGE_GRAPH: &str = "lucida://knowledge-graph";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusSnapshot {
    status: AppStatus,
    line: Option<StatusLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordingStateChangedEvent {
    state: RecordingState,
    line: StatusLine,
}

/// Everything the command handlers and the teardown path need, managed as
/// one Tauri state object after setup has wired the services together.
struct ControllerState {
    controller: Arc<RecordingToggleController>,
    caches: Arc<CacheCoordinator>,
    graph_channel: Arc<GraphChannel>,
    progress_monitor: Arc<ProgressMonitor>,
    hotkey: HotkeyBinding,
    status: Arc<Mutex<StatusNotifier>>,
    progress_task: Mutex<Option<tauri::async_runtime::JoinHandle<()>>>,
}

fn status_snapshot(status: &Arc<Mutex<StatusNotifier>>) -> StatusSnapshot {
    match status.lock() {
        Ok(notifier) => StatusSnapshot {
            status: notifier.current(),
            line: notifier.last_line().cloned(),
        },
        Err(_) => StatusSnapshot {
            status: AppStatus::Error,
            line: None,
        },
    }
}

fn set_status(
    app: &AppHandle,
    status_notifier: &Arc<Mutex<StatusNotifier>>,
    status: AppStatus,
    line: Option<StatusLine>,
) {
    if let Ok(mut notifier) = status_notifier.lock() {
        match line {
            Some(line) => notifier.set_with_line(status, line),
            None => notifier.set(status),
        }
    }

    let _ = app.emit(EVENT_STATUS_CHANGED, status_snapshot(status_notifier));
}

/// Bridges controller outcomes to the status notifier, the frontend event
/// surface and the sessions cache.
struct AppToggleDelegate {
    app: AppHandle,
    status: Arc<Mutex<StatusNotifier>>,
    caches: Arc<CacheCoordinator>,
}

#[async_trait]
impl ToggleDelegate for AppToggleDelegate {
    fn recording_state_changed(&self, state: RecordingState, line: &StatusLine) {
        let status = match state {
            RecordingState::Recording => AppStatus::Recording,
            RecordingState::Idle => AppStatus::Idle,
        };
        set_status(&self.app, &self.status, status, Some(line.clone()));
        let _ = self.app.emit(
            EVENT_RECORDING_STATE_CHANGED,
            RecordingStateChangedEvent {
                state,
                line: line.clone(),
            },
        );
    }

    fn toggle_failed(&self, message: &str) {
        set_status(
            &self.app,
            &self.status,
            AppStatus::Error,
            Some(StatusLine::now(message)),
        );
    }

    async fn refresh_sessions(&self) {
        self.caches.refresh_sessions().await;
    }
}

struct AppCacheEvents {
    app: AppHandle,
}

impl CacheEvents for AppCacheEvents {
    fn sessions_updated(&self, sessions: &[Session]) {
        let _ = self.app.emit(EVENT_SESSIONS_UPDATED, sessions);
    }

    fn todos_updated(&self, todos: &[TodoItem]) {
        let _ = self.app.emit(EVENT_TODOS_UPDATED, todos);
    }

    fn knowledge_updated(&self, overview: &KnowledgeOverview) {
        let _ = self.app.emit(EVENT_KNOWLEDGE_UPDATED, overview);
    }
}

struct AppGraphSink {
    app: AppHandle,
}

impl GraphSink for AppGraphSink {
    fn push(&self, message: &GraphMessage) {
        let _ = self.app.emit(EVENT_KNOWLEDGE_GRAPH, message);
    }
}

/// Bridges progress events to the frontend indicator, the Processing status
/// and the terminal-event sessions refresh.
struct AppProgressDelegate {
    app: AppHandle,
    status: Arc<Mutex<StatusNotifier>>,
    caches: Arc<CacheCoordinator>,
}

impl ProgressDelegate for AppProgressDelegate {
    fn progress_changed(&self, indicator: &ProgressIndicator) {
        let _ = self.app.emit(EVENT_PROGRESS_UPDATED, indicator);

        if indicator.visible {
            let current = self
                .status
                .lock()
                .map(|notifier| notifier.current())
                .unwrap_or(AppStatus::Error);
            // Recording outranks Processing in the status display.
            if current != AppStatus::Recording {
                set_status(&self.app, &self.status, AppStatus::Processing, None);
            }
        } else {
            let current = self
                .status
                .lock()
                .map(|notifier| notifier.current())
                .unwrap_or(AppStatus::Error);
            if current == AppStatus::Processing {
                set_status(&self.app, &self.status, AppStatus::Idle, None);
            }
        }
    }

    fn pipeline_completed(&self) {
        let caches = Arc::clone(&self.caches);
        tauri::async_runtime::spawn(async move {
            caches.refresh_sessions().await;
        });
    }
}

#[tauri::command]
fn get_app_status(state: tauri::State<'_, ControllerState>) -> StatusSnapshot {
    status_snapshot(&state.status)
}

#[tauri::command]
fn get_recording_state(state: tauri::State<'_, ControllerState>) -> RecordingState {
    state.controller.local_state()
}

#[tauri::command]
async fn get_sessions(
    state: tauri::State<'_, ControllerState>,
) -> Result<Vec<Session>, String> {
    Ok(state.caches.sessions().await)
}

#[tauri::command]
async fn get_todos(state: tauri::State<'_, ControllerState>) -> Result<Vec<TodoItem>, String> {
    Ok(state.caches.todos().await)
}

#[tauri::command]
fn get_progress(state: tauri::State<'_, ControllerState>) -> ProgressIndicator {
    state.progress_monitor.current()
}

#[tauri::command]
async fn get_knowledge(
    state: tauri::State<'_, ControllerState>,
) -> Result<Option<KnowledgeOverview>, String> {
    Ok(state.caches.knowledge().await)
}

#[tauri::command]
async fn get_graph(
    state: tauri::State<'_, ControllerState>,
) -> Result<Option<GraphModel>, String> {
    Ok(state.caches.graph().await)
}

#[tauri::command]
async fn activate_todos_view(state: tauri::State<'_, ControllerState>) -> Result<(), String> {
    state.caches.activate_todos_view().await;
    Ok(())
}

#[tauri::command]
async fn activate_knowledge_view(
    state: tauri::State<'_, ControllerState>,
) -> Result<(), String> {
    state.caches.activate_knowledge_view().await;
    Ok(())
}

#[tauri::command]
async fn activate_graph_view(state: tauri::State<'_, ControllerState>) -> Result<(), String> {
    state.caches.activate_graph_view().await;
    Ok(())
}

#[tauri::command]
async fn confirm_todo(
    state: tauri::State<'_, ControllerState>,
    todo_id: String,
) -> Result<(), String> {
    state.caches.confirm_todo(&todo_id).await
}

#[tauri::command]
async fn ignore_todo(
    state: tauri::State<'_, ControllerState>,
    todo_id: String,
) -> Result<(), String> {
    state.caches.ignore_todo(&todo_id).await
}

#[tauri::command]
fn graph_surface_ready(state: tauri::State<'_, ControllerState>) {
    state.graph_channel.surface_ready();
}

fn build_controller_state(app: &AppHandle) -> ControllerState {
    let config = BackendConfig::from_env();
    let http_gateway = HttpCommandGateway::new(config);
    let progress_url = http_gateway.progress_url().to_string();
    let gateway: Arc<dyn CommandGateway> = Arc::new(http_gateway);

    let status = Arc::new(Mutex::new(StatusNotifier::new()));

    let graph_channel = Arc::new(GraphChannel::new(Arc::new(AppGraphSink {
        app: app.clone(),
    })));

    let caches = Arc::new(CacheCoordinator::new(
        Arc::clone(&gateway),
        Arc::new(AppCacheEvents { app: app.clone() }),
        Arc::clone(&graph_channel),
    ));

    let controller = Arc::new(RecordingToggleController::new(
        Arc::clone(&gateway),
        Arc::new(AppToggleDelegate {
            app: app.clone(),
            status: Arc::clone(&status),
            caches: Arc::clone(&caches),
        }),
    ));

    let progress_monitor = Arc::new(ProgressMonitor::new(Arc::new(AppProgressDelegate {
        app: app.clone(),
        status: Arc::clone(&status),
        caches: Arc::clone(&caches),
    })));

    let progress_task = tauri::async_runtime::spawn(progress_stream::socket::run_progress_subscriber(
        progress_url,
        Arc::clone(&progress_monitor),
    ));

    ControllerState {
        controller,
        caches,
        graph_channel,
        progress_monitor,
        hotkey: HotkeyBinding::new(),
        status,
        progress_task: Mutex::new(Some(progress_task)),
    }
}

fn bind_toggle_hotkey(app: &AppHandle) {
    let state = app.state::<ControllerState>();
    let press_app = app.clone();

    let bound = state.hotkey.bind(app, DEFAULT_SHORTCUT, move || {
        let controller = Arc::clone(&press_app.state::<ControllerState>().controller);
        tauri::async_runtime::spawn(async move {
            controller.handle_press().await;
        });
    });

    // A dead hotkey degrades the app to its window UI; it must not abort
    // startup.
    if let Err(bind_error) = bound {
        error!(shortcut = DEFAULT_SHORTCUT, error = %bind_error, "global shortcut registration failed");
        set_status(
            app,
            &state.status,
            AppStatus::Error,
            Some(StatusLine::now("Recording shortcut unavailable")),
        );
    }
}

fn shut_down(app: &AppHandle) {
    let state = app.state::<ControllerState>();
    info!("shutting down recording controller");

    state.hotkey.unbind(app);
    state.controller.shutdown();
    state.progress_monitor.shutdown();
    state.caches.shutdown();

    if let Ok(mut task) = state.progress_task.lock() {
        if let Some(task) = task.take() {
            task.abort();
        }
    };
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            app.handle()
                .plugin(tauri_plugin_global_shortcut::Builder::new().build())?;

            if let Err(log_error) = logging::initialize(app.handle()) {
                eprintln!("Failed to initialize diagnostics logging: {log_error}");
            }

            app.manage(build_controller_state(app.handle()));

            bind_toggle_hotkey(app.handle());
            set_status(
                app.handle(),
                &app.state::<ControllerState>().status,
                AppStatus::Idle,
                None,
            );

            let caches = Arc::clone(&app.state::<ControllerState>().caches);
            tauri::async_runtime::spawn(async move {
                caches.warm_up().await;
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_app_status,
            get_recording_state,
            get_sessions,
            get_todos,
            get_progress,
            get_knowledge,
            get_graph,
            activate_todos_view,
            activate_knowledge_view,
            activate_graph_view,
            confirm_todo,
            ignore_todo,
            graph_surface_ready
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let tauri::RunEvent::Exit = event {
                shut_down(app);
            }
        });
}
