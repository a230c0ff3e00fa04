use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::gateway::CommandGateway;
use crate::status_notifier::StatusLine;

/// Locally observed recording state. This is a display cache of the
/// backend's authoritative boolean: every toggle attempt re-queries the
/// backend before acting, and failure paths overwrite it with the queried
/// result. It is never advanced on optimism alone.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
}

impl RecordingState {
    fn from_backend(is_recording: bool) -> Self {
        if is_recording {
            Self::Recording
        } else {
            Self::Idle
        }
    }
}

/// Side-effect surface of the controller. Production wires this to the
/// status notifier, Tauri events and the sessions cache; tests record calls.
#[async_trait]
pub trait ToggleDelegate: Send + Sync {
    fn recording_state_changed(&self, state: RecordingState, line: &StatusLine);

    /// Surfaced errors: start failures and the generic top-level failure.
    fn toggle_failed(&self, message: &str);

    async fn refresh_sessions(&self);
}

/// Liveness handle shared with every continuation the controller spawns.
/// After teardown, late gateway results are discarded instead of mutating
/// caches or emitting events.
#[derive(Debug, Clone, Default)]
pub struct ControllerLifetime {
    alive: Arc<AtomicBool>,
}

impl ControllerLifetime {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn shut_down(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

pub struct RecordingToggleController {
    gateway: Arc<dyn CommandGateway>,
    delegate: Arc<dyn ToggleDelegate>,
    lifetime: ControllerLifetime,
    // Serializes toggle sequences; a press while held is rejected, not queued.
    in_flight: tokio::sync::Mutex<()>,
    local_state: Mutex<RecordingState>,
    rejected_presses: AtomicU64,
}

impl RecordingToggleController {
    pub fn new(gateway: Arc<dyn CommandGateway>, delegate: Arc<dyn ToggleDelegate>) -> Self {
        Self {
            gateway,
            delegate,
            lifetime: ControllerLifetime::new(),
            in_flight: tokio::sync::Mutex::new(()),
            local_state: Mutex::new(RecordingState::Idle),
            rejected_presses: AtomicU64::new(0),
        }
    }

    pub fn lifetime(&self) -> ControllerLifetime {
        self.lifetime.clone()
    }

    pub fn local_state(&self) -> RecordingState {
        self.local_state
            .lock()
            .map(|state| *state)
            .unwrap_or(RecordingState::Idle)
    }

    pub fn rejected_presses(&self) -> u64 {
        self.rejected_presses.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.lifetime.shut_down();
    }

    /// Entry point for one hotkey press edge. Never propagates an error:
    /// a failure anywhere in the toggle sequence must not take down the
    /// hotkey subscription.
    pub async fn handle_press(self: &Arc<Self>) {
        if !self.lifetime.is_alive() {
            return;
        }

        let Ok(_guard) = self.in_flight.try_lock() else {
            let rejected = self.rejected_presses.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(rejected_total = rejected, "press ignored: a toggle is already in flight");
            return;
        };

        if let Err(message) = self.toggle().await {
            error!(error = %message, "toggle sequence failed");
            if self.lifetime.is_alive() {
                self.delegate.toggle_failed(&message);
            }
        }
    }

    async fn toggle(self: &Arc<Self>) -> Result<(), String> {
        // The local state is advisory only; the backend decides which way
        // this press toggles.
        let authoritative = self
            .gateway
            .is_recording()
            .await
            .map_err(|error| format!("Unable to query recording status: {error}"))?;

        if !self.lifetime.is_alive() {
            debug!("discarding toggle result after teardown");
            return Ok(());
        }

        if authoritative {
            self.stop_sequence().await;
        } else {
            self.start_sequence().await;
        }

        Ok(())
    }

    async fn start_sequence(self: &Arc<Self>) {
        match self.gateway.start().await {
            Ok(()) => {
                if !self.lifetime.is_alive() {
                    return;
                }
                let line = StatusLine::now("Recording started");
                info!(timestamp = %line.timestamp, "recording started");
                self.set_local_state(RecordingState::Recording, &line);
            }
            Err(start_error) => {
                warn!(error = %start_error, "start failed, resyncing state from backend");
                // Failure does not imply still-idle; only the backend knows.
                let resynced = match self.gateway.is_recording().await {
                    Ok(is_recording) => RecordingState::from_backend(is_recording),
                    Err(resync_error) => {
                        warn!(error = %resync_error, "recording status resync failed, assuming idle");
                        RecordingState::Idle
                    }
                };

                if !self.lifetime.is_alive() {
                    return;
                }

                let line = StatusLine::now("Recording could not be started");
                self.set_local_state(resynced, &line);
                self.delegate
                    .toggle_failed(&format!("Unable to start recording: {start_error}"));
            }
        }
    }

    async fn stop_sequence(self: &Arc<Self>) {
        // Stop and process are absorbed on failure: the user-facing stop
        // always completes, and the sessions cache just stays stale until a
        // later successful run (or manual refresh).
        let stop_result = self.gateway.stop().await;

        if !self.lifetime.is_alive() {
            return;
        }

        match stop_result {
            Ok(audio_ref) => {
                let line = StatusLine::now("Recording stopped");
                info!(timestamp = %line.timestamp, "recording stopped");
                self.set_local_state(RecordingState::Idle, &line);
                self.spawn_process_submission(audio_ref);
            }
            Err(error) => {
                warn!(error = %error, "stop failed; no audio submitted for processing");
                let line = StatusLine::now("Recording stopped (capture discarded)");
                self.set_local_state(RecordingState::Idle, &line);
            }
        }
    }

    fn spawn_process_submission(self: &Arc<Self>, audio_ref: String) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if !controller.lifetime.is_alive() {
                return;
            }

            match controller.gateway.process(&audio_ref).await {
                Ok(()) => {
                    if controller.lifetime.is_alive() {
                        debug!(audio_ref = %audio_ref, "processing submitted, refreshing sessions");
                        controller.delegate.refresh_sessions().await;
                    }
                }
                Err(error) => {
                    warn!(audio_ref = %audio_ref, error = %error, "background processing submission failed");
                }
            }
        });
    }

    fn set_local_state(&self, state: RecordingState, line: &StatusLine) {
        if let Ok(mut local_state) = self.local_state.lock() {
            *local_state = state;
        }
        self.delegate.recording_state_changed(state, line);
    }
}
