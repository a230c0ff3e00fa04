pub mod socket;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::gateway::ProgressEvent;

pub const PROGRESS_HIDE_DELAY_MS: u64 = 2_000;

/// Frontend-facing view of the pipeline progress indicator. The `visible`
/// flag is owned here, not by the backend: it stays up while events arrive
/// and drops a fixed delay after the terminal event.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProgressIndicator {
    pub visible: bool,
    pub stage: String,
    pub message: String,
    pub percent: u8,
}

impl ProgressIndicator {
    fn from_event(event: &ProgressEvent) -> Self {
        Self {
            visible: true,
            stage: event.stage.clone(),
            message: event.message.clone(),
            percent: event.percent,
        }
    }
}

/// Callbacks are invoked while the monitor holds its state lock, so they
/// can never interleave with `shutdown`. They must not call back into the
/// monitor.
pub trait ProgressDelegate: Send + Sync {
    fn progress_changed(&self, indicator: &ProgressIndicator);

    /// Fired exactly once per terminal (`percent == 100`) event.
    fn pipeline_completed(&self);
}

#[derive(Debug, Default)]
struct MonitorState {
    indicator: ProgressIndicator,
    hide_epoch: u64,
    pending_hide: Option<tokio::task::JoinHandle<()>>,
    closed: bool,
}

/// Consumes the `processing:progress` stream: keeps the indicator state,
/// arms/cancels the auto-hide timer and gates the sessions refresh to
/// terminal events only.
pub struct ProgressMonitor {
    state: Mutex<MonitorState>,
    delegate: Arc<dyn ProgressDelegate>,
    hide_delay: Duration,
}

impl ProgressMonitor {
    pub fn new(delegate: Arc<dyn ProgressDelegate>) -> Self {
        Self::with_hide_delay(delegate, Duration::from_millis(PROGRESS_HIDE_DELAY_MS))
    }

    pub fn with_hide_delay(delegate: Arc<dyn ProgressDelegate>, hide_delay: Duration) -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            delegate,
            hide_delay,
        }
    }

    pub fn current(&self) -> ProgressIndicator {
        self.state
            .lock()
            .map(|state| state.indicator.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|state| state.closed).unwrap_or(true)
    }

    /// Must run inside a tokio runtime when the event is terminal (the hide
    /// timer is a spawned task).
    pub fn handle_event(self: &Arc<Self>, event: ProgressEvent) {
        let terminal = event.percent >= 100;
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };

        if state.closed {
            return;
        }

        // A fresh event always preempts a pending hide: the indicator
        // must not disappear while progress is still arriving.
        if let Some(pending) = state.pending_hide.take() {
            pending.abort();
        }
        state.hide_epoch += 1;
        state.indicator = ProgressIndicator::from_event(&event);

        if terminal {
            let epoch = state.hide_epoch;
            let monitor = Arc::clone(self);
            state.pending_hide = Some(tokio::spawn(async move {
                tokio::time::sleep(monitor.hide_delay).await;
                monitor.hide_if_current(epoch);
            }));
        }

        let indicator = state.indicator.clone();
        debug!(
            stage = %indicator.stage,
            percent = indicator.percent,
            terminal,
            "progress event applied"
        );

        // Invoked with the lock held: a concurrent shutdown blocks until
        // this callback returns, and afterwards sees `closed` set.
        self.delegate.progress_changed(&indicator);

        if terminal {
            self.delegate.pipeline_completed();
        }
    }

    fn hide_if_current(&self, epoch: u64) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };

        if state.closed || state.hide_epoch != epoch {
            return;
        }

        state.pending_hide = None;
        state.indicator = ProgressIndicator::default();
        let hidden = state.indicator.clone();

        self.delegate.progress_changed(&hidden);
    }

    /// After shutdown no delegate callback fires again, including from an
    /// already-armed hide timer.
    pub fn shutdown(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                warn!("progress monitor lock poisoned during shutdown");
                poisoned.into_inner()
            }
        };

        state.closed = true;
        if let Some(pending) = state.pending_hide.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    fn event(stage: &str, percent: u8) -> ProgressEvent {
        ProgressEvent {
            stage: stage.to_string(),
            message: format!("{stage} running"),
            percent,
        }
    }

    #[derive(Debug, Default)]
    struct RecordingDelegate {
        indicators: StdMutex<Vec<ProgressIndicator>>,
        completions: StdMutex<u64>,
    }

    impl RecordingDelegate {
        fn indicators(&self) -> Vec<ProgressIndicator> {
            self.indicators.lock().unwrap().clone()
        }

        fn completions(&self) -> u64 {
            *self.completions.lock().unwrap()
        }
    }

    impl ProgressDelegate for RecordingDelegate {
        fn progress_changed(&self, indicator: &ProgressIndicator) {
            self.indicators.lock().unwrap().push(indicator.clone());
        }

        fn pipeline_completed(&self) {
            *self.completions.lock().unwrap() += 1;
        }
    }

    fn monitor_with_delay(
        delegate: &Arc<RecordingDelegate>,
        delay_ms: u64,
    ) -> Arc<ProgressMonitor> {
        Arc::new(ProgressMonitor::with_hide_delay(
            Arc::clone(delegate) as Arc<dyn ProgressDelegate>,
            Duration::from_millis(delay_ms),
        ))
    }

    #[tokio::test]
    async fn intermediate_events_show_progress_without_completing() {
        let delegate = Arc::new(RecordingDelegate::default());
        let monitor = monitor_with_delay(&delegate, 50);

        monitor.handle_event(event("transcription", 40));

        let current = monitor.current();
        assert!(current.visible);
        assert_eq!(current.percent, 40);
        assert_eq!(delegate.completions(), 0);
    }

    #[tokio::test]
    async fn terminal_event_completes_once_and_hides_after_delay() {
        let delegate = Arc::new(RecordingDelegate::default());
        let monitor = monitor_with_delay(&delegate, 40);

        monitor.handle_event(event("transcription", 40));
        monitor.handle_event(event("done", 100));

        assert_eq!(delegate.completions(), 1);
        assert!(monitor.current().visible);

        tokio::time::sleep(Duration::from_millis(120)).await;

        let current = monitor.current();
        assert!(!current.visible);
        assert_eq!(
            delegate.indicators().last().map(|i| i.visible),
            Some(false)
        );
    }

    #[tokio::test]
    async fn fresh_event_during_hide_window_cancels_the_pending_hide() {
        let delegate = Arc::new(RecordingDelegate::default());
        let monitor = monitor_with_delay(&delegate, 60);

        monitor.handle_event(event("done", 100));
        tokio::time::sleep(Duration::from_millis(20)).await;
        // A new run started before the indicator went away.
        monitor.handle_event(event("start", 5));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let current = monitor.current();
        assert!(current.visible);
        assert_eq!(current.percent, 5);
        // The terminal event still completed exactly once.
        assert_eq!(delegate.completions(), 1);
    }

    #[tokio::test]
    async fn each_terminal_event_triggers_its_own_completion() {
        let delegate = Arc::new(RecordingDelegate::default());
        let monitor = monitor_with_delay(&delegate, 10);

        monitor.handle_event(event("done", 100));
        monitor.handle_event(event("done", 100));

        assert_eq!(delegate.completions(), 2);
    }

    #[test]
    fn shutdown_blocks_until_an_in_flight_callback_returns() {
        use std::sync::atomic::{AtomicBool, Ordering};

        #[derive(Debug, Default)]
        struct SlowDelegate {
            shutdown_returned: AtomicBool,
            observed_shutdown_during_callback: StdMutex<Option<bool>>,
        }

        impl ProgressDelegate for SlowDelegate {
            fn progress_changed(&self, _indicator: &ProgressIndicator) {
                std::thread::sleep(Duration::from_millis(80));
                *self.observed_shutdown_during_callback.lock().unwrap() =
                    Some(self.shutdown_returned.load(Ordering::Acquire));
            }

            fn pipeline_completed(&self) {}
        }

        let delegate = Arc::new(SlowDelegate::default());
        let monitor = Arc::new(ProgressMonitor::with_hide_delay(
            Arc::clone(&delegate) as Arc<dyn ProgressDelegate>,
            Duration::from_millis(10),
        ));

        let event_thread = {
            let monitor = Arc::clone(&monitor);
            // Non-terminal event: no hide timer, so no runtime is needed.
            std::thread::spawn(move || monitor.handle_event(event("ner", 40)))
        };
        std::thread::sleep(Duration::from_millis(20));

        monitor.shutdown();
        delegate.shutdown_returned.store(true, Ordering::Release);
        event_thread.join().expect("event thread should finish");

        // The callback must have completed before shutdown could return.
        assert_eq!(
            *delegate.observed_shutdown_during_callback.lock().unwrap(),
            Some(false)
        );
        assert!(monitor.is_closed());
    }

    #[tokio::test]
    async fn no_callback_fires_after_shutdown() {
        let delegate = Arc::new(RecordingDelegate::default());
        let monitor = monitor_with_delay(&delegate, 20);

        monitor.handle_event(event("done", 100));
        let seen_before = delegate.indicators().len();

        monitor.shutdown();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(delegate.indicators().len(), seen_before);
        monitor.handle_event(event("late", 10));
        assert_eq!(delegate.indicators().len(), seen_before);
    }
}
