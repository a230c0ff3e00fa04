use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::gateway::http::parse_progress_event;

use super::ProgressMonitor;

const RECONNECT_DELAY_MS: u64 = 1_000;

/// Maintains the single persistent subscription to the backend's
/// `processing:progress` channel for as long as the monitor is alive,
/// reconnecting with a fixed delay after connection loss.
pub async fn run_progress_subscriber(progress_url: String, monitor: Arc<ProgressMonitor>) {
    loop {
        if monitor.is_closed() {
            return;
        }

        match run_subscription(&progress_url, &monitor).await {
            Ok(()) => debug!("progress subscription closed by backend"),
            Err(error) => warn!(error = %error, "progress subscription failed"),
        }

        if monitor.is_closed() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
    }
}

async fn run_subscription(progress_url: &str, monitor: &Arc<ProgressMonitor>) -> Result<(), String> {
    let (ws_stream, _response) = connect_async(progress_url)
        .await
        .map_err(|error| error.to_string())?;
    info!(url = %progress_url, "progress subscription established");

    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    while let Some(message) = ws_reader.next().await {
        if monitor.is_closed() {
            let _ = ws_writer.send(Message::Close(None)).await;
            return Ok(());
        }

        match message.map_err(|error| error.to_string())? {
            Message::Text(text) => {
                if let Some(event) = parse_progress_event(text.as_str()) {
                    monitor.handle_event(event);
                }
            }
            Message::Ping(payload) => {
                let _ = ws_writer.send(Message::Pong(payload)).await;
            }
            Message::Close(frame) => {
                debug!(?frame, "progress channel closed");
                return Ok(());
            }
            Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    Ok(())
}
