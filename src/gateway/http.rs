use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::{
    CommandGateway, GatewayError, GatewayResult, GraphModel, KnowledgeOverview, ProgressEvent,
    Session, TodoItem,
};

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:4477";
const DEFAULT_PROGRESS_PATH: &str = "/events/progress";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub progress_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            progress_url: derive_progress_url(DEFAULT_BACKEND_URL),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(base_url) = read_non_empty_env("LUCIDA_BACKEND_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
            config.progress_url = derive_progress_url(&config.base_url);
        }

        if let Some(progress_url) = read_non_empty_env("LUCIDA_PROGRESS_URL") {
            config.progress_url = progress_url;
        }

        if let Some(timeout_secs) = read_u64_env("LUCIDA_BACKEND_TIMEOUT_SECS") {
            config.request_timeout_secs = timeout_secs.max(1);
        }

        debug!(
            base_url = %config.base_url,
            progress_url = %config.progress_url,
            request_timeout_secs = config.request_timeout_secs,
            "loaded backend gateway config"
        );
        config
    }
}

fn derive_progress_url(base_url: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };

    format!("{}{DEFAULT_PROGRESS_PATH}", ws_base.trim_end_matches('/'))
}

/// JSON client for the local processing daemon.
///
/// Toggle operations are deliberately never retried here: replaying a
/// `start` or `stop` after an ambiguous transport failure can double-toggle
/// the recorder. The controller re-queries `is_recording` instead.
#[derive(Debug, Clone)]
pub struct HttpCommandGateway {
    client: Client,
    config: BackendConfig,
}

impl HttpCommandGateway {
    pub fn new(config: BackendConfig) -> Self {
        info!(
            base_url = %config.base_url,
            request_timeout_secs = config.request_timeout_secs,
            "backend gateway initialized"
        );
        Self {
            client: build_client(&config),
            config,
        }
    }

    pub fn progress_url(&self) -> &str {
        &self.config.progress_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_empty(&self, path: &str) -> GatewayResult<()> {
        let response = self
            .client
            .post(self.endpoint(path))
            .send()
            .await
            .map_err(map_transport_error)?;

        expect_success(response).await.map(|_| ())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = expect_success(response).await?;

        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RecorderStatusResponse {
    is_recording: bool,
}

#[derive(Debug, Deserialize)]
struct StopRecordingResponse {
    audio_ref: String,
}

#[async_trait]
impl CommandGateway for HttpCommandGateway {
    async fn start(&self) -> GatewayResult<()> {
        debug!("requesting recorder start");
        self.post_empty("/recorder/start").await
    }

    async fn stop(&self) -> GatewayResult<String> {
        debug!("requesting recorder stop");
        let response = self
            .client
            .post(self.endpoint("/recorder/stop"))
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = expect_success(response).await?;

        let payload = response
            .json::<StopRecordingResponse>()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        if payload.audio_ref.trim().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "stop returned an empty audio reference".to_string(),
            ));
        }

        Ok(payload.audio_ref)
    }

    async fn is_recording(&self) -> GatewayResult<bool> {
        let status: RecorderStatusResponse = self.get_json("/recorder/status").await?;
        Ok(status.is_recording)
    }

    async fn process(&self, audio_ref: &str) -> GatewayResult<()> {
        info!(audio_ref = %audio_ref, "submitting recording for processing");
        let response = self
            .client
            .post(self.endpoint("/process"))
            .json(&serde_json::json!({ "audio_ref": audio_ref }))
            .send()
            .await
            .map_err(map_transport_error)?;

        expect_success(response).await.map(|_| ())
    }

    async fn list_sessions(&self) -> GatewayResult<Vec<Session>> {
        self.get_json("/sessions").await
    }

    async fn list_todos(&self) -> GatewayResult<Vec<TodoItem>> {
        self.get_json("/todos").await
    }

    async fn confirm_todo(&self, todo_id: &str) -> GatewayResult<()> {
        info!(todo_id = %todo_id, "confirming todo");
        self.post_empty(&format!("/todos/{todo_id}/confirm")).await
    }

    async fn ignore_todo(&self, todo_id: &str) -> GatewayResult<()> {
        info!(todo_id = %todo_id, "ignoring todo");
        self.post_empty(&format!("/todos/{todo_id}/ignore")).await
    }

    async fn get_knowledge_overview(&self) -> GatewayResult<KnowledgeOverview> {
        self.get_json("/knowledge/overview").await
    }

    async fn get_knowledge_graph(&self) -> GatewayResult<GraphModel> {
        self.get_json("/knowledge/graph").await
    }
}

pub fn parse_progress_event(raw_payload: &str) -> Option<ProgressEvent> {
    match serde_json::from_str::<ProgressEvent>(raw_payload) {
        Ok(event) => Some(event),
        Err(err) => {
            error!(error = %err, "discarding malformed progress event payload");
            None
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() || error.is_connect() {
        GatewayError::Network(error.to_string())
    } else {
        GatewayError::Backend(error.to_string())
    }
}

async fn expect_success(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let response_body = response.text().await.unwrap_or_default();
    let fallback_message = format!("backend request failed with status {}", status.as_u16());
    let message = parse_backend_error_message(&response_body).unwrap_or(fallback_message);
    debug!(status = status.as_u16(), "mapped backend HTTP error response");

    if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        Err(GatewayError::Network(message))
    } else {
        Err(GatewayError::Backend(message))
    }
}

#[derive(Debug, Deserialize)]
struct BackendErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_backend_error_message(raw_body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<BackendErrorEnvelope>(raw_body).ok()?;
    normalize_optional_string(parsed.error).or_else(|| normalize_optional_string(parsed.message))
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.and_then(|content| {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn read_non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<u64>().ok())
}

fn build_client(config: &BackendConfig) -> Client {
    let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("backend client construction should succeed")
}
