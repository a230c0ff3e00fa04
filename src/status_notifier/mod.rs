use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Idle,
    Recording,
    Processing,
    Error,
}

impl Default for AppStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// A user-facing status line, e.g. "Recording started at …".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusLine {
    pub message: String,
    pub timestamp: String,
}

impl StatusLine {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug, Default)]
pub struct StatusNotifier {
    current: AppStatus,
    last_line: Option<StatusLine>,
}

impl StatusNotifier {
    pub fn new() -> Self {
        Self {
            current: AppStatus::Idle,
            last_line: None,
        }
    }

    pub fn current(&self) -> AppStatus {
        self.current
    }

    pub fn last_line(&self) -> Option<&StatusLine> {
        self.last_line.as_ref()
    }

    pub fn set(&mut self, status: AppStatus) {
        self.current = status;
    }

    pub fn set_with_line(&mut self, status: AppStatus, line: StatusLine) {
        self.current = status;
        self.last_line = Some(line);
    }
}
