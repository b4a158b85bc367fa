use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TemplateResolution,
    PreRequest,
    PostRequest,
    Transport,
    Timeout,
    JudgeParse,
    Evaluator,
    NotFound,
    Conflict,
    InvalidState,
    RunLocked,
    Store,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TemplateResolution => "template_resolution",
            ErrorKind::PreRequest => "pre_request",
            ErrorKind::PostRequest => "post_request",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::JudgeParse => "judge_parse",
            ErrorKind::Evaluator => "evaluator",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::RunLocked => "run_locked",
            ErrorKind::Store => "store",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error as persisted on runs and results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            detail: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template resolution failed: {0}")]
    TemplateResolution(String),

    #[error("pre-request failed: {0}")]
    PreRequest(Box<EngineError>),

    #[error("post-request failed: {0}")]
    PostRequest(Box<EngineError>),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("judge reply could not be parsed: {0}")]
    JudgeParse(String),

    #[error("evaluator failed: {0}")]
    Evaluator(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("run {0} is being executed by another worker")]
    RunLocked(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn transport(message: impl Into<String>) -> Self {
        EngineError::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::TemplateResolution(_) => ErrorKind::TemplateResolution,
            EngineError::PreRequest(_) => ErrorKind::PreRequest,
            EngineError::PostRequest(_) => ErrorKind::PostRequest,
            EngineError::Transport { .. } => ErrorKind::Transport,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::JudgeParse(_) => ErrorKind::JudgeParse,
            EngineError::Evaluator(_) => ErrorKind::Evaluator,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::InvalidState(_) => ErrorKind::InvalidState,
            EngineError::RunLocked(_) => ErrorKind::RunLocked,
            EngineError::Store(_) => ErrorKind::Store,
            EngineError::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status carried by the error or by the failure it wraps.
    pub fn status(&self) -> Option<u16> {
        match self {
            EngineError::Transport { status, .. } => *status,
            EngineError::PreRequest(inner) | EngineError::PostRequest(inner) => inner.status(),
            _ => None,
        }
    }

    pub fn record(&self) -> ErrorRecord {
        let mut rec = ErrorRecord::new(self.kind(), self.to_string());
        if let Some(status) = self.status() {
            rec = rec.with_status(status);
        }
        if let EngineError::PreRequest(inner) | EngineError::PostRequest(inner) = self {
            rec = rec.with_detail(inner.kind().as_str());
        }
        rec
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Store(format!("serialization: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_hook_failure_keeps_status_and_inner_kind() {
        let inner = EngineError::Transport {
            message: "HTTP 500: boom".into(),
            status: Some(500),
        };
        let err = EngineError::PreRequest(Box::new(inner));
        let rec = err.record();
        assert_eq!(rec.kind, ErrorKind::PreRequest);
        assert_eq!(rec.status, Some(500));
        assert_eq!(rec.detail.as_deref(), Some("transport"));
        assert!(rec.message.contains("HTTP 500"));
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        let rec = ErrorRecord::new(ErrorKind::RunLocked, "busy");
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["kind"], "run_locked");
        assert_eq!(ErrorKind::JudgeParse.as_str(), "judge_parse");
    }
}
