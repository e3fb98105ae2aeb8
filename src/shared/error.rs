//! Usage: Unified error model for the access layer (maps failures to `CODE: message` strings).

use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

/// Failure classes an adapter or orchestrator can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Application credentials or settings are unusable.
    Config,
    /// Refresh-token exchange failed.
    Auth,
    /// Network failure, timeout, or non-success reply from a platform.
    Transport,
    /// The remote target does not exist.
    NotFound,
    /// An optional sub-enumeration failed.
    PartialQuery,
    /// Caller precondition violated.
    InvalidInput,
    /// No adapter or capability for the requested platform.
    Unsupported,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Auth => "AUTH_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::PartialQuery => "PARTIAL_QUERY",
            Self::InvalidInput => "SEC_INVALID_INPUT",
            Self::Unsupported => "UNSUPPORTED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    fn from_code(code: &str) -> Self {
        match code {
            "CONFIG_ERROR" => Self::Config,
            "AUTH_ERROR" => Self::Auth,
            "TRANSPORT_ERROR" => Self::Transport,
            "NOT_FOUND" => Self::NotFound,
            "PARTIAL_QUERY" => Self::PartialQuery,
            "SEC_INVALID_INPUT" => Self::InvalidInput,
            "UNSUPPORTED" => Self::Unsupported,
            _ => Self::Internal,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: String,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn of(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.code(), message)
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(&self.code)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            let message = if rest.is_empty() { value.trim() } else { rest };
            return AppError::new(code.to_string(), message.to_string());
        }
        AppError::new("INTERNAL_ERROR", value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "remote request timed out".to_string()
        } else if err.is_connect() {
            "remote endpoint unreachable".to_string()
        } else {
            format!("remote request failed: {err}")
        };
        AppError::of(ErrorKind::Transport, message).with_source(err)
    }
}
