//! Usage: Shared HTTP plumbing for adapters (client construction, reply capture, error normalization).

use crate::gateway::access::token_exchange::sanitize_error_body_snippet;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Every outbound call is bounded by this timeout; a timeout surfaces as a transport error.
pub fn build_http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("access-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            AppError::of(ErrorKind::Config, format!("failed to build http client: {e}"))
                .with_source(e)
        })
}

/// A fully-read remote reply.
#[derive(Debug, Clone)]
pub(crate) struct RemoteReply {
    pub(crate) status: StatusCode,
    pub(crate) body: String,
}

impl RemoteReply {
    pub(crate) fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub(crate) fn json(&self) -> Value {
        if self.body.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    /// Most specific remote message available, if any.
    pub(crate) fn detail(&self) -> Option<String> {
        remote_error_detail(&self.json())
    }

    /// True if the body mentions any of `markers` (case-insensitive).
    pub(crate) fn mentions(&self, markers: &[&str]) -> bool {
        let body = self.body.to_ascii_lowercase();
        markers
            .iter()
            .any(|m| body.contains(&m.to_ascii_lowercase()))
    }

    pub(crate) fn to_error(&self, what: &str) -> AppError {
        let detail = self
            .detail()
            .unwrap_or_else(|| sanitize_error_body_snippet(&self.body));
        let kind = if self.status == StatusCode::NOT_FOUND {
            ErrorKind::NotFound
        } else {
            ErrorKind::Transport
        };
        let mut message = format!("{what} failed with status {}", self.status.as_u16());
        if !detail.trim().is_empty() {
            message.push_str(": ");
            message.push_str(detail.trim());
        }
        AppError::of(kind, message)
    }

    pub(crate) fn into_success_json(self, what: &str) -> AppResult<Value> {
        if !self.is_success() {
            return Err(self.to_error(what));
        }
        Ok(self.json())
    }
}

/// Sends the request and reads the whole body. Only transport failures are errors here.
pub(crate) async fn execute(request: reqwest::RequestBuilder) -> AppResult<RemoteReply> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok(RemoteReply { status, body })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Normalizes the error payload shapes the supported platforms return into one message.
///
/// Google APIs nest failures under `error.details[].errors[]` (Ads) or `error.message`;
/// LinkedIn uses a top-level `message`; Graph uses `error.error_user_msg` / `error.message`.
pub(crate) fn remote_error_detail(value: &Value) -> Option<String> {
    if let Some(error) = value.get("error") {
        if let Some(details) = error.get("details").and_then(Value::as_array) {
            for detail in details {
                let first = detail
                    .get("errors")
                    .and_then(Value::as_array)
                    .and_then(|errs| errs.first());
                if let Some(message) = first.and_then(|e| non_empty_str(e.get("message"))) {
                    return Some(message);
                }
            }
        }
        if let Some(message) = non_empty_str(error.get("error_user_msg")) {
            return Some(message);
        }
        if let Some(message) = non_empty_str(error.get("message")) {
            return Some(message);
        }
        if let Some(message) = non_empty_str(Some(error)) {
            let description = non_empty_str(value.get("error_description"));
            return Some(match description {
                Some(description) => format!("{message}: {description}"),
                None => message,
            });
        }
    }
    if let Some(message) = value
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errs| errs.first())
        .and_then(|e| non_empty_str(e.get("message")))
    {
        return Some(message);
    }
    non_empty_str(value.get("message"))
}

pub(crate) fn bearer(access_token: &str) -> String {
    format!("Bearer {}", access_token.trim())
}
