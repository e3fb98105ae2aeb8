//! Usage: OAuth2 refresh_token grant (per-account refresh token -> short-lived access token).
//!
//! Access tokens are not cached: every platform call exchanges immediately before use.

use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::security::{is_sensitive_key, mask_token};
use serde_json::Value;

#[derive(Clone)]
pub(crate) struct TokenRefreshRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) refresh_token: String,
}

impl std::fmt::Debug for TokenRefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshRequest")
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("refresh_token", &mask_token(&self.refresh_token))
            .finish()
    }
}

pub(crate) async fn refresh_access_token(
    client: &reqwest::Client,
    req: &TokenRefreshRequest,
) -> AppResult<String> {
    let refresh_token = req.refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(AppError::of(
            ErrorKind::Auth,
            "account has no refresh token; reconnect the account",
        ));
    }

    let form = [
        ("refresh_token", refresh_token),
        ("client_id", req.client_id.trim()),
        ("client_secret", req.client_secret.trim()),
        ("grant_type", "refresh_token"),
    ];

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AppError::of(ErrorKind::Auth, format!("token refresh request failed: {e}"))
                .with_source(e)
        })?;

    parse_token_response(response).await
}

async fn parse_token_response(response: reqwest::Response) -> AppResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        AppError::of(ErrorKind::Auth, format!("token response read failed: {e}")).with_source(e)
    })?;

    let value: Option<Value> = serde_json::from_str(&body).ok();
    let (error_code, error_message) = value
        .as_ref()
        .map(parse_oauth_error_details)
        .unwrap_or((None, None));

    if !status.is_success() || error_code.is_some() {
        let mut msg = format!("token endpoint returned status={}", status.as_u16());
        if let Some(code) = error_code {
            msg.push_str(" error=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = error_message {
            msg.push_str(" description=");
            msg.push_str(detail.chars().take(240).collect::<String>().as_str());
        }
        if value.is_none() {
            msg.push_str(" body=");
            msg.push_str(sanitize_error_body_snippet(&body).as_str());
        }
        return Err(AppError::of(ErrorKind::Auth, msg));
    }

    value
        .as_ref()
        .and_then(|v| v.get("access_token"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::of(ErrorKind::Auth, "token response missing access_token"))
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

pub(crate) fn sanitize_error_body_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(500).collect();
        }
    }
    body.chars().take(500).collect()
}

/// Reads the standard `error` / `error_description` pair (or a nested `error` object).
fn parse_oauth_error_details(value: &Value) -> (Option<String>, Option<String>) {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut code = None;
    let mut message = non_empty(value.get("error_description"));

    match value.get("error") {
        Some(Value::String(err)) if !err.trim().is_empty() => {
            code = Some(err.trim().to_string());
        }
        Some(Value::Object(obj)) => {
            code = non_empty(obj.get("status")).or_else(|| non_empty(obj.get("code")));
            if message.is_none() {
                message = non_empty(obj.get("message"));
            }
        }
        _ => {}
    }

    (code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_oauth_error_details_supports_standard_fields() {
        let payload = serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        });
        let (code, message) = parse_oauth_error_details(&payload);
        assert_eq!(code.as_deref(), Some("invalid_grant"));
        assert_eq!(message.as_deref(), Some("Token has been expired or revoked."));
    }

    #[test]
    fn parse_oauth_error_details_supports_nested_error_object() {
        let payload = serde_json::json!({
            "error": {"status": "UNAUTHENTICATED", "message": "bad client"}
        });
        let (code, message) = parse_oauth_error_details(&payload);
        assert_eq!(code.as_deref(), Some("UNAUTHENTICATED"));
        assert_eq!(message.as_deref(), Some("bad client"));
    }

    #[test]
    fn success_payload_has_no_error_details() {
        let payload = serde_json::json!({"access_token": "ya29.x", "expires_in": 3599});
        assert_eq!(parse_oauth_error_details(&payload), (None, None));
    }

    #[test]
    fn sanitize_error_body_snippet_masks_token_fields() {
        let raw = r#"{"error":"invalid_grant","refresh_token":"1//0gLongRefreshToken99"}"#;
        let snippet = sanitize_error_body_snippet(raw);
        assert!(!snippet.contains("1//0gLongRefreshToken99"));
        assert!(snippet.contains(&mask_token("1//0gLongRefreshToken99")));
    }

    #[test]
    fn debug_output_masks_refresh_token() {
        let req = TokenRefreshRequest {
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "cid".to_string(),
            client_secret: "secret-value".to_string(),
            refresh_token: "1//0gLongRefreshToken99".to_string(),
        };
        let debug = format!("{req:?}");
        assert!(!debug.contains("LongRefreshToken"));
        assert!(!debug.contains("secret-value"));
    }
}
