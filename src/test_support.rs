//! Usage: Public test helpers for integration tests.

use crate::shared::error::AppResult;

/// Runs the refresh-token grant against `token_uri`.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> AppResult<String> {
    let req = crate::gateway::access::token_exchange::TokenRefreshRequest {
        token_uri: token_uri.to_string(),
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        refresh_token: refresh_token.to_string(),
    };
    crate::gateway::access::token_exchange::refresh_access_token(client, &req).await
}

pub fn remote_error_detail(body: &serde_json::Value) -> Option<String> {
    crate::gateway::access::http::remote_error_detail(body)
}

pub fn linkedin_encode_urn(urn: &str) -> String {
    crate::gateway::access::adapters::linkedin_ads::encode_urn(urn)
}

pub fn mask_token(token: &str) -> String {
    crate::shared::security::mask_token(token)
}
