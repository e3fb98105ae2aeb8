//! Usage: Per-platform access adapters and the context they share.

pub(crate) mod google_ads;
pub(crate) mod google_analytics;
pub(crate) mod google_tag_manager;
pub(crate) mod linkedin_ads;
pub(crate) mod meta_ads;

use crate::domain::access::AccountCredential;
use crate::domain::roles::NativeRole;
use crate::gateway::access::credentials::{
    CredentialResolver, FIELD_GOOGLE_CLIENT_ID, FIELD_GOOGLE_CLIENT_SECRET,
    FIELD_LINKEDIN_CLIENT_ID, FIELD_LINKEDIN_CLIENT_SECRET,
};
use crate::gateway::access::token_exchange::{refresh_access_token, TokenRefreshRequest};
use crate::infra::settings::PlatformEndpoints;
use crate::shared::error::AppResult;
use serde_json::Value;
use std::sync::Arc;

/// Transport client, app credentials and endpoints, shared by every adapter of one registry.
#[derive(Clone)]
pub(crate) struct AdapterContext {
    pub(crate) http: reqwest::Client,
    pub(crate) credentials: Arc<CredentialResolver>,
    pub(crate) endpoints: PlatformEndpoints,
}

impl AdapterContext {
    pub(crate) fn new(
        http: reqwest::Client,
        credentials: Arc<CredentialResolver>,
        endpoints: PlatformEndpoints,
    ) -> Self {
        Self {
            http,
            credentials,
            endpoints,
        }
    }

    /// Exchanges the account's Google refresh token. App credentials are resolved first so a
    /// missing client id fails before any network call.
    pub(crate) async fn google_access_token(
        &self,
        credential: &AccountCredential,
    ) -> AppResult<String> {
        let app = self.credentials.get().await?;
        let req = TokenRefreshRequest {
            token_uri: self.endpoints.google_token_url.clone(),
            client_id: app.field(FIELD_GOOGLE_CLIENT_ID)?.to_string(),
            client_secret: app.field(FIELD_GOOGLE_CLIENT_SECRET)?.to_string(),
            refresh_token: credential.refresh_token.clone(),
        };
        refresh_access_token(&self.http, &req).await
    }

    pub(crate) async fn linkedin_access_token(
        &self,
        credential: &AccountCredential,
    ) -> AppResult<String> {
        let app = self.credentials.get().await?;
        let req = TokenRefreshRequest {
            token_uri: self.endpoints.linkedin_token_url.clone(),
            client_id: app.field(FIELD_LINKEDIN_CLIENT_ID)?.to_string(),
            client_secret: app.field(FIELD_LINKEDIN_CLIENT_SECRET)?.to_string(),
            refresh_token: credential.refresh_token.clone(),
        };
        refresh_access_token(&self.http, &req).await
    }
}

pub(crate) fn native_to_json(native: &NativeRole) -> Value {
    match native {
        NativeRole::Code(code) => Value::from(*code),
        NativeRole::Name(name) => Value::from(name.as_str()),
    }
}

pub(crate) fn str_field<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn array_field<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
