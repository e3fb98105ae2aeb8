//! Usage: LinkedIn Ads access adapter (`adAccountUsers`, Rest.li 2.0).
//!
//! Grants are keyed by member URN, not email. Compound keys are sent as
//! `(account:<urn>,user:<urn>)` with URN-reserved characters percent-encoded.

use super::{array_field, str_field, AdapterContext};
use crate::domain::access::{
    AccessStatus, AccountCredential, OperationResult, PlatformType, RemoteAccessRecord,
};
use crate::domain::roles::{NativeRole, RoleMapping};
use crate::gateway::access::http::{bearer, execute};
use crate::gateway::access::provider_trait::{
    require_external_id, require_identifier, AccessProvider, ListableProvider, ListedUsers,
};
use crate::shared::error::{AppError, AppResult, ErrorKind};
use futures_core::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::json;

const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const ACCOUNT_URN_PREFIX: &str = "urn:li:sponsoredAccount:";
const MEMBER_URN_PREFIX: &str = "urn:li:person:";
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 50;

pub(crate) fn encode_urn(urn: &str) -> String {
    let mut out = String::with_capacity(urn.len() + 8);
    for ch in urn.chars() {
        match ch {
            ':' => out.push_str("%3A"),
            ',' => out.push_str("%2C"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            other => out.push(other),
        }
    }
    out
}

fn account_urn(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let id = trimmed.strip_prefix(ACCOUNT_URN_PREFIX).unwrap_or(trimmed);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            format!("invalid LinkedIn ad account id {raw:?}"),
        ));
    }
    Ok(format!("{ACCOUNT_URN_PREFIX}{id}"))
}

fn member_urn(identifier: &str) -> AppResult<String> {
    if identifier.contains('@') {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            "LinkedIn access is granted to member URNs, not email addresses",
        ));
    }
    if identifier.starts_with("urn:li:") {
        return Ok(identifier.to_string());
    }
    Ok(format!("{MEMBER_URN_PREFIX}{identifier}"))
}

pub(crate) struct LinkedinAdsAdapter {
    ctx: AdapterContext,
    roles: RoleMapping,
}

impl LinkedinAdsAdapter {
    pub(crate) fn new(ctx: AdapterContext, roles: RoleMapping) -> Self {
        Self { ctx, roles }
    }

    fn with_headers(&self, req: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        req.header(reqwest::header::AUTHORIZATION, bearer(token))
            .header("LinkedIn-Version", self.ctx.endpoints.linkedin_version.as_str())
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
    }

    fn base(&self) -> &str {
        self.ctx.endpoints.linkedin_base_url.trim_end_matches('/')
    }

    fn entity_url(&self, account: &str, member: &str) -> String {
        format!(
            "{}/rest/adAccountUsers/(account:{},user:{})",
            self.base(),
            encode_urn(account),
            encode_urn(member)
        )
    }

    async fn invite_inner(
        &self,
        identifier: &str,
        canonical_role: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let member = member_urn(require_identifier(identifier)?)?;
        let account = account_urn(require_external_id(external_account_id)?)?;
        let role = self.roles.effective_canonical(canonical_role);
        let native = self.roles.to_native(&role).to_string();
        let token = self.ctx.linkedin_access_token(credential).await?;

        // PUT upserts, so an existing grant is updated to the requested role.
        let req = self
            .ctx
            .http
            .put(self.entity_url(&account, &member))
            .json(&json!({ "account": account, "user": member, "role": native }));
        let reply = execute(self.with_headers(req, &token)).await?;
        if !reply.is_success() {
            return Err(reply.to_error("LinkedIn ad account user update"));
        }
        Ok(OperationResult::ok(format!(
            "Granted {role} on LinkedIn ad account {account} to {member}"
        )))
    }

    async fn remove_inner(
        &self,
        identifier: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let member = member_urn(require_identifier(identifier)?)?;
        let account = account_urn(require_external_id(external_account_id)?)?;
        let token = self.ctx.linkedin_access_token(credential).await?;

        let req = self.ctx.http.delete(self.entity_url(&account, &member));
        let reply = execute(self.with_headers(req, &token)).await?;
        if reply.is_success() {
            return Ok(OperationResult::ok(format!(
                "Removed {member} from LinkedIn ad account {account}"
            )));
        }
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(OperationResult::ok(format!(
                "{member} has no access to LinkedIn ad account {account}; nothing to remove"
            )));
        }
        Err(reply.to_error("LinkedIn ad account user removal"))
    }

    async fn list_inner(
        &self,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<ListedUsers> {
        let account = account_urn(require_external_id(external_account_id)?)?;
        let token = self.ctx.linkedin_access_token(credential).await?;
        let url = format!(
            "{}/rest/adAccountUsers?q=accounts&accounts={}",
            self.base(),
            encode_urn(&account)
        );

        let mut users = Vec::new();
        let mut start = 0usize;
        let mut exhausted = false;
        for _ in 0..MAX_PAGES {
            let req = self
                .ctx
                .http
                .get(format!("{url}&start={start}&count={PAGE_SIZE}"));
            let page = execute(self.with_headers(req, &token))
                .await?
                .into_success_json("LinkedIn ad account user listing")?;
            let elements = array_field(&page, "elements");
            for element in elements {
                let Some(user) = str_field(element, "user") else {
                    continue;
                };
                let native = NativeRole::name(str_field(element, "role").unwrap_or_default());
                users.push(RemoteAccessRecord::user(
                    user,
                    self.roles.to_canonical(&native),
                    AccessStatus::Active,
                ));
            }

            let total = page
                .get("paging")
                .and_then(|p| p.get("total"))
                .and_then(serde_json::Value::as_u64)
                .map(|t| t as usize);
            start += elements.len();
            let more = match total {
                Some(total) => start < total,
                None => elements.len() >= PAGE_SIZE,
            };
            if elements.is_empty() || !more {
                exhausted = true;
                break;
            }
        }
        if !exhausted {
            tracing::warn!(
                platform = "linkedin_ads",
                account = %account,
                max_pages = MAX_PAGES,
                "user listing stopped at the page limit; results are truncated"
            );
        }
        Ok(ListedUsers { users })
    }
}

impl AccessProvider for LinkedinAdsAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::LinkedinAds
    }

    fn invite<'a>(
        &'a self,
        identifier: &'a str,
        canonical_role: &'a str,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>> {
        Box::pin(self.invite_inner(identifier, canonical_role, credential, external_account_id))
    }

    fn remove_user<'a>(
        &'a self,
        identifier: &'a str,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>> {
        Box::pin(self.remove_inner(identifier, credential, external_account_id))
    }

    fn as_listable(&self) -> Option<&dyn ListableProvider> {
        Some(self)
    }
}

impl ListableProvider for LinkedinAdsAdapter {
    fn list_users<'a>(
        &'a self,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ListedUsers>> {
        Box::pin(self.list_inner(credential, external_account_id))
    }
}
