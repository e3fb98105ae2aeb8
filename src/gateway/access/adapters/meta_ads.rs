//! Usage: Meta Ads access adapter (Business Manager users via the Graph API).
//!
//! Specializations:
//! - The stored account credential is a long-lived system-user token; no refresh grant.
//! - Requires `business_id` in the account's platform config.
//! - No list capability.

use super::{array_field, str_field, AdapterContext};
use crate::domain::access::{AccountCredential, OperationResult, PlatformType};
use crate::domain::roles::{NativeRole, RoleMapping};
use crate::gateway::access::http::{bearer, execute};
use crate::gateway::access::provider_trait::{require_external_id, require_identifier, AccessProvider};
use crate::shared::error::{AppError, AppResult, ErrorKind};
use futures_core::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::{json, Value};

pub const CONFIG_BUSINESS_ID: &str = "business_id";

const MAX_PAGES: usize = 20;

fn business_id(credential: &AccountCredential) -> AppResult<&str> {
    credential.config_value(CONFIG_BUSINESS_ID).ok_or_else(|| {
        AppError::of(
            ErrorKind::Config,
            "Meta account is missing business_id in its platform config",
        )
    })
}

fn system_token(credential: &AccountCredential) -> AppResult<&str> {
    let token = credential.refresh_token.trim();
    if token.is_empty() {
        return Err(AppError::of(
            ErrorKind::Auth,
            "Meta account has no access token; reconnect the account",
        ));
    }
    Ok(token)
}

/// A business user or pending invitation found by email.
struct Member {
    id: String,
    role: NativeRole,
}

pub(crate) struct MetaAdsAdapter {
    ctx: AdapterContext,
    roles: RoleMapping,
}

impl MetaAdsAdapter {
    pub(crate) fn new(ctx: AdapterContext, roles: RoleMapping) -> Self {
        Self { ctx, roles }
    }

    fn url(&self, node: &str) -> String {
        format!(
            "{}/{}/{node}",
            self.ctx.endpoints.meta_graph_base_url.trim_end_matches('/'),
            self.ctx.endpoints.meta_graph_version.trim_matches('/')
        )
    }

    /// Follows `paging.next` until exhausted; returns the matching node, if any.
    async fn find_by_email(&self, token: &str, edge_url: String, email: &str) -> AppResult<Option<Member>> {
        let mut next = Some(edge_url);
        let mut first = true;
        for _ in 0..MAX_PAGES {
            let Some(url) = next.take() else {
                return Ok(None);
            };
            let mut req = self
                .ctx
                .http
                .get(url)
                .header(reqwest::header::AUTHORIZATION, bearer(token));
            if first {
                req = req.query(&[("fields", "id,email,role")]);
                first = false;
            }
            let page = execute(req)
                .await?
                .into_success_json("Meta business user lookup")?;
            let found = array_field(&page, "data")
                .iter()
                .find(|u| str_field(u, "email").is_some_and(|e| e.eq_ignore_ascii_case(email)))
                .and_then(|u| {
                    Some(Member {
                        id: str_field(u, "id")?.to_string(),
                        role: NativeRole::name(str_field(u, "role").unwrap_or_default()),
                    })
                });
            if found.is_some() {
                return Ok(found);
            }
            next = page
                .get("paging")
                .and_then(|p| p.get("next"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        if next.is_some() {
            tracing::warn!(
                platform = "meta_ads",
                max_pages = MAX_PAGES,
                "business user lookup stopped at the page limit; later pages were not searched"
            );
        }
        Ok(None)
    }

    async fn invite_inner(
        &self,
        identifier: &str,
        canonical_role: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let ad_account = require_external_id(external_account_id)?;
        let business = business_id(credential)?;
        let token = system_token(credential)?;
        let role = self.roles.effective_canonical(canonical_role);
        let native = self.roles.to_native(&role).to_string();

        let req = self
            .ctx
            .http
            .post(self.url(&format!("{business}/business_users")))
            .header(reqwest::header::AUTHORIZATION, bearer(token))
            .json(&json!({ "email": email, "role": native }));
        let reply = execute(req).await?;
        if reply.is_success() {
            return Ok(OperationResult::ok(format!(
                "Invited {email} as {role} to the Meta business owning ad account {ad_account}"
            )));
        }

        // A rejected invite succeeds only when the member already holds enough access.
        let rejected = reply.to_error("Meta business user invitation");
        if let Some(member) = self
            .find_by_email(token, self.url(&format!("{business}/business_users")), email)
            .await?
        {
            if self.roles.covers(&member.role, &role) {
                return Ok(OperationResult::ok(format!(
                    "{email} is already a member of the Meta business owning ad account {ad_account}"
                )));
            }
            let req = self
                .ctx
                .http
                .post(self.url(&member.id))
                .header(reqwest::header::AUTHORIZATION, bearer(token))
                .json(&json!({ "role": native }));
            execute(req)
                .await?
                .into_success_json("Meta business user role update")?;
            return Ok(OperationResult::ok(format!(
                "Updated {email} to {role} in the Meta business owning ad account {ad_account}"
            )));
        }
        if let Some(member) = self
            .find_by_email(token, self.url(&format!("{business}/pending_users")), email)
            .await?
        {
            if self.roles.covers(&member.role, &role) {
                return Ok(OperationResult::ok(format!(
                    "{email} already has a pending invitation to the Meta business owning ad account {ad_account}"
                )));
            }
        }
        Err(rejected)
    }

    /// Checks active business users first, then pending invitations.
    async fn remove_inner(
        &self,
        identifier: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let ad_account = require_external_id(external_account_id)?;
        let business = business_id(credential)?;
        let token = system_token(credential)?;
        let no_access = || {
            OperationResult::ok(format!(
                "{email} has no access to Meta ad account {ad_account}; nothing to remove"
            ))
        };

        let mut target = self
            .find_by_email(token, self.url(&format!("{business}/business_users")), email)
            .await?;
        let mut pending = false;
        if target.is_none() {
            target = self
                .find_by_email(token, self.url(&format!("{business}/pending_users")), email)
                .await?;
            pending = target.is_some();
        }
        let Some(Member { id: node_id, .. }) = target else {
            return Ok(no_access());
        };

        let req = self
            .ctx
            .http
            .delete(self.url(&node_id))
            .header(reqwest::header::AUTHORIZATION, bearer(token));
        let reply = execute(req).await?;
        if reply.is_success() {
            let what = if pending {
                "Cancelled pending invitation for"
            } else {
                "Removed"
            };
            return Ok(OperationResult::ok(format!(
                "{what} {email} on Meta ad account {ad_account}"
            )));
        }
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(no_access());
        }
        Err(reply.to_error("Meta business user removal"))
    }
}

impl AccessProvider for MetaAdsAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::MetaAds
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_business_id_is_config_error() {
        let credential = AccountCredential::new("EAAB-token");
        assert!(business_id(&credential).unwrap_err().is(ErrorKind::Config));
        let credential = credential.with_config(CONFIG_BUSINESS_ID, "998877");
        assert_eq!(business_id(&credential).unwrap(), "998877");
    }

    #[test]
    fn empty_token_is_auth_error() {
        let credential = AccountCredential::new("  ");
        assert!(system_token(&credential).unwrap_err().is(ErrorKind::Auth));
    }
}
