//! Usage: Google Tag Manager access adapter (account-level user permissions).

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
use serde_json::{json, Value};

const MAX_PAGES: usize = 50;

fn account_id(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let id = trimmed.strip_prefix("accounts/").unwrap_or(trimmed);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            format!("invalid Google Tag Manager account id {raw:?}"),
        ));
    }
    Ok(id.to_string())
}

struct Permission {
    path: String,
    email: String,
    permission: String,
}

fn parse_permissions(page: &Value) -> impl Iterator<Item = Permission> + '_ {
    array_field(page, "userPermission").iter().filter_map(|p| {
        Some(Permission {
            path: str_field(p, "path")?.to_string(),
            email: str_field(p, "emailAddress")?.to_string(),
            permission: p
                .get("accountAccess")
                .and_then(|a| str_field(a, "permission"))
                .unwrap_or_default()
                .to_string(),
        })
    })
}

pub(crate) struct GoogleTagManagerAdapter {
    ctx: AdapterContext,
    roles: RoleMapping,
}

impl GoogleTagManagerAdapter {
    pub(crate) fn new(ctx: AdapterContext, roles: RoleMapping) -> Self {
        Self { ctx, roles }
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/tagmanager/v2/{resource}",
            self.ctx
                .endpoints
                .google_tag_manager_base_url
                .trim_end_matches('/')
        )
    }

    async fn permissions(&self, token: &str, account: &str) -> AppResult<Vec<Permission>> {
        let url = self.url(&format!("accounts/{account}/user_permissions"));
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut req = self
                .ctx
                .http
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, bearer(token));
            if let Some(t) = page_token.take() {
                req = req.query(&[("pageToken", t)]);
            }
            let page = execute(req)
                .await?
                .into_success_json("Google Tag Manager permission listing")?;
            out.extend(parse_permissions(&page));
            page_token = str_field(&page, "nextPageToken").map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() {
            tracing::warn!(
                platform = "google_tag_manager",
                account = %account,
                max_pages = MAX_PAGES,
                "permission listing stopped at the page limit; results are truncated"
            );
        }
        Ok(out)
    }

    /// Creates the permission, or raises an existing lower one in place. Never downgrades.
    async fn invite_inner(
        &self,
        identifier: &str,
        canonical_role: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let account = account_id(require_external_id(external_account_id)?)?;
        let role = self.roles.effective_canonical(canonical_role);
        let native = self.roles.to_native(&role).to_string();
        let token = self.ctx.google_access_token(credential).await?;

        let existing = self
            .permissions(&token, &account)
            .await?
            .into_iter()
            .find(|p| p.email.eq_ignore_ascii_case(email));

        let body = json!({
            "accountId": account,
            "emailAddress": email,
            "accountAccess": { "permission": native },
        });
        let (req, verb) = match &existing {
            Some(p) if self.roles.covers(&NativeRole::name(p.permission.as_str()), &role) => {
                let held = self.roles.to_canonical(&NativeRole::name(p.permission.as_str()));
                return Ok(OperationResult::ok(format!(
                    "{email} already has {held} access to Google Tag Manager account {account}"
                )));
            }
            Some(p) => (self.ctx.http.put(self.url(&p.path)), "Updated"),
            None => (
                self.ctx
                    .http
                    .post(self.url(&format!("accounts/{account}/user_permissions"))),
                "Granted",
            ),
        };
        let reply = execute(
            req.header(reqwest::header::AUTHORIZATION, bearer(&token))
                .json(&body),
        )
        .await?;
        if !reply.is_success() {
            return Err(reply.to_error("Google Tag Manager permission update"));
        }
        Ok(OperationResult::ok(format!(
            "{verb} {role} on Google Tag Manager account {account} for {email}"
        )))
    }

    async fn remove_inner(
        &self,
        identifier: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let account = account_id(require_external_id(external_account_id)?)?;
        let token = self.ctx.google_access_token(credential).await?;
        let no_access = || {
            OperationResult::ok(format!(
                "{email} has no access to Google Tag Manager account {account}; nothing to remove"
            ))
        };

        let Some(permission) = self
            .permissions(&token, &account)
            .await?
            .into_iter()
            .find(|p| p.email.eq_ignore_ascii_case(email))
        else {
            return Ok(no_access());
        };

        let req = self
            .ctx
            .http
            .delete(self.url(&permission.path))
            .header(reqwest::header::AUTHORIZATION, bearer(&token));
        let reply = execute(req).await?;
        if reply.is_success() {
            return Ok(OperationResult::ok(format!(
                "Removed {email} from Google Tag Manager account {account}"
            )));
        }
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(no_access());
        }
        Err(reply.to_error("Google Tag Manager permission removal"))
    }

    async fn list_inner(
        &self,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<ListedUsers> {
        let account = account_id(require_external_id(external_account_id)?)?;
        let token = self.ctx.google_access_token(credential).await?;
        let users = self
            .permissions(&token, &account)
            .await?
            .into_iter()
            .map(|p| {
                let role = self.roles.to_canonical(&NativeRole::name(p.permission));
                RemoteAccessRecord::user(p.email, role, AccessStatus::Active)
            })
            .collect();
        Ok(ListedUsers { users })
    }
}

impl AccessProvider for GoogleTagManagerAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::GoogleTagManager
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

impl ListableProvider for GoogleTagManagerAdapter {
    fn list_users<'a>(
        &'a self,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ListedUsers>> {
        Box::pin(self.list_inner(credential, external_account_id))
    }
}
