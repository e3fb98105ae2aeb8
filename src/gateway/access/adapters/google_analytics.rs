//! Usage: Google Analytics access adapter (Admin API access bindings on a property).
//!
//! Listing walks exactly one level up: property bindings, then the parent account's
//! bindings. The account hop is optional and never fails the listing.

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

const API_VERSION: &str = "v1alpha";
const PAGE_SIZE: &str = "200";
const MAX_PAGES: usize = 50;

fn property_id(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let id = trimmed.strip_prefix("properties/").unwrap_or(trimmed);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            format!("invalid Google Analytics property id {raw:?}"),
        ));
    }
    Ok(id.to_string())
}

struct Binding {
    name: String,
    user: String,
    role: NativeRole,
}

fn parse_bindings(page: &Value) -> impl Iterator<Item = Binding> + '_ {
    array_field(page, "accessBindings").iter().filter_map(|b| {
        let user = str_field(b, "user")?;
        let name = str_field(b, "name")?;
        let role = array_field(b, "roles")
            .iter()
            .find_map(Value::as_str)
            .unwrap_or_default();
        Some(Binding {
            name: name.to_string(),
            user: user.to_string(),
            role: NativeRole::name(role),
        })
    })
}

pub(crate) struct GoogleAnalyticsAdapter {
    ctx: AdapterContext,
    roles: RoleMapping,
}

impl GoogleAnalyticsAdapter {
    pub(crate) fn new(ctx: AdapterContext, roles: RoleMapping) -> Self {
        Self { ctx, roles }
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/{API_VERSION}/{resource}",
            self.ctx.endpoints.google_analytics_base_url.trim_end_matches('/')
        )
    }

    /// `parent` is `properties/N` or `accounts/N`.
    async fn bindings(&self, token: &str, parent: &str) -> AppResult<Vec<Binding>> {
        let url = self.url(&format!("{parent}/accessBindings"));
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(t) = page_token.take() {
                query.push(("pageToken", t));
            }
            let req = self
                .ctx
                .http
                .get(&url)
                .query(&query)
                .header(reqwest::header::AUTHORIZATION, bearer(token));
            let page = execute(req)
                .await?
                .into_success_json("Google Analytics access binding listing")?;
            out.extend(parse_bindings(&page));
            page_token = str_field(&page, "nextPageToken").map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() {
            tracing::warn!(
                platform = "google_analytics",
                parent = %parent,
                max_pages = MAX_PAGES,
                "access binding listing stopped at the page limit; results are truncated"
            );
        }
        Ok(out)
    }

    async fn parent_account(&self, token: &str, property: &str) -> AppResult<Option<String>> {
        let req = self
            .ctx
            .http
            .get(self.url(&format!("properties/{property}")))
            .header(reqwest::header::AUTHORIZATION, bearer(token));
        let value = execute(req)
            .await?
            .into_success_json("Google Analytics property lookup")?;
        Ok(str_field(&value, "parent")
            .filter(|p| p.starts_with("accounts/"))
            .map(str::to_string))
    }

    async fn invite_inner(
        &self,
        identifier: &str,
        canonical_role: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let property = property_id(require_external_id(external_account_id)?)?;
        let role = self.roles.effective_canonical(canonical_role);
        let native = self.roles.to_native(&role).to_string();
        let token = self.ctx.google_access_token(credential).await?;

        let req = self
            .ctx
            .http
            .post(self.url(&format!("properties/{property}/accessBindings")))
            .header(reqwest::header::AUTHORIZATION, bearer(&token))
            .json(&json!({ "user": email, "roles": [native] }));
        let reply = execute(req).await?;
        if reply.is_success() {
            return Ok(OperationResult::ok(format!(
                "Granted {role} on Google Analytics property {property} to {email}"
            )));
        }
        if reply.status != StatusCode::CONFLICT && !reply.mentions(&["ALREADY_EXISTS"]) {
            return Err(reply.to_error("Google Analytics access grant"));
        }

        let existing = self
            .bindings(&token, &format!("properties/{property}"))
            .await?
            .into_iter()
            .find(|b| b.user.eq_ignore_ascii_case(email));
        let Some(existing) = existing else {
            return Err(reply.to_error("Google Analytics access grant"));
        };
        if self.roles.covers(&existing.role, &role) {
            return Ok(OperationResult::ok(format!(
                "{email} already has {} on Google Analytics property {property}",
                self.roles.to_canonical(&existing.role)
            )));
        }

        let req = self
            .ctx
            .http
            .patch(self.url(&existing.name))
            .header(reqwest::header::AUTHORIZATION, bearer(&token))
            .json(&json!({ "name": existing.name, "user": existing.user, "roles": [native] }));
        execute(req)
            .await?
            .into_success_json("Google Analytics access update")?;
        tracing::info!(
            platform = "google_analytics",
            property = %property,
            role = %role,
            "access binding upgraded"
        );
        Ok(OperationResult::ok(format!(
            "Updated {email} to {role} on Google Analytics property {property}"
        )))
    }

    async fn remove_inner(
        &self,
        identifier: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let property = property_id(require_external_id(external_account_id)?)?;
        let token = self.ctx.google_access_token(credential).await?;
        let no_access = || {
            OperationResult::ok(format!(
                "{email} has no access to Google Analytics property {property}; nothing to remove"
            ))
        };

        let bindings = self
            .bindings(&token, &format!("properties/{property}"))
            .await?;
        let Some(binding) = bindings
            .into_iter()
            .find(|b| b.user.eq_ignore_ascii_case(email))
        else {
            return Ok(no_access());
        };

        let req = self
            .ctx
            .http
            .delete(self.url(&binding.name))
            .header(reqwest::header::AUTHORIZATION, bearer(&token));
        let reply = execute(req).await?;
        if reply.is_success() {
            return Ok(OperationResult::ok(format!(
                "Removed {email} from Google Analytics property {property}"
            )));
        }
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(no_access());
        }
        Err(reply.to_error("Google Analytics access removal"))
    }

    async fn list_inner(
        &self,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<ListedUsers> {
        let property = property_id(require_external_id(external_account_id)?)?;
        let token = self.ctx.google_access_token(credential).await?;

        let mut users: Vec<RemoteAccessRecord> = self
            .bindings(&token, &format!("properties/{property}"))
            .await?
            .into_iter()
            .map(|b| self.record(b))
            .collect();

        let account_bindings = match self.parent_account(&token, &property).await {
            Ok(Some(account)) => self.bindings(&token, &account).await.map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        match account_bindings {
            Ok(Some(bindings)) => users.extend(bindings.into_iter().map(|b| self.record(b))),
            Ok(None) => {}
            Err(err) => {
                let err = AppError::of(
                    ErrorKind::PartialQuery,
                    format!("parent account binding lookup failed: {}", err.message()),
                )
                .with_source(err);
                tracing::warn!(
                    platform = "google_analytics",
                    property = %property,
                    error = %err,
                    "optional lookup failed; omitting from listing"
                );
            }
        }

        Ok(ListedUsers { users })
    }

    fn record(&self, binding: Binding) -> RemoteAccessRecord {
        RemoteAccessRecord::user(
            binding.user,
            self.roles.to_canonical(&binding.role),
            AccessStatus::Active,
        )
    }
}

impl AccessProvider for GoogleAnalyticsAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::GoogleAnalytics
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

impl ListableProvider for GoogleAnalyticsAdapter {
    fn list_users<'a>(
        &'a self,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ListedUsers>> {
        Box::pin(self.list_inner(credential, external_account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_id_accepts_resource_name() {
        assert_eq!(property_id("properties/4242").unwrap(), "4242");
        assert_eq!(property_id(" 4242 ").unwrap(), "4242");
        assert!(property_id("accounts/1").is_err());
    }

    #[test]
    fn bindings_take_first_role() {
        let page = json!({
            "accessBindings": [
                {"name": "properties/1/accessBindings/a", "user": "a@example.com",
                 "roles": ["predefinedRoles/editor", "predefinedRoles/no-cost-data"]},
                {"name": "properties/1/accessBindings/b", "roles": ["predefinedRoles/viewer"]}
            ]
        });
        let bindings: Vec<Binding> = parse_bindings(&page).collect();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].role, NativeRole::name("predefinedRoles/editor"));
    }
}
