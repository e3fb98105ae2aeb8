//! Usage: Google Ads access adapter (user access, pending invitations, manager links).
//!
//! Specializations:
//! - Mutates go straight to the REST transport with one embedded `operation` object; generic
//!   clients wrap singular operations in a list, which the user-access services reject.
//! - `developer-token` on every call; `login-customer-id` when connected through a manager.
//! - Role codes are the numeric `AccessRole` values.

use super::{array_field, native_to_json, str_field, AdapterContext};
use crate::domain::access::{
    AccessStatus, AccountCredential, OperationResult, PlatformType, RemoteAccessRecord,
};
use crate::domain::roles::{NativeRole, RoleMapping};
use crate::gateway::access::credentials::FIELD_GOOGLE_ADS_DEVELOPER_TOKEN;
use crate::gateway::access::http::{bearer, execute, RemoteReply};
use crate::gateway::access::provider_trait::{
    require_external_id, require_identifier, AccessProvider, ListableProvider, ListedUsers,
};
use crate::shared::error::{AppError, AppResult, ErrorKind};
use futures_core::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const CONFIG_LOGIN_CUSTOMER_ID: &str = "login_customer_id";

const ALREADY_HAS_ACCESS: &str = "ALREADY_HAS_ACCESS";
const ALREADY_INVITED: &str = "ALREADY_INVITED";
// Manager links confer administrative access on the linked account.
const MANAGER_ACCESS_CODE: i64 = 2;
const MAX_SEARCH_PAGES: usize = 50;
const MANAGER_LOOKUP_CONCURRENCY: usize = 4;

const QUERY_USER_ACCESS: &str = "SELECT customer_user_access.resource_name, \
customer_user_access.email_address, customer_user_access.access_role \
FROM customer_user_access";
const QUERY_PENDING_INVITATIONS: &str = "SELECT customer_user_access_invitation.resource_name, \
customer_user_access_invitation.email_address, customer_user_access_invitation.access_role \
FROM customer_user_access_invitation \
WHERE customer_user_access_invitation.invitation_status = 'PENDING'";
const QUERY_MANAGER_LINKS: &str = "SELECT customer_manager_link.manager_customer, \
customer_manager_link.status FROM customer_manager_link";
const QUERY_DESCRIPTIVE_NAME: &str = "SELECT customer.descriptive_name FROM customer LIMIT 1";

/// Accepts `1234567890`, `123-456-7890` or `customers/1234567890`.
pub(crate) fn normalize_customer_id(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("customers/").unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            format!("invalid Google Ads customer id {raw:?}"),
        ));
    }
    Ok(digits)
}

pub(crate) fn format_customer_id(digits: &str) -> String {
    if digits.len() == 10 {
        format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..])
    } else {
        digits.to_string()
    }
}

/// REST responses carry `AccessRole` as its enum name; requests send the numeric code.
fn parse_access_role(value: Option<&Value>) -> NativeRole {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(NativeRole::Code)
            .unwrap_or_else(|| NativeRole::name(n.to_string())),
        Some(Value::String(s)) => match s.trim() {
            "ADMIN" => NativeRole::Code(2),
            "STANDARD" => NativeRole::Code(3),
            "READ_ONLY" => NativeRole::Code(4),
            "EMAIL_ONLY" => NativeRole::Code(5),
            other => other
                .parse::<i64>()
                .map(NativeRole::Code)
                .unwrap_or_else(|_| NativeRole::name(other)),
        },
        _ => NativeRole::name(""),
    }
}

fn link_status(raw: &str) -> Option<AccessStatus> {
    match raw.trim() {
        "ACTIVE" => Some(AccessStatus::Active),
        "PENDING" => Some(AccessStatus::Pending),
        "REFUSED" => Some(AccessStatus::Refused),
        "CANCELED" | "CANCELLED" | "INACTIVE" => Some(AccessStatus::Cancelled),
        _ => None,
    }
}

fn find_entity_by_email<'a>(rows: &'a [Value], entity: &str, email: &str) -> Option<&'a Value> {
    rows.iter()
        .filter_map(|row| row.get(entity))
        .find(|e| str_field(e, "emailAddress").is_some_and(|v| v.eq_ignore_ascii_case(email)))
}

fn find_resource_by_email(rows: &[Value], entity: &str, email: &str) -> Option<String> {
    find_entity_by_email(rows, entity, email)
        .and_then(|e| str_field(e, "resourceName"))
        .map(str::to_string)
}

fn partial_query_failed(customer_id: &str, what: &str, err: AppError) {
    let err = AppError::of(
        ErrorKind::PartialQuery,
        format!("{what} lookup failed: {}", err.message()),
    )
    .with_source(err);
    tracing::warn!(
        platform = "google_ads",
        customer_id = %customer_id,
        error = %err,
        "optional lookup failed; omitting from listing"
    );
}

/// Authenticated REST transport for one call. Owned per call so the token never outlives it.
#[derive(Clone)]
struct GoogleAdsTransport {
    http: reqwest::Client,
    api_root: String,
    access_token: String,
    developer_token: String,
    login_customer_id: Option<String>,
}

impl GoogleAdsTransport {
    fn acting_as(&self, login_customer_id: &str) -> Self {
        Self {
            login_customer_id: Some(login_customer_id.to_string()),
            ..self.clone()
        }
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let req = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, bearer(&self.access_token))
            .header("developer-token", self.developer_token.as_str());
        match &self.login_customer_id {
            Some(login) => req.header("login-customer-id", login.as_str()),
            None => req,
        }
    }

    async fn search(&self, customer_id: &str, query: &str) -> AppResult<Vec<Value>> {
        let url = format!("{}/customers/{customer_id}/googleAds:search", self.api_root);
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_SEARCH_PAGES {
            let mut body = json!({ "query": query });
            if let Some(token) = page_token.as_deref() {
                body["pageToken"] = Value::from(token);
            }
            let value = execute(self.post(url.clone()).json(&body))
                .await?
                .into_success_json("Google Ads search")?;
            rows.extend(array_field(&value, "results").iter().cloned());
            page_token = str_field(&value, "nextPageToken").map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() {
            tracing::warn!(
                platform = "google_ads",
                customer_id = %customer_id,
                max_pages = MAX_SEARCH_PAGES,
                "search stopped at the page limit; results are truncated"
            );
        }
        Ok(rows)
    }

    /// `{"customerId": .., "operation": {..}}`: one object, never a list.
    async fn mutate_single(
        &self,
        customer_id: &str,
        service: &str,
        operation: Value,
    ) -> AppResult<RemoteReply> {
        let url = format!("{}/customers/{customer_id}/{service}:mutate", self.api_root);
        let body = json!({ "customerId": customer_id, "operation": operation });
        execute(self.post(url).json(&body)).await
    }
}

pub(crate) struct GoogleAdsAdapter {
    ctx: AdapterContext,
    roles: RoleMapping,
}

impl GoogleAdsAdapter {
    pub(crate) fn new(ctx: AdapterContext, roles: RoleMapping) -> Self {
        Self { ctx, roles }
    }

    async fn transport(&self, credential: &AccountCredential) -> AppResult<GoogleAdsTransport> {
        let app = self.ctx.credentials.get().await?;
        let developer_token = app.field(FIELD_GOOGLE_ADS_DEVELOPER_TOKEN)?.to_string();
        let login_customer_id = credential
            .config_value(CONFIG_LOGIN_CUSTOMER_ID)
            .map(normalize_customer_id)
            .transpose()?;
        let access_token = self.ctx.google_access_token(credential).await?;

        let endpoints = &self.ctx.endpoints;
        Ok(GoogleAdsTransport {
            http: self.ctx.http.clone(),
            api_root: format!(
                "{}/{}",
                endpoints.google_ads_base_url.trim_end_matches('/'),
                endpoints.google_ads_api_version.trim_matches('/')
            ),
            access_token,
            developer_token,
            login_customer_id,
        })
    }

    async fn invite_inner(
        &self,
        identifier: &str,
        canonical_role: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let customer_id = normalize_customer_id(require_external_id(external_account_id)?)?;
        let role = self.roles.effective_canonical(canonical_role);
        let transport = self.transport(credential).await?;

        let reply = self
            .create_invitation(&transport, &customer_id, email, &role)
            .await?;
        let display_id = format_customer_id(&customer_id);
        if reply.is_success() {
            return Ok(OperationResult::ok(format!(
                "Invitation sent to {email} for Google Ads account {display_id} with role {role}"
            )));
        }
        if reply.mentions(&[ALREADY_HAS_ACCESS]) {
            return Ok(OperationResult::ok(format!(
                "{email} already has access to Google Ads account {display_id}"
            )));
        }
        if reply.mentions(&[ALREADY_INVITED]) {
            return Ok(OperationResult::ok(format!(
                "{email} already has a pending invitation to Google Ads account {display_id}"
            )));
        }
        Err(reply.to_error("Google Ads invitation"))
    }

    /// The platform refuses a second invitation for the same email, so a pending one is
    /// removed first and recreated with its own role unless a new role was requested.
    async fn resend_inner(
        &self,
        identifier: &str,
        canonical_role: Option<&str>,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let customer_id = normalize_customer_id(require_external_id(external_account_id)?)?;
        let display_id = format_customer_id(&customer_id);
        let transport = self.transport(credential).await?;

        let invitations = transport
            .search(&customer_id, QUERY_PENDING_INVITATIONS)
            .await?;
        let pending = find_entity_by_email(&invitations, "customerUserAccessInvitation", email);
        let role = match (canonical_role, pending) {
            (Some(role), _) => self.roles.effective_canonical(role),
            (None, Some(entity)) => self
                .roles
                .to_canonical(&parse_access_role(entity.get("accessRole"))),
            (None, None) => self.roles.default_role().to_string(),
        };

        if let Some(resource) = pending.and_then(|e| str_field(e, "resourceName")) {
            let reply = transport
                .mutate_single(
                    &customer_id,
                    "customerUserAccessInvitations",
                    json!({ "remove": resource }),
                )
                .await?;
            if !reply.is_success() && reply.status != StatusCode::NOT_FOUND {
                return Err(reply.to_error("Google Ads invitation withdrawal"));
            }
        }

        let reply = self
            .create_invitation(&transport, &customer_id, email, &role)
            .await?;
        if reply.is_success() {
            return Ok(OperationResult::ok(format!(
                "Invitation resent to {email} for Google Ads account {display_id} with role {role}"
            )));
        }
        if reply.mentions(&[ALREADY_HAS_ACCESS]) {
            return Ok(OperationResult::ok(format!(
                "{email} already accepted access to Google Ads account {display_id}; nothing to resend"
            )));
        }
        Err(reply.to_error("Google Ads invitation"))
    }

    async fn create_invitation(
        &self,
        transport: &GoogleAdsTransport,
        customer_id: &str,
        email: &str,
        role: &str,
    ) -> AppResult<RemoteReply> {
        let native = self.roles.to_native(role);
        let operation = json!({
            "create": { "emailAddress": email, "accessRole": native_to_json(native) }
        });
        let reply = transport
            .mutate_single(customer_id, "customerUserAccessInvitations", operation)
            .await?;
        if reply.is_success() {
            tracing::info!(
                platform = "google_ads",
                customer_id = %customer_id,
                role = %role,
                "access invitation created"
            );
        }
        Ok(reply)
    }

    async fn remove_inner(
        &self,
        identifier: &str,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<OperationResult> {
        let email = require_identifier(identifier)?;
        let customer_id = normalize_customer_id(require_external_id(external_account_id)?)?;
        let display_id = format_customer_id(&customer_id);
        let transport = self.transport(credential).await?;

        let users = transport.search(&customer_id, QUERY_USER_ACCESS).await?;
        if let Some(resource) = find_resource_by_email(&users, "customerUserAccess", email) {
            let reply = transport
                .mutate_single(
                    &customer_id,
                    "customerUserAccesses",
                    json!({ "remove": resource }),
                )
                .await?;
            return removal_outcome(
                reply,
                format!("Removed {email} from Google Ads account {display_id}"),
                email,
                &display_id,
            );
        }

        let invitations = transport
            .search(&customer_id, QUERY_PENDING_INVITATIONS)
            .await?;
        if let Some(resource) =
            find_resource_by_email(&invitations, "customerUserAccessInvitation", email)
        {
            let reply = transport
                .mutate_single(
                    &customer_id,
                    "customerUserAccessInvitations",
                    json!({ "remove": resource }),
                )
                .await?;
            return removal_outcome(
                reply,
                format!("Cancelled pending invitation for {email} on Google Ads account {display_id}"),
                email,
                &display_id,
            );
        }

        Ok(no_access(email, &display_id))
    }

    async fn list_inner(
        &self,
        credential: &AccountCredential,
        external_account_id: &str,
    ) -> AppResult<ListedUsers> {
        let customer_id = normalize_customer_id(require_external_id(external_account_id)?)?;
        let transport = self.transport(credential).await?;

        let mut users: Vec<RemoteAccessRecord> = transport
            .search(&customer_id, QUERY_USER_ACCESS)
            .await?
            .iter()
            .filter_map(|row| self.user_record(row.get("customerUserAccess"), AccessStatus::Active))
            .collect();

        match transport.search(&customer_id, QUERY_PENDING_INVITATIONS).await {
            Ok(rows) => users.extend(rows.iter().filter_map(|row| {
                self.user_record(row.get("customerUserAccessInvitation"), AccessStatus::Pending)
            })),
            Err(err) => partial_query_failed(&customer_id, "pending invitation", err),
        }

        match transport.search(&customer_id, QUERY_MANAGER_LINKS).await {
            Ok(rows) => {
                let links: Vec<(String, AccessStatus)> = rows
                    .iter()
                    .filter_map(|row| row.get("customerManagerLink"))
                    .filter_map(parse_manager_link)
                    .collect();
                let names = manager_names(&transport, &links).await;
                let role = self.roles.to_canonical(&NativeRole::Code(MANAGER_ACCESS_CODE));
                for ((manager_id, status), name) in links.into_iter().zip(names) {
                    let display_id = format_customer_id(&manager_id);
                    let name = name.unwrap_or_else(|| format!("Manager {display_id}"));
                    users.push(RemoteAccessRecord::manager(display_id, name, role.clone(), status));
                }
            }
            Err(err) => partial_query_failed(&customer_id, "manager link", err),
        }

        Ok(ListedUsers { users })
    }

    fn user_record(&self, entity: Option<&Value>, status: AccessStatus) -> Option<RemoteAccessRecord> {
        let entity = entity?;
        let email = str_field(entity, "emailAddress")?;
        let role = self
            .roles
            .to_canonical(&parse_access_role(entity.get("accessRole")));
        Some(RemoteAccessRecord::user(email, role, status))
    }
}

fn parse_manager_link(link: &Value) -> Option<(String, AccessStatus)> {
    let manager_id = normalize_customer_id(str_field(link, "managerCustomer")?).ok()?;
    let raw_status = str_field(link, "status").unwrap_or_default();
    let Some(status) = link_status(raw_status) else {
        tracing::debug!(manager = %manager_id, status = %raw_status, "skipping manager link with unknown status");
        return None;
    };
    Some((manager_id, status))
}

/// Descriptive names for each manager, in input order; `None` where the lookup failed.
async fn manager_names(
    transport: &GoogleAdsTransport,
    links: &[(String, AccessStatus)],
) -> Vec<Option<String>> {
    let semaphore = Arc::new(Semaphore::new(MANAGER_LOOKUP_CONCURRENCY));
    let mut handles = Vec::with_capacity(links.len());
    for (manager_id, _) in links {
        let semaphore = semaphore.clone();
        let transport = transport.clone();
        let manager_id = manager_id.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            manager_name(&transport, &manager_id).await
        }));
    }

    let mut names = Vec::with_capacity(handles.len());
    for handle in handles {
        names.push(handle.await.unwrap_or_else(|join_err| {
            tracing::debug!(error = %join_err, "manager name lookup task failed");
            None
        }));
    }
    names
}

/// Best effort; the manager is queried as itself, which needs the manager as login customer.
async fn manager_name(transport: &GoogleAdsTransport, manager_id: &str) -> Option<String> {
    match transport
        .acting_as(manager_id)
        .search(manager_id, QUERY_DESCRIPTIVE_NAME)
        .await
    {
        Ok(rows) => rows
            .first()
            .and_then(|row| row.get("customer"))
            .and_then(|customer| str_field(customer, "descriptiveName"))
            .map(str::to_string),
        Err(err) => {
            tracing::debug!(manager = %manager_id, error = %err, "manager name lookup failed");
            None
        }
    }
}

fn no_access(email: &str, display_id: &str) -> OperationResult {
    OperationResult::ok(format!(
        "{email} has no access to Google Ads account {display_id}; nothing to remove"
    ))
}

fn removal_outcome(
    reply: RemoteReply,
    success_message: String,
    email: &str,
    display_id: &str,
) -> AppResult<OperationResult> {
    if reply.is_success() {
        return Ok(OperationResult::ok(success_message));
    }
    if reply.status == StatusCode::NOT_FOUND {
        return Ok(no_access(email, display_id));
    }
    Err(reply.to_error("Google Ads access removal"))
}

impl AccessProvider for GoogleAdsAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::GoogleAds
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

    fn resend<'a>(
        &'a self,
        identifier: &'a str,
        canonical_role: Option<&'a str>,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>> {
        Box::pin(self.resend_inner(identifier, canonical_role, credential, external_account_id))
    }

    fn as_listable(&self) -> Option<&dyn ListableProvider> {
        Some(self)
    }
}

impl ListableProvider for GoogleAdsAdapter {
    fn list_users<'a>(
        &'a self,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ListedUsers>> {
        Box::pin(self.list_inner(credential, external_account_id))
    }
}
