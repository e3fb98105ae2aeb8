//! Usage: Caller-facing facade (single-item operations, listing, reconciliation, bulk runs).

use crate::domain::access::{merge_access_records, BulkResult, OperationResult, RemoteAccessRecord};
use crate::domain::roles::RoleMapper;
use crate::gateway::access::credentials::{CredentialResolver, CredentialSource};
use crate::gateway::access::http::build_http_client;
use crate::gateway::access::registry::ProviderRegistry;
use crate::infra::settings::AccessSyncSettings;
use crate::infra::store::AccessStore;
use crate::shared::error::AppResult;
use crate::shared::time::SystemClock;
use crate::sync::bulk::{BulkExecutor, BulkItem, BulkOperation};
use crate::sync::reconcile::{ReconcileReport, Reconciler};
use crate::sync::{resolve_target, unsupported_message};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserListing {
    pub users: Vec<RemoteAccessRecord>,
    /// False when the platform has no adapter or its adapter cannot enumerate users.
    pub supported: bool,
}

pub struct AccessSyncService {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn AccessStore>,
    credentials: Option<Arc<CredentialResolver>>,
    reconciler: Reconciler,
    bulk: BulkExecutor,
}

impl AccessSyncService {
    /// Wires the built-in adapters from settings.
    pub fn from_settings(
        settings: &AccessSyncSettings,
        source: Arc<dyn CredentialSource>,
        store: Arc<dyn AccessStore>,
    ) -> AppResult<Self> {
        let roles = RoleMapper::with_overrides(&settings.role_overrides)?;
        let http = build_http_client(settings.http_timeout())?;
        let credentials = Arc::new(CredentialResolver::new(
            source,
            Arc::new(SystemClock),
            settings.credential_ttl(),
        ));
        let registry = ProviderRegistry::with_default_adapters(
            &settings.endpoints,
            credentials.clone(),
            &roles,
            http,
        )?;

        let mut service = Self::new(
            Arc::new(registry),
            store,
            settings.reconcile_concurrency as usize,
            settings.bulk_concurrency as usize,
        );
        service.credentials = Some(credentials);
        Ok(service)
    }

    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn AccessStore>,
        reconcile_concurrency: usize,
        bulk_concurrency: usize,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(registry.clone(), store.clone(), reconcile_concurrency),
            bulk: BulkExecutor::new(registry.clone(), store.clone(), bulk_concurrency),
            registry,
            store,
            credentials: None,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Drops cached application credentials so the next call refetches them.
    pub fn invalidate_credentials(&self) {
        if let Some(credentials) = &self.credentials {
            credentials.invalidate();
        }
    }

    pub async fn invite(
        &self,
        platform_type: &str,
        email: &str,
        canonical_role: &str,
        account_id: &str,
    ) -> AppResult<OperationResult> {
        let Some(target) =
            resolve_target(&self.registry, self.store.as_ref(), platform_type, account_id).await?
        else {
            return Ok(OperationResult::failed(unsupported_message(platform_type)));
        };
        tracing::info!(platform = %platform_type, account_id = %account_id, "invite requested");
        target
            .provider
            .invite(
                email,
                canonical_role,
                &target.credential,
                &target.account.external_account_id,
            )
            .await
    }

    pub async fn remove(
        &self,
        platform_type: &str,
        email: &str,
        account_id: &str,
    ) -> AppResult<OperationResult> {
        let Some(target) =
            resolve_target(&self.registry, self.store.as_ref(), platform_type, account_id).await?
        else {
            return Ok(OperationResult::failed(unsupported_message(platform_type)));
        };
        tracing::info!(platform = %platform_type, account_id = %account_id, "removal requested");
        target
            .provider
            .remove_user(email, &target.credential, &target.account.external_account_id)
            .await
    }

    /// Deduplicated users of one account; `supported: false` instead of an error when the
    /// platform cannot enumerate.
    pub async fn list_users(&self, platform_type: &str, account_id: &str) -> AppResult<UserListing> {
        let listable = self
            .registry
            .get_by_key(platform_type)
            .is_some_and(|p| p.as_listable().is_some());
        if !listable {
            return Ok(UserListing::default());
        }
        let Some(target) =
            resolve_target(&self.registry, self.store.as_ref(), platform_type, account_id).await?
        else {
            return Ok(UserListing::default());
        };
        let Some(lister) = target.provider.as_listable() else {
            return Ok(UserListing::default());
        };
        let listed = lister
            .list_users(&target.credential, &target.account.external_account_id)
            .await?;
        Ok(UserListing {
            users: merge_access_records(listed.users),
            supported: true,
        })
    }

    pub async fn reconcile(&self, tenant_id: &str) -> AppResult<ReconcileReport> {
        self.reconciler
            .reconcile(tenant_id, &CancellationToken::new())
            .await
    }

    /// Stops starting new accounts once `cancel` fires; in-flight accounts finish.
    pub async fn reconcile_with_cancel(
        &self,
        tenant_id: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ReconcileReport> {
        self.reconciler.reconcile(tenant_id, cancel).await
    }

    pub async fn bulk_remove(&self, items: &[BulkItem]) -> BulkResult {
        self.bulk.execute(BulkOperation::Remove, items).await
    }

    pub async fn bulk_resend(&self, items: &[BulkItem]) -> BulkResult {
        self.bulk.execute(BulkOperation::Resend, items).await
    }

    pub async fn bulk_invite(&self, items: &[BulkItem]) -> BulkResult {
        self.bulk.execute(BulkOperation::Invite, items).await
    }
}
