//! Usage: Bulk invite/remove/resend executor (one result per requested item, input order).

use super::{resolve_target, unsupported_message};
use crate::domain::access::{BulkItemResult, BulkResult, OperationResult};
use crate::gateway::access::registry::ProviderRegistry;
use crate::infra::store::AccessStore;
use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    Invite,
    Remove,
    /// Withdraws and recreates a pending invitation where the platform models one.
    Resend,
}

impl BulkOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::Remove => "remove",
            Self::Resend => "resend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItem {
    pub platform_type: String,
    pub email: String,
    pub account_id: String,
    // Canonical role for invite/resend; the platform default when absent.
    #[serde(default)]
    pub role: Option<String>,
}

impl BulkItem {
    pub fn new(
        platform_type: impl Into<String>,
        email: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            platform_type: platform_type.into(),
            email: email.into(),
            account_id: account_id.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.platform_type, self.account_id, self.email)
    }
}

/// The items whose result failed, pairing results with items by position.
pub fn retry_failed(items: &[BulkItem], previous: &BulkResult) -> Vec<BulkItem> {
    items
        .iter()
        .zip(&previous.results)
        .filter(|(_, result)| !result.success)
        .map(|(item, _)| item.clone())
        .collect()
}

pub struct BulkExecutor {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn AccessStore>,
    concurrency: usize,
}

impl BulkExecutor {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn AccessStore>, concurrency: usize) -> Self {
        Self {
            registry,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Never fails as a whole: every item yields exactly one entry, in input order.
    pub async fn execute(&self, operation: BulkOperation, items: &[BulkItem]) -> BulkResult {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            // The semaphore is never closed, so a permit is always granted.
            let permit = semaphore.clone().acquire_owned().await.ok();
            let registry = self.registry.clone();
            let store = self.store.clone();
            let item = item.clone();
            let id = item.id();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_item(&registry, store.as_ref(), operation, &item).await
            });
            handles.push((id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|join_err| {
                OperationResult::failed(format!("INTERNAL_ERROR: bulk task failed: {join_err}"))
            });
            results.push(BulkItemResult {
                id,
                success: outcome.success,
                message: outcome.message,
            });
        }

        let result = BulkResult { results };
        tracing::info!(
            operation = operation.as_str(),
            requested = items.len(),
            failed = result.failed_count(),
            "bulk operation finished"
        );
        result
    }
}

async fn run_item(
    registry: &ProviderRegistry,
    store: &dyn AccessStore,
    operation: BulkOperation,
    item: &BulkItem,
) -> OperationResult {
    match try_item(registry, store, operation, item).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(
                operation = operation.as_str(),
                platform = %item.platform_type,
                account_id = %item.account_id,
                error = %err,
                "bulk item failed"
            );
            OperationResult::failed(err.to_string())
        }
    }
}

async fn try_item(
    registry: &ProviderRegistry,
    store: &dyn AccessStore,
    operation: BulkOperation,
    item: &BulkItem,
) -> AppResult<OperationResult> {
    let Some(target) = resolve_target(registry, store, &item.platform_type, &item.account_id).await? else {
        return Ok(OperationResult::failed(unsupported_message(&item.platform_type)));
    };
    let external_id = target.account.external_account_id.as_str();
    match operation {
        BulkOperation::Remove => {
            target
                .provider
                .remove_user(&item.email, &target.credential, external_id)
                .await
        }
        BulkOperation::Invite => {
            let role = item.role.as_deref().unwrap_or_default();
            target
                .provider
                .invite(&item.email, role, &target.credential, external_id)
                .await
        }
        BulkOperation::Resend => {
            target
                .provider
                .resend(&item.email, item.role.as_deref(), &target.credential, external_id)
                .await
        }
    }
}
