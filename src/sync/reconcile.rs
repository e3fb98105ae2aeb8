//! Usage: Reconciliation orchestrator (list every connected account of a tenant, merge, upsert).
//!
//! Accounts run with bounded fan-out. Each account runs in its own task so a failure, timeout
//! or panic is captured as that account's error entry and never reaches its siblings.

use crate::domain::access::{merge_access_records, ConnectedAccount, PlatformType, RemoteAccessRecord};
use crate::gateway::access::registry::ProviderRegistry;
use crate::infra::store::AccessStore;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountError {
    pub account_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledAccount {
    pub account_id: String,
    pub platform: PlatformType,
    pub users: Vec<RemoteAccessRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub accounts_reconciled: usize,
    pub reconciled: Vec<ReconciledAccount>,
    pub errors: Vec<AccountError>,
    /// Accounts never started because the pass was cancelled.
    pub cancelled: Vec<String>,
}

pub struct Reconciler {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn AccessStore>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn AccessStore>, concurrency: usize) -> Self {
        Self {
            registry,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Fails only when the tenant's accounts cannot be loaded; per-account failures are
    /// reported in `errors`.
    pub async fn reconcile(&self, tenant_id: &str, cancel: &CancellationToken) -> AppResult<ReconcileReport> {
        let accounts = self.store.connected_accounts(tenant_id).await?;
        tracing::info!(tenant_id = %tenant_id, accounts = accounts.len(), "reconciliation started");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut report = ReconcileReport::default();
        let mut handles = Vec::with_capacity(accounts.len());

        for account in accounts {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled.push(account.account_id);
                continue;
            };

            let registry = self.registry.clone();
            let store = self.store.clone();
            let account_id = account.account_id.clone();
            let platform = account.platform;
            let handle = tokio::spawn(async move {
                let _permit = permit;
                reconcile_account(&registry, store.as_ref(), &account).await
            });
            handles.push((account_id, platform, handle));
        }

        for (account_id, platform, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(AppError::of(
                    ErrorKind::Internal,
                    format!("reconcile task failed: {join_err}"),
                )),
            };
            match outcome {
                Ok(users) => report.reconciled.push(ReconciledAccount {
                    account_id,
                    platform,
                    users,
                }),
                Err(err) => {
                    tracing::warn!(
                        account_id = %account_id,
                        platform = %platform,
                        error = %err,
                        "account reconciliation failed"
                    );
                    report.errors.push(AccountError {
                        account_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        report.accounts_reconciled = report.reconciled.len();
        tracing::info!(
            tenant_id = %tenant_id,
            reconciled = report.accounts_reconciled,
            failed = report.errors.len(),
            cancelled = report.cancelled.len(),
            "reconciliation finished"
        );
        Ok(report)
    }
}

async fn reconcile_account(
    registry: &ProviderRegistry,
    store: &dyn AccessStore,
    account: &ConnectedAccount,
) -> AppResult<Vec<RemoteAccessRecord>> {
    let provider = registry.get(account.platform).ok_or_else(|| {
        AppError::of(
            ErrorKind::Unsupported,
            format!("no adapter registered for {}", account.platform.display_name()),
        )
    })?;
    let listable = provider.as_listable().ok_or_else(|| {
        AppError::of(
            ErrorKind::Unsupported,
            format!("{} does not support listing users", account.platform.display_name()),
        )
    })?;

    let credential = store.account_credential(&account.account_id).await?;
    let listed = listable
        .list_users(&credential, &account.external_account_id)
        .await?;
    let merged = merge_access_records(listed.users);
    store
        .upsert_access_records(&account.account_id, &merged)
        .await?;
    Ok(merged)
}
