//! Usage: Persistence seam (connected accounts, credentials, reconciled records) + in-memory store.

use crate::domain::access::{AccountCredential, ConnectedAccount, RemoteAccessRecord};
use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::lock_ext::MutexExt;
use futures_core::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// The relational system of record, as seen by the access layer.
///
/// Implementations live outside this crate; the core only reads credentials and
/// accounts, and upserts reconciled records keyed by (account, identifier).
pub trait AccessStore: Send + Sync {
    fn connected_accounts<'a>(
        &'a self,
        tenant_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Vec<ConnectedAccount>>>;

    fn connected_account<'a>(
        &'a self,
        account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ConnectedAccount>>;

    fn account_credential<'a>(
        &'a self,
        account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<AccountCredential>>;

    fn upsert_access_records<'a>(
        &'a self,
        account_id: &'a str,
        records: &'a [RemoteAccessRecord],
    ) -> BoxFuture<'a, AppResult<()>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<String, ConnectedAccount>,
    credentials: BTreeMap<String, AccountCredential>,
    // (account_id, identity key) -> record
    records: BTreeMap<(String, String), RemoteAccessRecord>,
}

/// In-process store used by tests and embedders without a database.
#[derive(Debug, Default)]
pub struct MemoryAccessStore {
    state: Mutex<MemoryState>,
}

impl MemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: ConnectedAccount, credential: AccountCredential) {
        let mut state = self.state.lock_or_recover();
        state
            .credentials
            .insert(account.account_id.clone(), credential);
        state.accounts.insert(account.account_id.clone(), account);
    }

    pub fn records_for(&self, account_id: &str) -> Vec<RemoteAccessRecord> {
        let state = self.state.lock_or_recover();
        state
            .records
            .iter()
            .filter(|((owner, _), _)| owner == account_id)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

impl AccessStore for MemoryAccessStore {
    fn connected_accounts<'a>(
        &'a self,
        tenant_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Vec<ConnectedAccount>>> {
        Box::pin(async move {
            let state = self.state.lock_or_recover();
            Ok(state
                .accounts
                .values()
                .filter(|a| a.tenant_id == tenant_id)
                .cloned()
                .collect())
        })
    }

    fn connected_account<'a>(
        &'a self,
        account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ConnectedAccount>> {
        Box::pin(async move {
            let state = self.state.lock_or_recover();
            state.accounts.get(account_id).cloned().ok_or_else(|| {
                AppError::of(
                    ErrorKind::NotFound,
                    format!("connected account {account_id} not found"),
                )
            })
        })
    }

    fn account_credential<'a>(
        &'a self,
        account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<AccountCredential>> {
        Box::pin(async move {
            let state = self.state.lock_or_recover();
            state.credentials.get(account_id).cloned().ok_or_else(|| {
                AppError::of(
                    ErrorKind::Config,
                    format!("no stored credential for account {account_id}"),
                )
            })
        })
    }

    fn upsert_access_records<'a>(
        &'a self,
        account_id: &'a str,
        records: &'a [RemoteAccessRecord],
    ) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock_or_recover();
            for record in records {
                state.records.insert(
                    (account_id.to_string(), record.identity_key()),
                    record.clone(),
                );
            }
            Ok(())
        })
    }
}
