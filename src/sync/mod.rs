//! Usage: Multi-account orchestration (reconciliation passes, bulk operations).

pub mod bulk;
pub mod reconcile;

use crate::domain::access::{AccountCredential, ConnectedAccount, PlatformType};
use crate::gateway::access::provider_trait::AccessProvider;
use crate::gateway::access::registry::ProviderRegistry;
use crate::infra::store::AccessStore;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use std::sync::Arc;

/// Everything an adapter call on one connected account needs.
pub(crate) struct Target {
    pub(crate) provider: Arc<dyn AccessProvider>,
    pub(crate) account: ConnectedAccount,
    pub(crate) credential: AccountCredential,
}

/// `Ok(None)` when no adapter is registered for `platform_type`.
pub(crate) async fn resolve_target(
    registry: &ProviderRegistry,
    store: &dyn AccessStore,
    platform_type: &str,
    account_id: &str,
) -> AppResult<Option<Target>> {
    let Some(provider) = registry.get_by_key(platform_type) else {
        return Ok(None);
    };
    let account = store.connected_account(account_id).await?;
    ensure_platform(&account, provider.platform())?;
    let credential = store.account_credential(account_id).await?;
    Ok(Some(Target {
        provider,
        account,
        credential,
    }))
}

fn ensure_platform(account: &ConnectedAccount, platform: PlatformType) -> AppResult<()> {
    if account.platform != platform {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            format!(
                "account {} is a {} connection, not {}",
                account.account_id,
                account.platform.display_name(),
                platform.display_name()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn unsupported_message(platform_type: &str) -> String {
    match PlatformType::parse(platform_type) {
        Some(platform) => format!("{} is not supported", platform.display_name()),
        None => format!("platform {platform_type:?} is not supported"),
    }
}
