//! Usage: AccessProvider trait definition - the core abstraction over platform access models.
//!
//! Each platform implements `AccessProvider` (invite + remove). Platforms that can enumerate
//! grants also implement `ListableProvider` and expose it through `as_listable`, so callers
//! discover the capability without attempting the call.

use crate::domain::access::{AccountCredential, OperationResult, PlatformType, RemoteAccessRecord};
use crate::shared::error::{AppError, AppResult, ErrorKind};
use futures_core::future::BoxFuture;
use serde::Serialize;

/// Everything reachable from one connected account, hierarchy included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListedUsers {
    pub users: Vec<RemoteAccessRecord>,
}

/// The trait is object-safe so the registry can hand out `Arc<dyn AccessProvider>`.
pub trait AccessProvider: Send + Sync {
    fn platform(&self) -> PlatformType;

    /// Grants `canonical_role` (or the platform default when unmapped).
    ///
    /// "Already has access" is a success. Remote rejections are `TRANSPORT_ERROR`.
    fn invite<'a>(
        &'a self,
        identifier: &'a str,
        canonical_role: &'a str,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>>;

    /// Idempotent: a target without access yields `success: true`.
    fn remove_user<'a>(
        &'a self,
        identifier: &'a str,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>>;

    /// Re-issues an invitation. Platforms that keep pending invitations as their own
    /// resource override this to withdraw and recreate it; the default re-invites.
    ///
    /// `canonical_role` of `None` keeps the role of the pending invitation where known.
    fn resend<'a>(
        &'a self,
        identifier: &'a str,
        canonical_role: Option<&'a str>,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>> {
        self.invite(
            identifier,
            canonical_role.unwrap_or_default(),
            credential,
            external_account_id,
        )
    }

    fn as_listable(&self) -> Option<&dyn ListableProvider> {
        None
    }
}

pub trait ListableProvider: AccessProvider {
    /// Optional sub-queries that fail are logged and omitted, never raised.
    fn list_users<'a>(
        &'a self,
        credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ListedUsers>>;
}

pub(crate) fn require_identifier(identifier: &str) -> AppResult<&str> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            "identifier is required",
        ));
    }
    Ok(trimmed)
}

pub(crate) fn require_external_id(external_account_id: &str) -> AppResult<&str> {
    let trimmed = external_account_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::of(
            ErrorKind::InvalidInput,
            "external account id is required",
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identifier_is_invalid_input() {
        let err = require_identifier("   ").unwrap_err();
        assert!(err.is(ErrorKind::InvalidInput));
        assert_eq!(require_identifier(" a@b.co ").unwrap(), "a@b.co");
    }

    #[test]
    fn blank_external_id_is_invalid_input() {
        assert!(require_external_id("").unwrap_err().is(ErrorKind::InvalidInput));
    }
}
