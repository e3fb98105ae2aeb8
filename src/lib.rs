mod domain;
mod gateway;
mod infra;
mod service;
mod shared;
mod sync;
pub mod test_support;

pub use domain::access::{
    identity_key, merge_access_records, AccessKind, AccessStatus, AccountCredential,
    BulkItemResult, BulkResult, ConnectedAccount, OperationResult, PlatformType,
    RemoteAccessRecord,
};
pub use domain::roles::{
    privilege_rank, NativeRole, RoleMapper, RoleMapping, RoleTableOverride, ROLE_ADMIN, ROLE_ANALYST,
    ROLE_EMAIL_ONLY, ROLE_READ_ONLY, ROLE_STANDARD,
};
pub use gateway::access::credentials::{
    Credential, CredentialResolver, CredentialSource, EnvCredentialSource,
    StaticCredentialSource, FIELD_GOOGLE_ADS_DEVELOPER_TOKEN, FIELD_GOOGLE_CLIENT_ID,
    FIELD_GOOGLE_CLIENT_SECRET, FIELD_LINKEDIN_CLIENT_ID, FIELD_LINKEDIN_CLIENT_SECRET,
};
pub use gateway::access::http::build_http_client;
pub use gateway::access::provider_trait::{AccessProvider, ListableProvider, ListedUsers};
pub use gateway::access::registry::ProviderRegistry;
pub use gateway::access::{CONFIG_BUSINESS_ID, CONFIG_LOGIN_CUSTOMER_ID};
pub use infra::logging::{init as init_logging, LoggingGuard};
pub use infra::settings::{
    parse as parse_settings, read as read_settings, AccessSyncSettings, LoggingSettings,
    PlatformEndpoints,
};
pub use infra::store::{AccessStore, MemoryAccessStore};
pub use service::{AccessSyncService, UserListing};
pub use shared::error::{AppError, AppResult, ErrorKind};
pub use shared::time::{Clock, ManualClock, SystemClock};
pub use sync::bulk::{retry_failed, BulkExecutor, BulkItem, BulkOperation};
pub use sync::reconcile::{AccountError, ReconcileReport, ReconciledAccount, Reconciler};

/// Re-exported so embedders can hand a token to `reconcile_with_cancel`.
pub use tokio_util::sync::CancellationToken;
