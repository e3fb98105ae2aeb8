#![allow(dead_code)]

use std::ffi::OsString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use access_sync::{
    AccessProvider, AccessStatus, AccessSyncService, AccessSyncSettings, AccountCredential,
    AppError, AppResult, ConnectedAccount, ErrorKind, ListableProvider, ListedUsers,
    MemoryAccessStore, OperationResult, PlatformEndpoints, PlatformType, ProviderRegistry,
    RemoteAccessRecord, StaticCredentialSource, FIELD_GOOGLE_ADS_DEVELOPER_TOKEN,
    FIELD_GOOGLE_CLIENT_ID, FIELD_GOOGLE_CLIENT_SECRET, FIELD_LINKEDIN_CLIENT_ID,
    FIELD_LINKEDIN_CLIENT_SECRET,
};
use futures_core::future::BoxFuture;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REFRESH_TOKEN: &str = "refresh-abc";
pub const ACCESS_TOKEN: &str = "ya29.test-access";
pub const DEVELOPER_TOKEN: &str = "dev-token-123";

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn save_once(&mut self, key: &'static str) {
        if self.saved.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.saved.push((key, std::env::var_os(key)));
    }

    pub fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self.save_once(key);
        std::env::set_var(key, value.into());
    }

    pub fn remove_var(&mut self, key: &'static str) {
        self.save_once(key);
        std::env::remove_var(key);
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

pub fn app_credentials() -> StaticCredentialSource {
    StaticCredentialSource::new([
        (FIELD_GOOGLE_CLIENT_ID, "google-client"),
        (FIELD_GOOGLE_CLIENT_SECRET, "google-secret"),
        (FIELD_GOOGLE_ADS_DEVELOPER_TOKEN, DEVELOPER_TOKEN),
        (FIELD_LINKEDIN_CLIENT_ID, "linkedin-client"),
        (FIELD_LINKEDIN_CLIENT_SECRET, "linkedin-secret"),
    ])
}

pub fn account(
    account_id: &str,
    tenant_id: &str,
    platform: PlatformType,
    external_account_id: &str,
) -> ConnectedAccount {
    ConnectedAccount {
        account_id: account_id.to_string(),
        tenant_id: tenant_id.to_string(),
        platform,
        external_account_id: external_account_id.to_string(),
    }
}

/// Service wired with the real adapters, every endpoint pointed at `server`.
pub struct TestHarness {
    pub server: MockServer,
    pub store: Arc<MemoryAccessStore>,
    pub service: AccessSyncService,
}

impl TestHarness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryAccessStore::new());
        let settings = AccessSyncSettings {
            http_timeout_seconds: 5,
            endpoints: PlatformEndpoints::all_at(&server.uri()),
            ..AccessSyncSettings::default()
        };
        let service =
            AccessSyncService::from_settings(&settings, Arc::new(app_credentials()), store.clone())
                .expect("service from settings");
        Self {
            server,
            store,
            service,
        }
    }

    pub fn connect(
        &self,
        account_id: &str,
        platform: PlatformType,
        external_account_id: &str,
        credential: AccountCredential,
    ) {
        self.store.insert_account(
            account(account_id, "tenant-1", platform, external_account_id),
            credential,
        );
    }

    pub async fn mount_google_token(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={REFRESH_TOKEN}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": ACCESS_TOKEN,
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_linkedin_token(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": ACCESS_TOKEN,
                "expires_in": 5183999
            })))
            .mount(&self.server)
            .await;
    }
}

/// Scriptable adapter for orchestration tests.
pub struct FakeProvider {
    platform: PlatformType,
    listable: bool,
    users: Vec<RemoteAccessRecord>,
    fail_list: bool,
    fail_marker: Option<String>,
    delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeProvider {
    pub fn listing(platform: PlatformType, users: Vec<RemoteAccessRecord>) -> Self {
        Self {
            platform,
            listable: true,
            users,
            fail_list: false,
            fail_marker: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_list(platform: PlatformType) -> Self {
        Self {
            fail_list: true,
            ..Self::listing(platform, Vec::new())
        }
    }

    pub fn write_only(platform: PlatformType) -> Self {
        Self {
            listable: false,
            ..Self::listing(platform, Vec::new())
        }
    }

    /// Invite/remove fail for identifiers containing `marker`.
    pub fn failing_for(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Counts the call and holds it open for the configured delay.
    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn write(&self, identifier: &str, verb: &str) -> AppResult<OperationResult> {
        self.enter().await;
        if let Some(marker) = &self.fail_marker {
            if identifier.contains(marker.as_str()) {
                return Err(AppError::of(
                    ErrorKind::Transport,
                    format!("remote rejected {identifier}"),
                ));
            }
        }
        Ok(OperationResult::ok(format!("{verb} {identifier}")))
    }
}

impl AccessProvider for FakeProvider {
    fn platform(&self) -> PlatformType {
        self.platform
    }

    fn invite<'a>(
        &'a self,
        identifier: &'a str,
        _canonical_role: &'a str,
        _credential: &'a AccountCredential,
        _external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>> {
        Box::pin(self.write(identifier, "invited"))
    }

    fn remove_user<'a>(
        &'a self,
        identifier: &'a str,
        _credential: &'a AccountCredential,
        _external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<OperationResult>> {
        Box::pin(self.write(identifier, "removed"))
    }

    fn as_listable(&self) -> Option<&dyn ListableProvider> {
        if self.listable {
            Some(self)
        } else {
            None
        }
    }
}

impl ListableProvider for FakeProvider {
    fn list_users<'a>(
        &'a self,
        _credential: &'a AccountCredential,
        external_account_id: &'a str,
    ) -> BoxFuture<'a, AppResult<ListedUsers>> {
        Box::pin(async move {
            self.enter().await;
            if self.fail_list {
                return Err(AppError::of(
                    ErrorKind::Transport,
                    format!("listing {external_account_id} timed out"),
                ));
            }
            Ok(ListedUsers {
                users: self.users.clone(),
            })
        })
    }
}

pub fn registry_of(providers: Vec<Arc<FakeProvider>>) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider);
    }
    Arc::new(registry)
}

pub fn pending(identifier: &str, role: &str) -> RemoteAccessRecord {
    RemoteAccessRecord::user(identifier, role, AccessStatus::Pending)
}

pub fn active(identifier: &str, role: &str) -> RemoteAccessRecord {
    RemoteAccessRecord::user(identifier, role, AccessStatus::Active)
}
