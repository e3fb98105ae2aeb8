//! Usage: Application-level credential cache (TTL-bound, lazily refetched, swapped atomically).
//!
//! Readers always see either the previous complete value or a freshly fetched one. A refetch
//! race between callers may fetch twice; the source is a pure read so that is harmless.

use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::lock_ext::RwLockExt;
use crate::shared::time::Clock;
use futures_core::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

pub const FIELD_GOOGLE_CLIENT_ID: &str = "google_client_id";
pub const FIELD_GOOGLE_CLIENT_SECRET: &str = "google_client_secret";
pub const FIELD_GOOGLE_ADS_DEVELOPER_TOKEN: &str = "google_ads_developer_token";
pub const FIELD_LINKEDIN_CLIENT_ID: &str = "linkedin_client_id";
pub const FIELD_LINKEDIN_CLIENT_SECRET: &str = "linkedin_client_secret";

const ENV_PREFIX: &str = "ACCESS_SYNC_";

/// Slow configuration source for platform-wide secrets.
pub trait CredentialSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, AppResult<HashMap<String, String>>>;
}

/// Reads `ACCESS_SYNC_<FIELD>` environment variables (field names lower-cased).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialSource;

impl CredentialSource for EnvCredentialSource {
    fn fetch(&self) -> BoxFuture<'_, AppResult<HashMap<String, String>>> {
        Box::pin(async move {
            let fields: HashMap<String, String> = std::env::vars()
                .filter_map(|(key, value)| {
                    let field = key.strip_prefix(ENV_PREFIX)?;
                    let value = value.trim();
                    if field.is_empty() || value.is_empty() {
                        return None;
                    }
                    Some((field.to_ascii_lowercase(), value.to_string()))
                })
                .collect();
            Ok(fields)
        })
    }
}

/// Fixed set of fields, for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialSource {
    fields: HashMap<String, String>,
}

impl StaticCredentialSource {
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl CredentialSource for StaticCredentialSource {
    fn fetch(&self) -> BoxFuture<'_, AppResult<HashMap<String, String>>> {
        let fields = self.fields.clone();
        Box::pin(async move { Ok(fields) })
    }
}

/// One snapshot of application credentials. Never mutated after construction.
pub struct Credential {
    fields: HashMap<String, String>,
    expires_at: Instant,
}

impl Credential {
    pub fn field(&self, name: &str) -> AppResult<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::of(
                    ErrorKind::Config,
                    format!("application credential field {name} is not configured"),
                )
            })
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.fields.keys().collect();
        names.sort();
        f.debug_struct("Credential")
            .field("fields", &names)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct CredentialResolver {
    source: Arc<dyn CredentialSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cached: RwLock<Option<Arc<Credential>>>,
}

impl CredentialResolver {
    pub fn new(source: Arc<dyn CredentialSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            cached: RwLock::new(None),
        }
    }

    fn cached_if_fresh(&self, now: Instant) -> Option<Arc<Credential>> {
        let cached = self.cached.read_or_recover();
        cached
            .as_ref()
            .filter(|c| c.expires_at > now)
            .map(Arc::clone)
    }

    /// Returns the cached credential, refetching from the source once it has expired.
    pub async fn get(&self) -> AppResult<Arc<Credential>> {
        let now = self.clock.now();
        if let Some(credential) = self.cached_if_fresh(now) {
            return Ok(credential);
        }

        tracing::debug!(ttl_secs = self.ttl.as_secs(), "fetching application credentials");
        let fields = self.source.fetch().await.map_err(|err| {
            AppError::of(
                ErrorKind::Config,
                format!("application credentials unavailable: {}", err.message()),
            )
            .with_source(err)
        })?;

        let fresh = Arc::new(Credential {
            fields,
            expires_at: self.clock.now() + self.ttl,
        });
        *self.cached.write_or_recover() = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    pub fn invalidate(&self) {
        *self.cached.write_or_recover() = None;
    }
}
