//! Usage: Access-sync settings (schema + TOML read/sanitize helpers).

use crate::domain::roles::RoleTableOverride;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SCHEMA_VERSION: u32 = 2;
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u32 = 30;
pub const DEFAULT_RECONCILE_CONCURRENCY: u32 = 4;
pub const DEFAULT_BULK_CONCURRENCY: u32 = 4;
pub const DEFAULT_CREDENTIAL_TTL_SECONDS: u32 = 60;
const MAX_HTTP_TIMEOUT_SECONDS: u32 = 5 * 60;
const MAX_RECONCILE_CONCURRENCY: u32 = 16;
const MAX_BULK_CONCURRENCY: u32 = 16;
const MAX_CREDENTIAL_TTL_SECONDS: u32 = 60 * 60;
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_LOG_FILE_PREFIX: &str = "access-sync";

const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_GOOGLE_ADS_BASE_URL: &str = "https://googleads.googleapis.com";
const DEFAULT_GOOGLE_ADS_API_VERSION: &str = "v17";
const DEFAULT_GOOGLE_ANALYTICS_BASE_URL: &str = "https://analyticsadmin.googleapis.com";
const DEFAULT_GOOGLE_TAG_MANAGER_BASE_URL: &str = "https://tagmanager.googleapis.com";
const DEFAULT_LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const DEFAULT_LINKEDIN_BASE_URL: &str = "https://api.linkedin.com";
const DEFAULT_LINKEDIN_VERSION: &str = "202406";
const DEFAULT_META_GRAPH_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_META_GRAPH_VERSION: &str = "v19.0";

/// Remote endpoints per platform; overridable so tests can point at a mock server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformEndpoints {
    pub google_token_url: String,
    pub google_ads_base_url: String,
    pub google_ads_api_version: String,
    pub google_analytics_base_url: String,
    pub google_tag_manager_base_url: String,
    pub linkedin_token_url: String,
    pub linkedin_base_url: String,
    pub linkedin_version: String,
    pub meta_graph_base_url: String,
    pub meta_graph_version: String,
}

impl Default for PlatformEndpoints {
    fn default() -> Self {
        Self {
            google_token_url: DEFAULT_GOOGLE_TOKEN_URL.to_string(),
            google_ads_base_url: DEFAULT_GOOGLE_ADS_BASE_URL.to_string(),
            google_ads_api_version: DEFAULT_GOOGLE_ADS_API_VERSION.to_string(),
            google_analytics_base_url: DEFAULT_GOOGLE_ANALYTICS_BASE_URL.to_string(),
            google_tag_manager_base_url: DEFAULT_GOOGLE_TAG_MANAGER_BASE_URL.to_string(),
            linkedin_token_url: DEFAULT_LINKEDIN_TOKEN_URL.to_string(),
            linkedin_base_url: DEFAULT_LINKEDIN_BASE_URL.to_string(),
            linkedin_version: DEFAULT_LINKEDIN_VERSION.to_string(),
            meta_graph_base_url: DEFAULT_META_GRAPH_BASE_URL.to_string(),
            meta_graph_version: DEFAULT_META_GRAPH_VERSION.to_string(),
        }
    }
}

impl PlatformEndpoints {
    /// Points every platform (and both token endpoints) at one base URL.
    pub fn all_at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            google_token_url: format!("{base}/token"),
            google_ads_base_url: base.to_string(),
            google_analytics_base_url: base.to_string(),
            google_tag_manager_base_url: base.to_string(),
            linkedin_token_url: format!("{base}/oauth/v2/accessToken"),
            linkedin_base_url: base.to_string(),
            meta_graph_base_url: base.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    // EnvFilter directive; RUST_LOG takes precedence when set.
    pub filter: String,
    // Daily-rolling log files are written here when set.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSyncSettings {
    pub schema_version: u32,
    pub http_timeout_seconds: u32,
    pub reconcile_concurrency: u32,
    pub bulk_concurrency: u32,
    pub credential_ttl_seconds: u32,
    pub endpoints: PlatformEndpoints,
    // Keyed by platform key (e.g. "google_ads"); replaces that platform's built-in table.
    pub role_overrides: BTreeMap<String, RoleTableOverride>,
    pub logging: LoggingSettings,
}

impl Default for AccessSyncSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECONDS,
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
            credential_ttl_seconds: DEFAULT_CREDENTIAL_TTL_SECONDS,
            endpoints: PlatformEndpoints::default(),
            role_overrides: BTreeMap::new(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AccessSyncSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.http_timeout_seconds))
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.credential_ttl_seconds))
    }
}

fn clamp_nonzero(value: &mut u32, default: u32, max: u32) -> bool {
    if *value == 0 {
        *value = default;
        return true;
    }
    if *value > max {
        *value = max;
        return true;
    }
    false
}

fn sanitize_endpoint(value: &mut String, default: &str) -> bool {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        *value = default.to_string();
        return true;
    }
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
        return true;
    }
    false
}

fn sanitize_endpoints(endpoints: &mut PlatformEndpoints) -> bool {
    let defaults = PlatformEndpoints::default();
    let mut changed = false;
    changed |= sanitize_endpoint(&mut endpoints.google_token_url, &defaults.google_token_url);
    changed |= sanitize_endpoint(
        &mut endpoints.google_ads_base_url,
        &defaults.google_ads_base_url,
    );
    changed |= sanitize_endpoint(
        &mut endpoints.google_ads_api_version,
        &defaults.google_ads_api_version,
    );
    changed |= sanitize_endpoint(
        &mut endpoints.google_analytics_base_url,
        &defaults.google_analytics_base_url,
    );
    changed |= sanitize_endpoint(
        &mut endpoints.google_tag_manager_base_url,
        &defaults.google_tag_manager_base_url,
    );
    changed |= sanitize_endpoint(&mut endpoints.linkedin_token_url, &defaults.linkedin_token_url);
    changed |= sanitize_endpoint(&mut endpoints.linkedin_base_url, &defaults.linkedin_base_url);
    changed |= sanitize_endpoint(&mut endpoints.linkedin_version, &defaults.linkedin_version);
    changed |= sanitize_endpoint(
        &mut endpoints.meta_graph_base_url,
        &defaults.meta_graph_base_url,
    );
    changed |= sanitize_endpoint(
        &mut endpoints.meta_graph_version,
        &defaults.meta_graph_version,
    );
    changed
}

/// Clamps out-of-range values back into their supported range. Returns true if anything changed.
pub fn sanitize(settings: &mut AccessSyncSettings) -> bool {
    let mut changed = false;

    changed |= clamp_nonzero(
        &mut settings.http_timeout_seconds,
        DEFAULT_HTTP_TIMEOUT_SECONDS,
        MAX_HTTP_TIMEOUT_SECONDS,
    );
    changed |= clamp_nonzero(
        &mut settings.reconcile_concurrency,
        DEFAULT_RECONCILE_CONCURRENCY,
        MAX_RECONCILE_CONCURRENCY,
    );
    changed |= clamp_nonzero(
        &mut settings.bulk_concurrency,
        DEFAULT_BULK_CONCURRENCY,
        MAX_BULK_CONCURRENCY,
    );
    changed |= clamp_nonzero(
        &mut settings.credential_ttl_seconds,
        DEFAULT_CREDENTIAL_TTL_SECONDS,
        MAX_CREDENTIAL_TTL_SECONDS,
    );
    changed |= sanitize_endpoints(&mut settings.endpoints);

    if settings.logging.filter.trim().is_empty() {
        settings.logging.filter = DEFAULT_LOG_FILTER.to_string();
        changed = true;
    }
    if settings.logging.file_prefix.trim().is_empty() {
        settings.logging.file_prefix = DEFAULT_LOG_FILE_PREFIX.to_string();
        changed = true;
    }

    if settings.schema_version != SCHEMA_VERSION {
        settings.schema_version = SCHEMA_VERSION;
        changed = true;
    }

    changed
}

pub fn parse(content: &str) -> AppResult<AccessSyncSettings> {
    let mut settings: AccessSyncSettings = toml::from_str(content).map_err(|e| {
        AppError::of(ErrorKind::Config, format!("failed to parse settings: {e}")).with_source(e)
    })?;
    if sanitize(&mut settings) {
        tracing::debug!("settings contained out-of-range values; sanitized");
    }
    Ok(settings)
}

/// Reads settings from a TOML file; a missing file yields defaults.
pub fn read(path: &Path) -> AppResult<AccessSyncSettings> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "settings file not found; using defaults");
        return Ok(AccessSyncSettings::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::of(
            ErrorKind::Config,
            format!("failed to read settings {}: {e}", path.display()),
        )
        .with_source(e)
    })?;
    parse(&content)
}
