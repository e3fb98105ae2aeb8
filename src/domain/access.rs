//! Usage: Platform-neutral access model (records, results, credentials) and record merging.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformType {
    GoogleAds,
    GoogleAnalytics,
    GoogleTagManager,
    LinkedinAds,
    MetaAds,
}

impl PlatformType {
    pub const ALL: [PlatformType; 5] = [
        Self::GoogleAds,
        Self::GoogleAnalytics,
        Self::GoogleTagManager,
        Self::LinkedinAds,
        Self::MetaAds,
    ];

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "google_ads" => Some(Self::GoogleAds),
            "google_analytics" => Some(Self::GoogleAnalytics),
            "google_tag_manager" => Some(Self::GoogleTagManager),
            "linkedin_ads" => Some(Self::LinkedinAds),
            "meta_ads" => Some(Self::MetaAds),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoogleAds => "google_ads",
            Self::GoogleAnalytics => "google_analytics",
            Self::GoogleTagManager => "google_tag_manager",
            Self::LinkedinAds => "linkedin_ads",
            Self::MetaAds => "meta_ads",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::GoogleAds => "Google Ads",
            Self::GoogleAnalytics => "Google Analytics",
            Self::GoogleTagManager => "Google Tag Manager",
            Self::LinkedinAds => "LinkedIn Ads",
            Self::MetaAds => "Meta Ads",
        }
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    Active,
    Pending,
    Refused,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessKind {
    User,
    Manager,
}

/// One access grant as seen on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccessRecord {
    pub identifier: String,
    pub display_name: Option<String>,
    /// Canonical role name.
    pub role: String,
    pub status: AccessStatus,
    pub kind: AccessKind,
}

impl RemoteAccessRecord {
    pub fn user(identifier: impl Into<String>, role: impl Into<String>, status: AccessStatus) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: None,
            role: role.into(),
            status,
            kind: AccessKind::User,
        }
    }

    pub fn manager(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        role: impl Into<String>,
        status: AccessStatus,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: Some(display_name.into()),
            role: role.into(),
            status,
            kind: AccessKind::Manager,
        }
    }

    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn identity_key(&self) -> String {
        identity_key(&self.identifier)
    }
}

/// Outcome of a single invite or removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub id: String,
    pub success: bool,
    pub message: String,
}

/// One entry per requested item, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    pub results: Vec<BulkItemResult>,
}

impl BulkResult {
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Per-connection credential owned by the persistence layer; read-only here.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredential {
    pub refresh_token: String,
    #[serde(default)]
    pub platform_config: BTreeMap<String, String>,
}

impl AccountCredential {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            platform_config: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.platform_config.insert(key.into(), value.into());
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.platform_config
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl std::fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredential")
            .field(
                "refresh_token",
                &crate::shared::security::mask_token(&self.refresh_token),
            )
            .field("platform_config", &self.platform_config)
            .finish()
    }
}

/// A platform account linked to a tenant in the local system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub account_id: String,
    pub tenant_id: String,
    pub platform: PlatformType,
    pub external_account_id: String,
}

/// Email-shaped identifiers compare case-insensitively; platform ids compare exactly.
pub fn identity_key(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if trimmed.contains('@') {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Collapses duplicate identifiers, keeping first-seen order.
///
/// ACTIVE wins over any other status for the same identifier, so an invite that
/// shows up both as pending and as accepted is reported once as ACTIVE.
pub fn merge_access_records(records: Vec<RemoteAccessRecord>) -> Vec<RemoteAccessRecord> {
    let mut merged: Vec<RemoteAccessRecord> = Vec::with_capacity(records.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = record.identity_key();
        if key.is_empty() {
            continue;
        }
        match positions.get(&key) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                if record.status == AccessStatus::Active && existing.status != AccessStatus::Active
                {
                    let fallback_name = existing.display_name.take();
                    *existing = record;
                    if existing.display_name.is_none() {
                        existing.display_name = fallback_name;
                    }
                } else if existing.display_name.is_none() {
                    existing.display_name = record.display_name;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(record);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_type_parse_roundtrips_keys() {
        for platform in PlatformType::ALL {
            assert_eq!(PlatformType::parse(platform.as_str()), Some(platform));
        }
        assert_eq!(PlatformType::parse(" Google_Ads "), Some(PlatformType::GoogleAds));
        assert_eq!(PlatformType::parse("tiktok_ads"), None);
    }

    #[test]
    fn pending_then_active_merges_to_active() {
        let merged = merge_access_records(vec![
            RemoteAccessRecord::user("Alice@Example.com", "STANDARD", AccessStatus::Pending),
            RemoteAccessRecord::user("alice@example.com", "STANDARD", AccessStatus::Active),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, AccessStatus::Active);
    }

    #[test]
    fn active_then_pending_keeps_active() {
        let merged = merge_access_records(vec![
            RemoteAccessRecord::user("bob@example.com", "ADMIN", AccessStatus::Active),
            RemoteAccessRecord::user("BOB@example.com", "READ_ONLY", AccessStatus::Pending),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, AccessStatus::Active);
        assert_eq!(merged[0].role, "ADMIN");
    }

    #[test]
    fn platform_ids_are_case_sensitive() {
        let merged = merge_access_records(vec![
            RemoteAccessRecord::user("urn:li:person:AbC", "ADMIN", AccessStatus::Active),
            RemoteAccessRecord::user("urn:li:person:abc", "ADMIN", AccessStatus::Active),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_fills_missing_display_name() {
        let merged = merge_access_records(vec![
            RemoteAccessRecord::user("carol@example.com", "ADMIN", AccessStatus::Pending),
            RemoteAccessRecord::user("carol@example.com", "ADMIN", AccessStatus::Pending)
                .with_display_name(Some("Carol".to_string())),
        ]);
        assert_eq!(merged[0].display_name.as_deref(), Some("Carol"));
    }

    #[test]
    fn account_credential_debug_masks_token() {
        let credential = AccountCredential::new("1//0gAbcdef1234567890");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("Abcdef1234567890"));
    }
}
