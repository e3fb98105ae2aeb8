//! Usage: Per-platform canonical <-> native role tables with a declared default role.
//!
//! Built-in tables describe the roles each platform exposes; settings may replace a
//! platform's table wholesale. Lookups never fail: unknown values resolve to the
//! platform default.

use crate::domain::access::PlatformType;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_STANDARD: &str = "STANDARD";
pub const ROLE_ANALYST: &str = "ANALYST";
pub const ROLE_READ_ONLY: &str = "READ_ONLY";
pub const ROLE_EMAIL_ONLY: &str = "EMAIL_ONLY";

/// A platform's own role representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeRole {
    Code(i64),
    Name(String),
}

impl NativeRole {
    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    pub fn as_code(&self) -> Option<i64> {
        match self {
            Self::Code(code) => Some(*code),
            Self::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Code(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

impl std::fmt::Display for NativeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

pub fn normalize_canonical(role: &str) -> String {
    role.trim().to_ascii_uppercase()
}

// Highest privilege last.
const PRIVILEGE_ORDER: &[&str] = &[
    ROLE_EMAIL_ONLY,
    ROLE_READ_ONLY,
    ROLE_ANALYST,
    ROLE_STANDARD,
    ROLE_ADMIN,
];

/// Position of a canonical role in the privilege order; roles outside it rank lowest.
pub fn privilege_rank(canonical: &str) -> usize {
    let key = normalize_canonical(canonical);
    PRIVILEGE_ORDER
        .iter()
        .position(|r| *r == key)
        .map_or(0, |i| i + 1)
}

/// Bidirectional role table for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMapping {
    forward: BTreeMap<String, NativeRole>,
    reverse: HashMap<NativeRole, String>,
    default_role: String,
    default_native: NativeRole,
}

impl RoleMapping {
    pub fn new<I, S>(default_role: &str, entries: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (S, NativeRole)>,
        S: AsRef<str>,
    {
        let mut forward = BTreeMap::new();
        let mut reverse = HashMap::new();
        for (canonical, native) in entries {
            let canonical = normalize_canonical(canonical.as_ref());
            if canonical.is_empty() {
                return Err(AppError::of(
                    ErrorKind::Config,
                    "role table contains an empty canonical role",
                ));
            }
            if let Some(previous) = reverse.insert(native.clone(), canonical.clone()) {
                return Err(AppError::of(
                    ErrorKind::Config,
                    format!("native role {native} is mapped by both {previous} and {canonical}"),
                ));
            }
            if forward.insert(canonical.clone(), native).is_some() {
                return Err(AppError::of(
                    ErrorKind::Config,
                    format!("canonical role {canonical} is declared twice"),
                ));
            }
        }

        let default_role = normalize_canonical(default_role);
        let default_native = forward.get(&default_role).cloned().ok_or_else(|| {
            AppError::of(
                ErrorKind::Config,
                format!("default role {default_role} is not part of the role table"),
            )
        })?;

        Ok(Self {
            forward,
            reverse,
            default_role,
            default_native,
        })
    }

    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    pub fn canonical_roles(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }

    /// Canonical role as it will actually be applied (unmapped input becomes the default).
    pub fn effective_canonical(&self, canonical: &str) -> String {
        let key = normalize_canonical(canonical);
        if self.forward.contains_key(&key) {
            key
        } else {
            self.default_role.clone()
        }
    }

    /// Whether an existing native grant already gives at least `requested`.
    pub fn covers(&self, existing: &NativeRole, requested: &str) -> bool {
        privilege_rank(&self.to_canonical(existing))
            >= privilege_rank(&self.effective_canonical(requested))
    }

    pub fn to_native(&self, canonical: &str) -> &NativeRole {
        let key = normalize_canonical(canonical);
        match self.forward.get(&key) {
            Some(native) => native,
            None => {
                tracing::debug!(role = %key, default = %self.default_role, "unmapped canonical role; using default");
                &self.default_native
            }
        }
    }

    pub fn to_canonical(&self, native: &NativeRole) -> String {
        match self.reverse.get(native) {
            Some(canonical) => canonical.clone(),
            None => {
                tracing::debug!(native = %native, default = %self.default_role, "unmapped native role; using default");
                self.default_role.clone()
            }
        }
    }
}

/// Settings override for one platform's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTableOverride {
    pub default: String,
    pub roles: BTreeMap<String, NativeRole>,
}

/// Role tables for every platform.
#[derive(Debug, Clone)]
pub struct RoleMapper {
    tables: BTreeMap<PlatformType, RoleMapping>,
}

impl RoleMapper {
    pub fn builtin() -> AppResult<Self> {
        let mut tables = BTreeMap::new();
        for platform in PlatformType::ALL {
            tables.insert(platform, builtin_mapping(platform)?);
        }
        Ok(Self { tables })
    }

    pub fn with_overrides(overrides: &BTreeMap<String, RoleTableOverride>) -> AppResult<Self> {
        let mut mapper = Self::builtin()?;
        for (key, table) in overrides {
            let platform = PlatformType::parse(key).ok_or_else(|| {
                AppError::of(
                    ErrorKind::Config,
                    format!("role override names unknown platform {key:?}"),
                )
            })?;
            let mapping = RoleMapping::new(&table.default, table.roles.clone())?;
            mapper.tables.insert(platform, mapping);
        }
        Ok(mapper)
    }

    pub fn mapping(&self, platform: PlatformType) -> Option<&RoleMapping> {
        self.tables.get(&platform)
    }
}

fn builtin_mapping(platform: PlatformType) -> AppResult<RoleMapping> {
    match platform {
        // Google Ads AccessRole enum values.
        PlatformType::GoogleAds => RoleMapping::new(
            ROLE_READ_ONLY,
            [
                (ROLE_ADMIN, NativeRole::Code(2)),
                (ROLE_STANDARD, NativeRole::Code(3)),
                (ROLE_READ_ONLY, NativeRole::Code(4)),
                (ROLE_EMAIL_ONLY, NativeRole::Code(5)),
            ],
        ),
        PlatformType::GoogleAnalytics => RoleMapping::new(
            ROLE_READ_ONLY,
            [
                (ROLE_ADMIN, NativeRole::name("predefinedRoles/admin")),
                (ROLE_STANDARD, NativeRole::name("predefinedRoles/editor")),
                (ROLE_ANALYST, NativeRole::name("predefinedRoles/analyst")),
                (ROLE_READ_ONLY, NativeRole::name("predefinedRoles/viewer")),
            ],
        ),
        PlatformType::GoogleTagManager => RoleMapping::new(
            ROLE_READ_ONLY,
            [
                (ROLE_ADMIN, NativeRole::name("admin")),
                (ROLE_READ_ONLY, NativeRole::name("user")),
            ],
        ),
        PlatformType::LinkedinAds => RoleMapping::new(
            ROLE_READ_ONLY,
            [
                (ROLE_ADMIN, NativeRole::name("ACCOUNT_MANAGER")),
                (ROLE_STANDARD, NativeRole::name("CAMPAIGN_MANAGER")),
                (ROLE_READ_ONLY, NativeRole::name("VIEWER")),
            ],
        ),
        PlatformType::MetaAds => RoleMapping::new(
            ROLE_STANDARD,
            [
                (ROLE_ADMIN, NativeRole::name("ADMIN")),
                (ROLE_STANDARD, NativeRole::name("EMPLOYEE")),
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_grants_cover_equal_or_lower_requests() {
        let mapper = RoleMapper::builtin().unwrap();
        let gtm = mapper.mapping(PlatformType::GoogleTagManager).unwrap();
        assert!(gtm.covers(&NativeRole::name("admin"), ROLE_READ_ONLY));
        assert!(gtm.covers(&NativeRole::name("admin"), ROLE_ADMIN));
        assert!(!gtm.covers(&NativeRole::name("user"), ROLE_ADMIN));

        let ga = mapper.mapping(PlatformType::GoogleAnalytics).unwrap();
        assert!(!ga.covers(&NativeRole::name("predefinedRoles/viewer"), "admin"));
        assert!(ga.covers(&NativeRole::name("predefinedRoles/editor"), ROLE_ANALYST));
        assert!(privilege_rank("nonsense") < privilege_rank(ROLE_EMAIL_ONLY));
    }

    #[test]
    fn every_builtin_table_roundtrips_its_roles() {
        let mapper = RoleMapper::builtin().expect("builtin tables");
        for platform in PlatformType::ALL {
            let mapping = mapper.mapping(platform).expect("table present");
            for role in mapping.canonical_roles() {
                let native = mapping.to_native(role);
                assert_eq!(mapping.to_canonical(native), role, "{platform} {role}");
            }
        }
    }

    #[test]
    fn google_ads_codes_are_fixed() {
        let mapper = RoleMapper::builtin().unwrap();
        let ads = mapper.mapping(PlatformType::GoogleAds).unwrap();
        assert_eq!(ads.to_native("admin"), &NativeRole::Code(2));
        assert_eq!(ads.to_native("STANDARD"), &NativeRole::Code(3));
        assert_eq!(ads.to_native("READ_ONLY"), &NativeRole::Code(4));
        assert_eq!(ads.to_native("EMAIL_ONLY"), &NativeRole::Code(5));
    }

    #[test]
    fn unmapped_values_fall_back_to_default() {
        let mapper = RoleMapper::builtin().unwrap();
        for platform in PlatformType::ALL {
            let mapping = mapper.mapping(platform).unwrap();
            let default = mapping.default_role().to_string();
            assert_eq!(mapping.to_native("SUPREME_OVERLORD"), mapping.to_native(&default));
            assert_eq!(mapping.to_canonical(&NativeRole::Code(99)), default);
            assert_eq!(mapping.to_canonical(&NativeRole::name("mystery")), default);
            assert_eq!(mapping.effective_canonical(""), default);
        }
    }

    #[test]
    fn duplicate_native_role_is_rejected() {
        let err = RoleMapping::new(
            "A",
            [("A", NativeRole::name("x")), ("B", NativeRole::name("x"))],
        )
        .unwrap_err();
        assert!(err.is(ErrorKind::Config));
    }

    #[test]
    fn default_must_be_in_table() {
        let err = RoleMapping::new("ADMIN", [("VIEWER", NativeRole::Code(1))]).unwrap_err();
        assert!(err.message().contains("default role ADMIN"));
    }

    #[test]
    fn override_replaces_platform_table() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "google_tag_manager".to_string(),
            RoleTableOverride {
                default: "read_only".to_string(),
                roles: BTreeMap::from([
                    ("ADMIN".to_string(), NativeRole::name("admin")),
                    ("READ_ONLY".to_string(), NativeRole::name("user")),
                    ("NONE".to_string(), NativeRole::name("noAccess")),
                ]),
            },
        );
        let mapper = RoleMapper::with_overrides(&overrides).unwrap();
        let gtm = mapper.mapping(PlatformType::GoogleTagManager).unwrap();
        assert_eq!(gtm.to_canonical(&NativeRole::name("noAccess")), "NONE");
    }

    #[test]
    fn override_for_unknown_platform_is_config_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "myspace".to_string(),
            RoleTableOverride {
                default: "A".to_string(),
                roles: BTreeMap::from([("A".to_string(), NativeRole::Code(1))]),
            },
        );
        let err = RoleMapper::with_overrides(&overrides).unwrap_err();
        assert!(err.is(ErrorKind::Config));
    }
}
