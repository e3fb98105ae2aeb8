//! Usage: ProviderRegistry - platform key -> adapter lookup via trait dispatch.
//!
//! A missing entry means the operation is unsupported for that platform; it is not an error.
//! Adding a platform only requires implementing `AccessProvider` and registering it here.

use super::adapters::{
    google_ads::GoogleAdsAdapter, google_analytics::GoogleAnalyticsAdapter,
    google_tag_manager::GoogleTagManagerAdapter, linkedin_ads::LinkedinAdsAdapter,
    meta_ads::MetaAdsAdapter, AdapterContext,
};
use super::credentials::CredentialResolver;
use super::provider_trait::AccessProvider;
use crate::domain::access::PlatformType;
use crate::domain::roles::{RoleMapper, RoleMapping};
use crate::infra::settings::PlatformEndpoints;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    by_platform: HashMap<PlatformType, Arc<dyn AccessProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in adapter over one shared http client and credential resolver.
    pub fn with_default_adapters(
        endpoints: &PlatformEndpoints,
        credentials: Arc<CredentialResolver>,
        roles: &RoleMapper,
        http: reqwest::Client,
    ) -> AppResult<Self> {
        let ctx = AdapterContext::new(http, credentials, endpoints.clone());
        let table = |platform: PlatformType| -> AppResult<RoleMapping> {
            roles.mapping(platform).cloned().ok_or_else(|| {
                AppError::of(
                    ErrorKind::Config,
                    format!("no role table configured for {platform}"),
                )
            })
        };

        let mut registry = Self::new();
        registry.register(Arc::new(GoogleAdsAdapter::new(
            ctx.clone(),
            table(PlatformType::GoogleAds)?,
        )));
        registry.register(Arc::new(GoogleAnalyticsAdapter::new(
            ctx.clone(),
            table(PlatformType::GoogleAnalytics)?,
        )));
        registry.register(Arc::new(GoogleTagManagerAdapter::new(
            ctx.clone(),
            table(PlatformType::GoogleTagManager)?,
        )));
        registry.register(Arc::new(LinkedinAdsAdapter::new(
            ctx.clone(),
            table(PlatformType::LinkedinAds)?,
        )));
        registry.register(Arc::new(MetaAdsAdapter::new(
            ctx,
            table(PlatformType::MetaAds)?,
        )));
        Ok(registry)
    }

    /// Replaces any adapter already registered for the same platform.
    pub fn register(&mut self, provider: Arc<dyn AccessProvider>) {
        self.by_platform.insert(provider.platform(), provider);
    }

    pub fn get(&self, platform: PlatformType) -> Option<Arc<dyn AccessProvider>> {
        self.by_platform.get(&platform).cloned()
    }

    /// Look up by platform key (e.g. "google_ads"); unknown keys are simply unsupported.
    pub fn get_by_key(&self, key: &str) -> Option<Arc<dyn AccessProvider>> {
        self.get(PlatformType::parse(key)?)
    }

    /// Registered platforms with their list capability, in stable order.
    pub fn platforms(&self) -> Vec<(PlatformType, bool)> {
        let mut out: Vec<(PlatformType, bool)> = self
            .by_platform
            .iter()
            .map(|(platform, provider)| (*platform, provider.as_listable().is_some()))
            .collect();
        out.sort_by_key(|(platform, _)| *platform);
        out
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::access::credentials::StaticCredentialSource;
    use crate::shared::time::SystemClock;
    use std::time::Duration;

    fn registry() -> ProviderRegistry {
        let credentials = Arc::new(CredentialResolver::new(
            Arc::new(StaticCredentialSource::default()),
            Arc::new(SystemClock),
            Duration::from_secs(60),
        ));
        ProviderRegistry::with_default_adapters(
            &PlatformEndpoints::default(),
            credentials,
            &RoleMapper::builtin().unwrap(),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn registry_has_five_providers() {
        let reg = registry();
        for platform in PlatformType::ALL {
            let provider = reg.get(platform).expect("registered");
            assert_eq!(provider.platform(), platform);
        }
    }

    #[test]
    fn registry_lookup_by_key() {
        let reg = registry();
        assert!(reg.get_by_key("google_ads").is_some());
        assert!(reg.get_by_key("LINKEDIN_ADS").is_some());
        assert!(reg.get_by_key("tiktok_ads").is_none());
    }

    #[test]
    fn list_capability_is_discoverable_without_calling() {
        let reg = registry();
        let caps: HashMap<PlatformType, bool> = reg.platforms().into_iter().collect();
        assert!(caps[&PlatformType::GoogleAds]);
        assert!(caps[&PlatformType::GoogleAnalytics]);
        assert!(caps[&PlatformType::GoogleTagManager]);
        assert!(caps[&PlatformType::LinkedinAds]);
        assert!(!caps[&PlatformType::MetaAds]);
    }

    #[test]
    fn empty_registry_reports_unsupported() {
        let reg = ProviderRegistry::new();
        assert!(reg.get(PlatformType::MetaAds).is_none());
        assert!(reg.platforms().is_empty());
    }
}
