//! Usage: Platform access adapters, credential lifecycle and provider lookup.
//!
//! Uses the Adapter Design Pattern: each platform implements `AccessProvider`,
//! registered in `ProviderRegistry` for dynamic dispatch.

pub(crate) mod adapters;
pub mod credentials;
pub mod http;
pub mod provider_trait;
pub mod registry;
pub(crate) mod token_exchange;

pub use adapters::google_ads::CONFIG_LOGIN_CUSTOMER_ID;
pub use adapters::meta_ads::CONFIG_BUSINESS_ID;
