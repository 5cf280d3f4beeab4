pub mod auth;
pub mod client;
pub mod registry;

pub use auth::HttpAuthService;
pub use client::ApiClient;
pub use registry::HttpRegistry;

use crate::config::AppConfig;
use crate::core::credentials::CredentialStore;
use crate::utils::error::Result;
use std::sync::Arc;

/// Auth service and registry sharing one credential store.
#[derive(Debug, Clone)]
pub struct RegistryClients {
    pub auth: Arc<HttpAuthService>,
    pub registry: HttpRegistry,
    pub credentials: Arc<CredentialStore>,
}

impl RegistryClients {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let credentials = Arc::new(CredentialStore::new());
        let base = ApiClient::new(
            config.api.base_url.clone(),
            config.api.timeout(),
            credentials.clone(),
        )?
        .with_skew(config.api.token_skew());

        let auth = Arc::new(HttpAuthService::new(base.clone()));
        let registry = HttpRegistry::new(base.with_auth(auth.clone()));

        Ok(Self {
            auth,
            registry,
            credentials,
        })
    }
}
