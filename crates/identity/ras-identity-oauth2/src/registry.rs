//! Name to provider mapping, fixed at startup.

use crate::client::OAuth2HttpClient;
use crate::config::{OAuth2Config, OAuth2ProviderConfig, ProviderKind};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::generic::GenericProvider;
use crate::google::GoogleProvider;
use crate::provider::OAuth2Provider;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read-only registry of login providers, keyed by lowercase name.
///
/// Built once and shared behind an `Arc`; there is no runtime mutation, so
/// lookups need no locking.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn OAuth2Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Build the registry from configuration alone.
    pub fn from_config(config: &OAuth2Config, client: OAuth2HttpClient) -> OAuth2Result<Self> {
        Ok(ProviderRegistryBuilder::from_config(config, client)?.build())
    }

    /// Resolve a provider by name, ignoring case.
    pub fn resolve(&self, name: &str) -> OAuth2Result<Arc<dyn OAuth2Provider>> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| OAuth2Error::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&name.to_lowercase())
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn OAuth2Provider>)> {
        self.providers
            .iter()
            .map(|(name, provider)| (name.as_str(), provider))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: BTreeMap<String, Arc<dyn OAuth2Provider>>,
}

impl ProviderRegistryBuilder {
    /// Start from the configured provider tables, each instantiated according
    /// to its kind. Registrations made afterwards override them.
    pub fn from_config(config: &OAuth2Config, client: OAuth2HttpClient) -> OAuth2Result<Self> {
        let mut builder = Self::default();
        let mut names: Vec<_> = config.providers.keys().collect();
        names.sort();
        for name in names {
            builder = builder.register_config(config.providers[name].clone(), client.clone())?;
        }
        Ok(builder)
    }

    /// Register a provider under `name`. A later registration for the same
    /// lowercase key replaces the earlier one.
    pub fn register(mut self, name: &str, provider: Arc<dyn OAuth2Provider>) -> Self {
        let key = name.to_lowercase();
        if key != provider.name() {
            warn!(
                "Provider registered as '{}' reports name '{}'; callbacks are routed by the reported name",
                key,
                provider.name()
            );
        }
        if self.providers.insert(key.clone(), provider).is_some() {
            info!("OAuth2 provider '{}' overridden", key);
        } else {
            debug!("OAuth2 provider '{}' registered", key);
        }
        self
    }

    /// Instantiate the built-in implementation for `config.kind` and register it.
    pub fn register_config(
        self,
        config: OAuth2ProviderConfig,
        client: OAuth2HttpClient,
    ) -> OAuth2Result<Self> {
        if config.client_id.trim().is_empty() {
            return Err(OAuth2Error::ConfigError(format!(
                "Provider '{}' has no client id",
                config.provider_id
            )));
        }

        let name = config.provider_id.to_lowercase();
        let provider: Arc<dyn OAuth2Provider> = match config.kind {
            ProviderKind::Google => Arc::new(GoogleProvider::new(config, client)),
            ProviderKind::Generic => Arc::new(GenericProvider::new(config, client)),
        };

        Ok(self.register(&name, provider))
    }

    pub fn build(self) -> ProviderRegistry {
        info!(
            "OAuth2 provider registry built with {} provider(s)",
            self.providers.len()
        );
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuth2ProviderConfig;

    fn client() -> OAuth2HttpClient {
        OAuth2HttpClient::new().unwrap()
    }

    fn generic(name: &str) -> OAuth2ProviderConfig {
        OAuth2ProviderConfig::generic(
            name,
            "client",
            "secret",
            "https://idp.example.com/authorize",
            "https://idp.example.com/token",
            "https://idp.example.com/userinfo",
        )
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let config = OAuth2Config::new("secret")
            .add_provider(OAuth2ProviderConfig::google("id", "secret"));
        let registry = ProviderRegistry::from_config(&config, client()).unwrap();

        assert_eq!(registry.resolve("google").unwrap().name(), "google");
        assert_eq!(registry.resolve("Google").unwrap().name(), "google");
        assert!(registry.contains("GOOGLE"));
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve("nonexistent"),
            Err(OAuth2Error::UnknownProvider(name)) if name == "nonexistent"
        ));
    }

    #[test]
    fn test_last_registration_wins() {
        let google = Arc::new(GoogleProvider::new(
            OAuth2ProviderConfig::google("id", "secret"),
            client(),
        ));
        let replacement = Arc::new(GenericProvider::new(generic("google"), client()));

        let registry = ProviderRegistry::builder()
            .register("google", google)
            .register("Google", replacement.clone())
            .build();

        assert_eq!(registry.len(), 1);
        let resolved = registry.resolve("google").unwrap();
        let expected: Arc<dyn OAuth2Provider> = replacement;
        assert!(Arc::ptr_eq(&resolved, &expected));
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = ProviderRegistry::builder()
            .register_config(generic("okta"), client())
            .unwrap()
            .register_config(generic("Auth0"), client())
            .unwrap()
            .register_config(OAuth2ProviderConfig::google("id", "secret"), client())
            .unwrap()
            .build();

        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["auth0", "google", "okta"]
        );
    }

    #[test]
    fn test_programmatic_registration_overrides_config() {
        let config = OAuth2Config::new("secret")
            .add_provider(OAuth2ProviderConfig::google("id", "secret"));
        let custom: Arc<dyn OAuth2Provider> =
            Arc::new(GenericProvider::new(generic("google"), client()));

        let registry = ProviderRegistryBuilder::from_config(&config, client())
            .unwrap()
            .register("google", custom.clone())
            .build();

        assert!(Arc::ptr_eq(&registry.resolve("google").unwrap(), &custom));
    }

    #[test]
    fn test_missing_client_id_is_rejected() {
        let result =
            ProviderRegistry::builder().register_config(OAuth2ProviderConfig::google("", "s"), client());
        assert!(matches!(result, Err(OAuth2Error::ConfigError(_))));
    }
}
