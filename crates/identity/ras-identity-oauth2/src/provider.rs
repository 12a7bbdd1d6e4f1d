//! The capability contract every OAuth2 identity provider satisfies.

use crate::config::DEFAULT_CALLBACK_PATH;
use crate::error::{OAuth2Result, ProviderError};
use crate::types::{RawProfile, TokenExchangeResult};
use async_trait::async_trait;
use ras_identity_core::NormalizedProfile;
use url::Url;

/// Where the current server is reachable, used to build absolute callback URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub base_url: Url,
    pub callback_path: String,
}

impl RequestContext {
    pub fn new(base_url: &str) -> OAuth2Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
        })
    }

    pub fn with_callback_path(mut self, callback_path: impl Into<String>) -> Self {
        self.callback_path = callback_path.into();
        self
    }

    /// `{base_url}{callback_path}/{provider}`, e.g. `https://app.example/auth/callback/google`.
    pub fn callback_url(&self, provider: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}/{}/{}",
            url.path().trim_end_matches('/'),
            self.callback_path.trim_matches('/'),
            provider
        );
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

/// An OAuth2 "Authorization Code" identity provider.
///
/// Network operations must respect the provider's configured timeout and must
/// not hold shared locks while waiting.
#[async_trait]
pub trait OAuth2Provider: Send + Sync {
    /// Registry name, lowercase
    fn name(&self) -> &str;

    /// Absolute URL the provider redirects back to. Contains [`OAuth2Provider::name`].
    fn build_callback_url(&self, ctx: &RequestContext) -> OAuth2Result<Url> {
        Ok(ctx.callback_url(self.name()))
    }

    /// The provider's login page URL carrying `encoded_state`.
    fn build_authorization_url(&self, ctx: &RequestContext, encoded_state: &str)
    -> OAuth2Result<Url>;

    /// Exchange an authorization code for an access token at the token endpoint.
    async fn exchange_code_for_token(
        &self,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<TokenExchangeResult, ProviderError>;

    /// Fetch the raw profile document with a provider access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<RawProfile, ProviderError>;

    /// Map the raw profile onto the generic user data shape. Never fails.
    fn normalize_profile(&self, raw: &RawProfile) -> NormalizedProfile;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_contains_provider_name() {
        let ctx = RequestContext::new("https://app.example.com").unwrap();
        assert_eq!(
            ctx.callback_url("google").as_str(),
            "https://app.example.com/auth/callback/google"
        );
    }

    #[test]
    fn test_callback_url_keeps_base_path() {
        let ctx = RequestContext::new("https://example.com/api/?x=1")
            .unwrap()
            .with_callback_path("/oauth2/callback/");
        assert_eq!(
            ctx.callback_url("github").as_str(),
            "https://example.com/api/oauth2/callback/github"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(RequestContext::new("not a url").is_err());
    }
}
