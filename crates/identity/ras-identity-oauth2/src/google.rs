//! Google OpenID Connect provider.

use crate::client::{OAuth2HttpClient, ProviderEndpoints};
use crate::config::OAuth2ProviderConfig;
use crate::error::{OAuth2Result, ProviderError};
use crate::provider::{OAuth2Provider, RequestContext};
use crate::types::{RawProfile, TokenExchangeResult, claim_str};
use async_trait::async_trait;
use ras_identity_core::NormalizedProfile;
use url::Url;

pub struct GoogleProvider {
    endpoints: ProviderEndpoints,
}

impl GoogleProvider {
    pub fn new(config: OAuth2ProviderConfig, client: OAuth2HttpClient) -> Self {
        Self {
            endpoints: ProviderEndpoints::new(config, client),
        }
    }
}

#[async_trait]
impl OAuth2Provider for GoogleProvider {
    fn name(&self) -> &str {
        self.endpoints.name()
    }

    fn build_authorization_url(
        &self,
        ctx: &RequestContext,
        encoded_state: &str,
    ) -> OAuth2Result<Url> {
        self.endpoints.authorization_url(ctx, encoded_state)
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<TokenExchangeResult, ProviderError> {
        self.endpoints.exchange_code(code, ctx).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<RawProfile, ProviderError> {
        self.endpoints.fetch_profile(access_token).await
    }

    fn normalize_profile(&self, raw: &RawProfile) -> NormalizedProfile {
        let email = claim_str(raw, "email").unwrap_or_default();

        NormalizedProfile {
            first_name: claim_str(raw, "given_name"),
            last_name: claim_str(raw, "family_name"),
            username: email.clone(),
            email,
            profile_picture: claim_str(raw, "picture"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn provider() -> GoogleProvider {
        GoogleProvider::new(
            OAuth2ProviderConfig::google("google-client", "google-secret")
                .with_auth_param("access_type", "offline"),
            OAuth2HttpClient::new().unwrap(),
        )
    }

    fn raw(value: serde_json::Value) -> RawProfile {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_authorization_url() {
        let ctx = RequestContext::new("https://app.example.com").unwrap();
        let url = provider().build_authorization_url(&ctx, "abc.def.ghi").unwrap();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(url.path(), "/o/oauth2/v2/auth");

        let params: HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(params.get("client_id"), Some(&"google-client".into()));
        assert_eq!(params.get("response_type"), Some(&"code".into()));
        assert_eq!(params.get("scope"), Some(&"openid email profile".into()));
        assert_eq!(
            params.get("redirect_uri"),
            Some(&"https://app.example.com/auth/callback/google".into())
        );
        assert_eq!(params.get("state"), Some(&"abc.def.ghi".into()));
        assert_eq!(params.get("access_type"), Some(&"offline".into()));
    }

    #[test]
    fn test_normalize_full_profile() {
        let profile = provider().normalize_profile(&raw(json!({
            "sub": "1234",
            "given_name": "Ann",
            "family_name": "Lee",
            "email": "ann@example.com",
            "email_verified": true,
            "picture": "https://lh3.googleusercontent.com/a/photo.jpg"
        })));

        assert_eq!(
            profile,
            NormalizedProfile {
                first_name: Some("Ann".to_string()),
                last_name: Some("Lee".to_string()),
                username: "ann@example.com".to_string(),
                email: "ann@example.com".to_string(),
                profile_picture: Some("https://lh3.googleusercontent.com/a/photo.jpg".to_string()),
            }
        );
    }

    #[test]
    fn test_normalize_tolerates_missing_fields() {
        let profile = provider().normalize_profile(&raw(json!({"sub": "1234"})));
        assert_eq!(profile, NormalizedProfile::default());

        let profile = provider().normalize_profile(&raw(json!({
            "given_name": 42,
            "email": null
        })));
        assert_eq!(profile.first_name, None);
        assert_eq!(profile.email, "");
    }
}
