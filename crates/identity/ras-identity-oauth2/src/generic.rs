//! Configurable provider for any OAuth2 "Authorization Code" identity provider.

use crate::client::{OAuth2HttpClient, ProviderEndpoints};
use crate::config::OAuth2ProviderConfig;
use crate::error::{OAuth2Result, ProviderError};
use crate::provider::{OAuth2Provider, RequestContext};
use crate::types::{RawProfile, TokenExchangeResult, claim_str};
use async_trait::async_trait;
use ras_identity_core::NormalizedProfile;
use url::Url;

/// Provider whose profile normalization follows the configured [`crate::ProfileMapping`].
pub struct GenericProvider {
    endpoints: ProviderEndpoints,
}

impl GenericProvider {
    pub fn new(config: OAuth2ProviderConfig, client: OAuth2HttpClient) -> Self {
        Self {
            endpoints: ProviderEndpoints::new(config, client),
        }
    }
}

#[async_trait]
impl OAuth2Provider for GenericProvider {
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
        let mapping = &self.endpoints.config().profile_mapping;
        let email = claim_str(raw, &mapping.email_field).unwrap_or_default();
        let username = claim_str(raw, &mapping.username_field).unwrap_or_else(|| email.clone());

        NormalizedProfile {
            first_name: claim_str(raw, &mapping.first_name_field),
            last_name: claim_str(raw, &mapping.last_name_field),
            username,
            email,
            profile_picture: claim_str(raw, &mapping.picture_field),
        }
    }
}
