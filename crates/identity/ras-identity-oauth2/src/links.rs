//! Login link generation.

use crate::error::OAuth2Result;
use crate::provider::RequestContext;
use crate::registry::ProviderRegistry;
use crate::state::StateCodec;
use crate::types::AuthorizationRequest;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Produces provider authorization URLs carrying signed state.
#[derive(Debug, Clone)]
pub struct LoginLinks {
    registry: Arc<ProviderRegistry>,
    codec: Arc<StateCodec>,
}

impl LoginLinks {
    pub fn new(registry: Arc<ProviderRegistry>, codec: Arc<StateCodec>) -> Self {
        Self { registry, codec }
    }

    /// Authorization URL for one provider.
    ///
    /// The provider is resolved before any state is signed, so an unknown
    /// name fails with [`crate::OAuth2Error::UnknownProvider`] without side effects.
    pub fn login_link(
        &self,
        provider_name: &str,
        request: &AuthorizationRequest,
        ctx: &RequestContext,
    ) -> OAuth2Result<Url> {
        let provider = self.registry.resolve(provider_name)?;
        let encoded_state = self.codec.encode(&request.state_payload())?;
        let url = provider.build_authorization_url(ctx, &encoded_state)?;

        debug!(
            "Login link generated for provider {} (resource: {})",
            provider.name(),
            request.resource
        );
        Ok(url)
    }

    /// Authorization URLs for every registered provider, keyed by provider name.
    pub fn all_links(
        &self,
        request: &AuthorizationRequest,
        ctx: &RequestContext,
    ) -> OAuth2Result<BTreeMap<String, String>> {
        let encoded_state = self.codec.encode(&request.state_payload())?;

        self.registry
            .iter()
            .map(|(name, provider)| {
                let url = provider.build_authorization_url(ctx, &encoded_state)?;
                Ok((name.to_string(), url.to_string()))
            })
            .collect()
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }
}
