//! HTTP plumbing shared by the concrete providers.

use crate::config::OAuth2ProviderConfig;
use crate::error::{OAuth2Result, ProviderError};
use crate::provider::RequestContext;
use crate::types::{RawProfile, TokenExchangeResult};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use tracing::{debug, error, info};
use url::Url;

/// OAuth2 client for the outbound legs of the authorization code flow.
///
/// Wraps one pooled `reqwest::Client`; every request carries the provider's
/// own timeout. Dropping a pending call future aborts the request.
#[derive(Clone)]
pub struct OAuth2HttpClient {
    http_client: Client,
}

impl OAuth2HttpClient {
    pub fn new() -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("ras-identity-oauth2/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http_client })
    }

    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }

    /// Build the authorization URL for a provider.
    pub fn authorization_url(
        &self,
        provider_config: &OAuth2ProviderConfig,
        redirect_uri: &Url,
        encoded_state: &str,
    ) -> OAuth2Result<Url> {
        let mut url = Url::parse(&provider_config.authorization_endpoint)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &provider_config.client_id);
            params.append_pair("response_type", "code");
            params.append_pair("scope", &provider_config.scope);
            params.append_pair("redirect_uri", redirect_uri.as_str());
            params.append_pair("state", encoded_state);

            let mut extra: Vec<_> = provider_config.auth_params.iter().collect();
            extra.sort();
            for (key, value) in extra {
                params.append_pair(key, value);
            }
        }

        debug!(
            "Generated authorization URL for provider {}",
            provider_config.provider_id
        );

        Ok(url)
    }

    /// Exchange authorization code for an access token
    pub async fn exchange_code(
        &self,
        provider_config: &OAuth2ProviderConfig,
        code: &str,
        redirect_uri: &Url,
    ) -> Result<TokenExchangeResult, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("scope", provider_config.scope.as_str()),
            ("client_id", provider_config.client_id.as_str()),
            ("client_secret", provider_config.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(&provider_config.token_endpoint)
            .header(ACCEPT, "application/json")
            .form(&params)
            .timeout(provider_config.request_timeout())
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let body = read_json_body(response, "Token exchange").await?;

        let token = TokenExchangeResult::from_raw(body).ok_or_else(|| {
            ProviderError::InvalidResponse("token response has no access_token".to_string())
        })?;

        info!(
            "Exchanged authorization code for provider {}",
            provider_config.provider_id
        );
        Ok(token)
    }

    /// Get the raw profile using an access token
    pub async fn fetch_profile(
        &self,
        provider_config: &OAuth2ProviderConfig,
        access_token: &str,
    ) -> Result<RawProfile, ProviderError> {
        let response = self
            .http_client
            .get(&provider_config.profile_endpoint)
            .header(ACCEPT, "application/json")
            .bearer_auth(access_token)
            .timeout(provider_config.request_timeout())
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let profile = read_json_body(response, "Profile request").await?;

        debug!(
            "Fetched profile for provider {}",
            provider_config.provider_id
        );
        Ok(profile)
    }
}

/// A provider configuration bound to the shared HTTP client.
///
/// Carries the three outbound legs every concrete provider performs the same
/// way; providers only differ in how they normalize the profile.
#[derive(Clone)]
pub(crate) struct ProviderEndpoints {
    name: String,
    config: OAuth2ProviderConfig,
    client: OAuth2HttpClient,
}

impl ProviderEndpoints {
    pub(crate) fn new(config: OAuth2ProviderConfig, client: OAuth2HttpClient) -> Self {
        Self {
            name: config.provider_id.to_lowercase(),
            config,
            client,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &OAuth2ProviderConfig {
        &self.config
    }

    pub(crate) fn authorization_url(
        &self,
        ctx: &RequestContext,
        encoded_state: &str,
    ) -> OAuth2Result<Url> {
        let redirect_uri = ctx.callback_url(&self.name);
        self.client
            .authorization_url(&self.config, &redirect_uri, encoded_state)
    }

    pub(crate) async fn exchange_code(
        &self,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<TokenExchangeResult, ProviderError> {
        let redirect_uri = ctx.callback_url(&self.name);
        self.client
            .exchange_code(&self.config, code, &redirect_uri)
            .await
    }

    pub(crate) async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<RawProfile, ProviderError> {
        self.client.fetch_profile(&self.config, access_token).await
    }
}

async fn read_json_body(
    response: reqwest::Response,
    operation: &str,
) -> Result<Map<String, Value>, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(ProviderError::from_transport)?;

    if !status.is_success() {
        error!("{} failed with status {}", operation, status);
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProviderError::InvalidResponse(format!(
            "{} response is not a JSON object",
            operation
        ))),
        Err(e) => Err(ProviderError::InvalidResponse(e.to_string())),
    }
}
