//! OAuth2 configuration types.

use crate::state::DEFAULT_STATE_TTL_SECONDS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_PROFILE_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
pub const GOOGLE_SCOPE: &str = "openid email profile";

pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";

/// Which provider implementation backs a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    Generic,
}

/// Mapping of raw profile fields onto the normalized profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileMapping {
    pub first_name_field: String,
    pub last_name_field: String,
    /// Falls back to the email field when the provider has no such claim
    pub username_field: String,
    pub email_field: String,
    pub picture_field: String,
}

impl Default for ProfileMapping {
    fn default() -> Self {
        Self {
            first_name_field: "given_name".to_string(),
            last_name_field: "family_name".to_string(),
            username_field: "preferred_username".to_string(),
            email_field: "email".to_string(),
            picture_field: "picture".to_string(),
        }
    }
}

/// OAuth2 provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2ProviderConfig {
    pub provider_id: String,
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub profile_endpoint: String,
    pub request_timeout_seconds: u64,
    /// Additional parameters to include in the authorization request
    #[serde(default)]
    pub auth_params: HashMap<String, String>,
    #[serde(default)]
    pub profile_mapping: ProfileMapping,
}

impl std::fmt::Debug for OAuth2ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2ProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("profile_endpoint", &self.profile_endpoint)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("auth_params", &self.auth_params)
            .field("profile_mapping", &self.profile_mapping)
            .finish()
    }
}

impl OAuth2ProviderConfig {
    /// Google with its published endpoints and the `openid email profile` scope.
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            provider_id: "google".to_string(),
            kind: ProviderKind::Google,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: GOOGLE_SCOPE.to_string(),
            authorization_endpoint: GOOGLE_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            profile_endpoint: GOOGLE_PROFILE_ENDPOINT.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            auth_params: HashMap::new(),
            profile_mapping: ProfileMapping::default(),
        }
    }

    /// A generic Authorization Code provider; every endpoint must be supplied.
    pub fn generic(
        provider_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        profile_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            kind: ProviderKind::Generic,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: "openid email profile".to_string(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            profile_endpoint: profile_endpoint.into(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            auth_params: HashMap::new(),
            profile_mapping: ProfileMapping::default(),
        }
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        profile_endpoint: impl Into<String>,
    ) -> Self {
        self.authorization_endpoint = authorization_endpoint.into();
        self.token_endpoint = token_endpoint.into();
        self.profile_endpoint = profile_endpoint.into();
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_params.insert(key.into(), value.into());
        self
    }

    pub fn with_profile_mapping(mut self, mapping: ProfileMapping) -> Self {
        self.profile_mapping = mapping;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// OAuth2 login configuration
#[derive(Clone)]
pub struct OAuth2Config {
    pub state_secret: String,
    pub state_ttl_seconds: u64,
    /// When set, callback failures surface their specific reason instead of "Unauthorized"
    pub debug: bool,
    pub providers: HashMap<String, OAuth2ProviderConfig>,
}

impl std::fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("state_secret", &"<redacted>")
            .field("state_ttl_seconds", &self.state_ttl_seconds)
            .field("debug", &self.debug)
            .field("providers", &self.providers)
            .finish()
    }
}

impl OAuth2Config {
    pub fn new(state_secret: impl Into<String>) -> Self {
        Self {
            state_secret: state_secret.into(),
            state_ttl_seconds: DEFAULT_STATE_TTL_SECONDS,
            debug: false,
            providers: HashMap::new(),
        }
    }

    pub fn add_provider(mut self, config: OAuth2ProviderConfig) -> Self {
        self.providers
            .insert(config.provider_id.to_lowercase(), config);
        self
    }

    pub fn with_state_ttl(mut self, seconds: u64) -> Self {
        self.state_ttl_seconds = seconds;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
