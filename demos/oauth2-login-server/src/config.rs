//! Configuration for the OAuth2 login server
//!
//! Values come from, in increasing precedence:
//! - built-in defaults
//! - a TOML file (`config.toml`, or the path in `OAUTH2_LOGIN_CONFIG_FILE`)
//! - `OAUTH2_LOGIN__<SECTION>__<KEY>` environment variables
//! - a handful of legacy variables (`HOST`, `PORT`, `SECRET_KEY`, ...)

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use ras_identity_oauth2::{
    DEFAULT_CALLBACK_PATH, DEFAULT_STATE_TTL_SECONDS, OAuth2Config, OAuth2ProviderConfig,
    ProfileMapping, ProviderKind, RequestContext,
};
use ras_identity_session::transport::{DEFAULT_ACCESS_COOKIE, DEFAULT_REFRESH_COOKIE};
use ras_identity_session::{
    CookieSettings, DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS, SessionConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_STATE_SECRET: &str = "dev-state-secret-change-in-production";
const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-in-production";

const MAX_STATE_TTL_SECONDS: u64 = 24 * 60 * 60;
const MAX_SESSION_TTL_SECONDS: i64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub state: StateConfig,
    pub session: SessionSettings,
    /// Provider tables keyed by registry name
    pub providers: HashMap<String, ProviderSettings>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,

    /// Externally visible origin, used to build provider callback URLs
    pub public_base_url: String,

    pub callback_path: String,

    /// Where the browser lands after a successful login; the state's
    /// `resource` is resolved against it
    pub login_redirect_url: String,

    /// Show detailed callback errors to clients
    pub debug: bool,

    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub secret: String,
    pub ttl_seconds: u64,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub jwt_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_enabled: bool,
    pub refresh_ttl_seconds: i64,
    pub algorithm: String,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub secure_cookies: bool,
    pub csrf_rotation: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub profile_endpoint: Option<String>,
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub auth_params: HashMap<String, String>,
    #[serde(default)]
    pub profile_mapping: Option<ProfileMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or a full filter directive
    pub level: String,

    /// Log format (pretty, json, compact)
    pub format: String,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Generic
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            public_base_url: "http://localhost:3000".to_string(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            login_redirect_url: "http://localhost:3000/".to_string(),
            debug: false,
            cors: CorsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_any_origin: true,
            allowed_origins: vec![],
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_STATE_SECRET.to_string(),
            ttl_seconds: DEFAULT_STATE_TTL_SECONDS,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_enabled: true,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            algorithm: "HS256".to_string(),
            access_cookie_name: DEFAULT_ACCESS_COOKIE.to_string(),
            refresh_cookie_name: DEFAULT_REFRESH_COOKIE.to_string(),
            secure_cookies: false,
            csrf_rotation: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl std::fmt::Debug for StateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateConfig")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("jwt_secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_enabled", &self.refresh_enabled)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("algorithm", &self.algorithm)
            .field("secure_cookies", &self.secure_cookies)
            .field("csrf_rotation", &self.csrf_rotation)
            .finish()
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_endpoint", &self.token_endpoint)
            .finish_non_exhaustive()
    }
}

impl ProviderSettings {
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::Google,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: None,
            authorization_endpoint: None,
            token_endpoint: None,
            profile_endpoint: None,
            request_timeout_seconds: None,
            auth_params: HashMap::new(),
            profile_mapping: None,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("Provider '{}' has no client_id", name);
        }
        if self.request_timeout_seconds == Some(0) {
            anyhow::bail!("Provider '{}' request_timeout_seconds must be positive", name);
        }

        let endpoints = [
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("profile_endpoint", &self.profile_endpoint),
        ];
        for (field, endpoint) in endpoints {
            if let Some(endpoint) = endpoint {
                Url::parse(endpoint)
                    .with_context(|| format!("Provider '{}' has an invalid {}", name, field))?;
            }
        }

        self.to_provider_config(name)?;
        Ok(())
    }

    fn to_provider_config(&self, name: &str) -> Result<OAuth2ProviderConfig> {
        let mut provider = match self.kind {
            ProviderKind::Google => {
                OAuth2ProviderConfig::google(&self.client_id, &self.client_secret)
                    .with_provider_id(name)
            }
            ProviderKind::Generic => OAuth2ProviderConfig::generic(
                name,
                &self.client_id,
                &self.client_secret,
                self.authorization_endpoint
                    .as_deref()
                    .with_context(|| format!("Provider '{}' needs authorization_endpoint", name))?,
                self.token_endpoint
                    .as_deref()
                    .with_context(|| format!("Provider '{}' needs token_endpoint", name))?,
                self.profile_endpoint
                    .as_deref()
                    .with_context(|| format!("Provider '{}' needs profile_endpoint", name))?,
            ),
        };

        // Endpoint overrides also apply to built-in kinds
        if self.kind == ProviderKind::Google {
            let authorization_endpoint = self
                .authorization_endpoint
                .clone()
                .unwrap_or_else(|| provider.authorization_endpoint.clone());
            let token_endpoint = self
                .token_endpoint
                .clone()
                .unwrap_or_else(|| provider.token_endpoint.clone());
            let profile_endpoint = self
                .profile_endpoint
                .clone()
                .unwrap_or_else(|| provider.profile_endpoint.clone());
            provider = provider.with_endpoints(authorization_endpoint, token_endpoint, profile_endpoint);
        }
        if let Some(scope) = &self.scope {
            provider = provider.with_scope(scope);
        }
        if let Some(timeout) = self.request_timeout_seconds {
            provider = provider.with_request_timeout(timeout);
        }
        for (key, value) in &self.auth_params {
            provider = provider.with_auth_param(key, value);
        }
        if let Some(mapping) = &self.profile_mapping {
            provider = provider.with_profile_mapping(mapping.clone());
        }

        Ok(provider)
    }
}

impl Config {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path = std::env::var("OAUTH2_LOGIN_CONFIG_FILE")
            .unwrap_or_else(|_| "config.toml".to_string());

        if Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        // e.g. OAUTH2_LOGIN__SERVER__PORT=8080
        builder = builder.add_source(
            Environment::with_prefix("OAUTH2_LOGIN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_env_overrides()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Load configuration from a TOML file only, without consulting the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings: Config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Legacy environment variables
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            info!("Using HOST environment variable");
            self.server.host = host.parse().context("Invalid HOST value")?;
        }

        if let Ok(port) = std::env::var("PORT") {
            info!("Using PORT environment variable");
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Ok(secret) = std::env::var("SECRET_KEY") {
            info!("Using SECRET_KEY environment variable");
            self.state.secret = secret;
        }

        if let Ok(jwt_secret) = std::env::var("JWT_SECRET") {
            info!("Using JWT_SECRET environment variable");
            self.session.jwt_secret = jwt_secret;
        }

        if let (Ok(client_id), Ok(client_secret)) = (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            self.add_builtin_google(client_id, client_secret);
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            info!("Using RUST_LOG environment variable");
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Add the built-in `google` provider unless a `google` table is already configured.
    pub fn add_builtin_google(&mut self, client_id: String, client_secret: String) {
        if self.providers.keys().any(|name| name.eq_ignore_ascii_case("google")) {
            debug!("Configured 'google' provider takes precedence over the built-in default");
            return;
        }
        info!("Enabling built-in Google provider");
        self.providers.insert(
            "google".to_string(),
            ProviderSettings::google(client_id, client_secret),
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        Url::parse(&self.server.public_base_url).context("Invalid server.public_base_url")?;
        Url::parse(&self.server.login_redirect_url)
            .context("Invalid server.login_redirect_url")?;

        if self.state.secret.is_empty() {
            anyhow::bail!("State secret cannot be empty");
        }
        if self.state.ttl_seconds == 0 {
            anyhow::bail!("State TTL must be positive");
        }
        if self.state.ttl_seconds > MAX_STATE_TTL_SECONDS {
            anyhow::bail!("State TTL cannot exceed {} seconds", MAX_STATE_TTL_SECONDS);
        }

        if self.session.jwt_secret.is_empty() {
            anyhow::bail!("JWT secret cannot be empty");
        }
        if !cfg!(debug_assertions)
            && (self.session.jwt_secret == DEFAULT_JWT_SECRET
                || self.state.secret == DEFAULT_STATE_SECRET)
        {
            anyhow::bail!("Secrets must be changed from their defaults in production");
        }
        if self.session.access_ttl_seconds <= 0 {
            anyhow::bail!("Access token TTL must be positive");
        }
        if self.session.access_ttl_seconds > MAX_SESSION_TTL_SECONDS
            || self.session.refresh_ttl_seconds > MAX_SESSION_TTL_SECONDS
        {
            anyhow::bail!("Session TTLs cannot exceed {} seconds", MAX_SESSION_TTL_SECONDS);
        }
        if self.session.refresh_enabled
            && self.session.refresh_ttl_seconds < self.session.access_ttl_seconds
        {
            anyhow::bail!("Refresh token TTL cannot be shorter than the access token TTL");
        }
        SessionConfig::parse_algorithm(&self.session.algorithm)?;

        for (name, provider) in &self.providers {
            provider.validate(name)?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        let is_directive = level_lower.contains('=') || level_lower.contains(',');
        if !is_directive && !valid_levels.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        if !self.server.cors.allow_any_origin && self.server.cors.allowed_origins.is_empty() {
            anyhow::bail!("CORS: If allow_any_origin is false, allowed_origins must be specified");
        }

        if self.providers.is_empty() {
            warn!("No OAuth2 providers configured");
        }

        Ok(())
    }

    pub fn oauth2_config(&self) -> Result<OAuth2Config> {
        let mut oauth2 = OAuth2Config::new(&self.state.secret)
            .with_state_ttl(self.state.ttl_seconds)
            .with_debug(self.server.debug);

        for (name, provider) in &self.providers {
            oauth2 = oauth2.add_provider(provider.to_provider_config(&name.to_lowercase())?);
        }

        Ok(oauth2)
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        let algorithm = SessionConfig::parse_algorithm(&self.session.algorithm)?;

        let access_ttl = SessionConfig::ttl_from_seconds(self.session.access_ttl_seconds)
            .context("Invalid session.access_ttl_seconds")?;
        let refresh_ttl = SessionConfig::ttl_from_seconds(self.session.refresh_ttl_seconds)
            .context("Invalid session.refresh_ttl_seconds")?;

        Ok(SessionConfig::new(&self.session.jwt_secret)
            .with_access_ttl(access_ttl)
            .with_refresh(self.session.refresh_enabled, refresh_ttl)
            .with_algorithm(algorithm))
    }

    pub fn cookie_settings(&self) -> CookieSettings {
        CookieSettings {
            access_cookie_name: self.session.access_cookie_name.clone(),
            refresh_cookie_name: self.session.refresh_cookie_name.clone(),
            secure: self.session.secure_cookies,
            ..Default::default()
        }
    }

    pub fn request_context(&self) -> Result<RequestContext> {
        Ok(RequestContext::new(&self.server.public_base_url)?
            .with_callback_path(&self.server.callback_path))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.server.host, self.server.port))
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.logging.level.contains('=') || self.logging.level.contains(',') {
            self.logging.level.clone()
        } else {
            format!(
                "oauth2_login_server={level},ras_identity_oauth2={level},ras_identity_session={level},tower_http={level},{level}",
                level = self.logging.level
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.session.refresh_cookie_name, "JWT-refresh-token");
    }

    #[test]
    fn test_invalid_config() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        config.server.port = 3000;
        config.session.refresh_ttl_seconds = 10;
        assert!(config.validate().is_err());

        config.session.refresh_enabled = false;
        assert!(config.validate().is_ok());

        config.session.algorithm = "RS256".to_string();
        assert!(config.validate().is_err());

        config.session.algorithm = "HS256".to_string();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        config.logging.format = "json".to_string();
        config.state.secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generic_provider_needs_endpoints() {
        let mut config = Config::default();
        config.providers.insert(
            "okta".to_string(),
            ProviderSettings {
                kind: ProviderKind::Generic,
                ..ProviderSettings::google("id", "secret")
            },
        );
        assert!(config.validate().is_err());

        let okta = config.providers.get_mut("okta").unwrap();
        okta.authorization_endpoint = Some("https://okta.example.com/authorize".to_string());
        okta.token_endpoint = Some("https://okta.example.com/token".to_string());
        okta.profile_endpoint = Some("https://okta.example.com/userinfo".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl_upper_bounds() {
        let mut config = Config::default();
        config.state.ttl_seconds = 10_000_000_000_000_000;
        assert!(config.validate().is_err());

        config.state.ttl_seconds = MAX_STATE_TTL_SECONDS;
        config.session.access_ttl_seconds = 9_000_000_000_000;
        config.session.refresh_ttl_seconds = 9_000_000_000_000;
        assert!(config.validate().is_err());
        assert!(config.session_config().is_ok());

        config.session.access_ttl_seconds = i64::MAX;
        assert!(config.session_config().is_err());

        config.session.access_ttl_seconds = 300;
        config.session.refresh_ttl_seconds = MAX_SESSION_TTL_SECONDS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_timeout_and_endpoint_urls() {
        let mut corp = ProviderSettings::google("id", "secret");
        corp.kind = ProviderKind::Generic;
        corp.authorization_endpoint = Some("https://sso.corp.example/authorize".to_string());
        corp.token_endpoint = Some("https://sso.corp.example/token".to_string());
        corp.profile_endpoint = Some("https://sso.corp.example/userinfo".to_string());

        let mut config = Config::default();
        config.providers.insert("corp".to_string(), corp.clone());
        assert!(config.validate().is_ok());

        let mut zero_timeout = corp.clone();
        zero_timeout.request_timeout_seconds = Some(0);
        config.providers.insert("corp".to_string(), zero_timeout);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_seconds"));

        let mut relative = corp.clone();
        relative.token_endpoint = Some("/oauth2/token".to_string());
        config.providers.insert("corp".to_string(), relative);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid token_endpoint"));

        let mut google = ProviderSettings::google("id", "secret");
        google.profile_endpoint = Some("not a url".to_string());
        config.providers.clear();
        config.providers.insert("google".to_string(), google);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builtin_google_yields_to_configured_table() {
        let mut config = Config::default();
        config.add_builtin_google("env-id".to_string(), "env-secret".to_string());
        assert_eq!(config.providers["google"].client_id, "env-id");

        let mut config = Config::default();
        config
            .providers
            .insert("Google".to_string(), ProviderSettings::google("file-id", "s"));
        config.add_builtin_google("env-id".to_string(), "env-secret".to_string());
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers["Google"].client_id, "file-id");
    }

    #[test]
    fn test_oauth2_config_conversion() {
        let mut config = Config::default();
        config.server.debug = true;
        let mut google = ProviderSettings::google("id", "secret");
        google.token_endpoint = Some("http://127.0.0.1:9999/token".to_string());
        google
            .auth_params
            .insert("prompt".to_string(), "consent".to_string());
        config.providers.insert("Google".to_string(), google);

        let oauth2 = config.oauth2_config().unwrap();
        assert!(oauth2.debug);
        let provider = &oauth2.providers["google"];
        assert_eq!(provider.provider_id, "google");
        assert_eq!(provider.token_endpoint, "http://127.0.0.1:9999/token");
        assert_eq!(
            provider.authorization_endpoint,
            "https://accounts.google.com/o/oauth2/v2/auth"
        );
        assert_eq!(provider.auth_params["prompt"], "consent");
    }

    #[test]
    fn test_log_filter() {
        let mut config = Config::default();
        assert!(config.log_filter().contains("ras_identity_oauth2=info"));

        config.logging.level = "warn,tower_http=debug".to_string();
        assert_eq!(config.log_filter(), "warn,tower_http=debug");
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let mut config = Config::default();
        config.state.secret = "state-secret-value".to_string();
        config.session.jwt_secret = "jwt-secret-value".to_string();
        config
            .providers
            .insert("google".to_string(), ProviderSettings::google("id", "client-secret-value"));

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("state-secret-value"));
        assert!(!rendered.contains("jwt-secret-value"));
        assert!(!rendered.contains("client-secret-value"));
    }
}
