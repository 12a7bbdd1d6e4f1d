//! OAuth2 login server
//!
//! Serves provider login links, handles the provider callbacks, and issues
//! session cookies plus rotating refresh tokens for completed logins.

pub mod config;
pub mod error;
pub mod handlers;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use axum::{
    Router,
    extract::{Query, State},
    routing::{get, post},
};
use config::{Config, CorsConfig};
use handlers::LinkQuery;
use ras_identity_oauth2::{
    CallbackOrchestrator, LoginLinks, OAuth2HttpClient, ProviderRegistry, RequestContext,
    StateCodec, UuidCsrfRotator,
};
use ras_identity_session::{CookieSettings, SessionService};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub links: Arc<LoginLinks>,
    pub orchestrator: Arc<CallbackOrchestrator>,
    pub sessions: Arc<SessionService>,
    pub cookies: CookieSettings,
    pub request_context: RequestContext,
    pub login_redirect_url: Url,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let oauth2 = config.oauth2_config()?;
        let http_client = OAuth2HttpClient::new()?;

        let registry = Arc::new(
            ProviderRegistry::from_config(&oauth2, http_client)
                .context("Failed to build the OAuth2 provider registry")?,
        );
        let codec = Arc::new(
            StateCodec::with_ttl_seconds(&oauth2.state_secret, oauth2.state_ttl_seconds)
                .context("Invalid state TTL")?,
        );

        let mut orchestrator =
            CallbackOrchestrator::new(registry.clone(), codec.clone()).with_debug(oauth2.debug);
        if config.session.csrf_rotation {
            orchestrator = orchestrator.with_csrf_rotator(Arc::new(UuidCsrfRotator));
        }

        let sessions = SessionService::new(config.session_config()?);

        Ok(Self {
            links: Arc::new(LoginLinks::new(registry, codec)),
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(sessions),
            cookies: config.cookie_settings(),
            request_context: config.request_context()?,
            login_redirect_url: Url::parse(&config.server.login_redirect_url)
                .context("Invalid server.login_redirect_url")?,
        })
    }
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if cors.allow_any_origin {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the application router.
///
/// `/auth/links/{provider}` is mounted once per registered provider.
pub fn build_router(state: AppState, cors: &CorsConfig) -> Router {
    let callback_route = format!(
        "/{}/{{provider}}",
        state.request_context.callback_path.trim_matches('/')
    );

    let mut router: Router<AppState> = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/links", get(handlers::all_links))
        .route("/auth/login/{provider}", get(handlers::login_redirect))
        .route(&callback_route, get(handlers::callback))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/refresh/status", post(handlers::refresh_status))
        .route("/auth/logout", post(handlers::logout));

    let providers: Vec<String> = state
        .links
        .registry()
        .names()
        .map(String::from)
        .collect();

    for provider in providers {
        let path = format!("/auth/links/{}", provider);
        info!("Mounting login link route {}", path);

        router = router.route(
            &path,
            get(
                move |State(state): State<AppState>, Query(query): Query<LinkQuery>| {
                    let provider = provider.clone();
                    async move { handlers::provider_link(state, provider, query).await }
                },
            ),
        );
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors))
        .with_state(state)
}

/// Install the global tracing subscriber.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_filter())
        .context("Invalid log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialise tracing: {}", e))
}
