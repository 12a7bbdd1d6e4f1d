use anyhow::{Context, Result};
use oauth2_login_server::{AppState, build_router, config::Config, init_tracing};
use std::time::Duration;
use tracing::{debug, info, warn};

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_tracing(&config)?;

    info!("Starting OAuth2 login server");
    debug!("Configuration: {:?}", config);

    let state = AppState::from_config(&config)?;
    info!(
        "Registered OAuth2 providers: {:?}",
        state.links.registry().names().collect::<Vec<_>>()
    );
    if config.server.debug {
        warn!("Debug mode is enabled, callback failures will include diagnostics");
    }

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired refresh tokens", purged),
                Err(e) => warn!("Failed to purge refresh tokens: {}", e),
            }
        }
    });

    let app = build_router(state, &config.server.cors);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("OAuth2 login server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
