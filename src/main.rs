use std::sync::Arc;

use axum::Router;
use fleetgate::core::auth::{AuthApiState, SessionService, auth_api_router};
use fleetgate::core::config::Config;
use fleetgate::core::db::{
    InMemoryRefreshTokenStore, InMemoryUserDirectory, PgRefreshTokenStore, PgUserRepository,
    RefreshTokenStore, UserDirectory, connect,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        tracing::error!("fleetgate failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing::info!("Config loaded: {:?}", config);

    let cipher = config.payload_cipher()?;
    let codec = config.token_codec();

    let (users, refresh_tokens): (Arc<dyn UserDirectory>, Arc<dyn RefreshTokenStore>) =
        match config.db_config() {
            Some(db_config) => {
                let pool = connect(&db_config).await?;
                (
                    Arc::new(PgUserRepository::new(pool.clone())),
                    Arc::new(PgRefreshTokenStore::new(pool).with_timeout(config.store_timeout)),
                )
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, using in-memory user and refresh token storage"
                );
                (
                    Arc::new(InMemoryUserDirectory::new()),
                    Arc::new(InMemoryRefreshTokenStore::new()),
                )
            }
        };

    let session_service = SessionService::new(users, refresh_tokens, codec, cipher);

    let app = Router::new()
        .merge(auth_api_router(AuthApiState::new(session_service)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
