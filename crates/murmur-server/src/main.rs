use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use murmur_api::AppStateInner;
use murmur_db::Database;
use murmur_gateway::Gateway;
use murmur_gateway::auth::JwtAuthenticator;
use murmur_server::config::ServerConfig;
use murmur_server::routes::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);

    let authenticator = Arc::new(JwtAuthenticator::new(&config.jwt_secret, db.clone()));
    let gateway = Gateway::new(db.clone(), db.clone(), authenticator, config.gateway.clone());

    let state = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.token_ttl_days,
        gateway,
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Murmur server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
