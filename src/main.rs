use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daredash::{
    abuse::AbuseConfig, api, auth::AdminConfig, broadcast, content::ContentSet,
    digest::{DigestConfig, DigestService}, state::AppState, types::TimingConfig,
};

/// Listener and file locations
#[derive(Debug, Clone)]
struct ServerConfig {
    port: u16,
    static_dir: PathBuf,
    themes_dir: PathBuf,
    themes_file: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl ServerConfig {
    fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(3000);
        Self {
            port,
            static_dir: env_or("STATIC_DIR", "public").into(),
            themes_dir: env_or("THEMES_DIR", "public/data/themes").into(),
            themes_file: env_or("THEMES_FILE", "public/data/themes.json").into(),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daredash=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dare Dash...");

    let server = ServerConfig::from_env();
    let content = ContentSet::load(&server.themes_dir, &server.themes_file);
    if content.is_empty() {
        tracing::warn!("No themes loaded; games will start with an empty menu");
    }

    let admin_config = Arc::new(AdminConfig::from_env());
    let digest = DigestService::new(DigestConfig::from_env());

    let state = Arc::new(AppState::new_with(
        content,
        TimingConfig::from_env(),
        AbuseConfig::from_env(),
        digest,
    ));

    // Expire idle rooms and notify their clients
    broadcast::spawn_room_sweeper(state.clone());

    // Keep the rate-limit table bounded
    broadcast::spawn_rate_limit_pruner(state.clone());

    // Daily usage digest
    broadcast::spawn_digest_scheduler(state.clone());

    let app = api::router(state, admin_config, &server.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], server.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
