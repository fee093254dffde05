//! CleanTabs - bookmark organizer API server

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cleantabs::{
    api::{self, AppState},
    config::Config,
    db,
    services::create_mailer,
};

/// Rate limiter windows are swept this often
const RATE_LIMIT_CLEANUP: Duration = Duration::from_secs(5 * 60);
/// Expired sessions and sign-in links are deleted this often
const TOKEN_CLEANUP: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cleantabs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CleanTabs {}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = std::env::var("CLEANTABS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path.display());
    if config.auth.admin_emails.is_empty() {
        tracing::warn!("No admin emails configured, /api/admin is unreachable by session");
    }
    if config.auth.uses_default_secret() {
        tracing::warn!(
            "auth.secret is still the built-in default; set it (or CLEANTABS_AUTH_SECRET) before exposing this server"
        );
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let mailer = create_mailer(&config.email)?;
    tracing::info!(
        "Email delivery: {}",
        if config.email.enabled { "smtp" } else { "log only" }
    );

    let state = AppState::new(pool, &config, mailer);
    spawn_cleanup_tasks(&state);

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Periodic housekeeping: the rate limiter every 5 minutes, expired
/// sessions and magic links every hour.
fn spawn_cleanup_tasks(state: &AppState) {
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = interval(RATE_LIMIT_CLEANUP);
        loop {
            ticker.tick().await;
            let removed = limiter.cleanup().await;
            tracing::debug!(removed, "Rate limiter cleanup");
        }
    });

    let users = state.user_service.clone();
    let magic_links = Arc::clone(&state.magic_link_service);
    tokio::spawn(async move {
        let mut ticker = interval(TOKEN_CLEANUP);
        loop {
            ticker.tick().await;
            match users.cleanup_expired_sessions().await {
                Ok(n) if n > 0 => tracing::info!("Deleted {} expired sessions", n),
                Ok(_) => {}
                Err(e) => tracing::error!("Session cleanup failed: {}", e),
            }
            match magic_links.cleanup_expired().await {
                Ok(n) if n > 0 => tracing::info!("Deleted {} expired sign-in links", n),
                Ok(_) => {}
                Err(e) => tracing::error!("Sign-in link cleanup failed: {}", e),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::warn!("Received SIGTERM, shutting down"),
    }
}
