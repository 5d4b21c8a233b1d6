use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod config;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod utils;

use config::AppConfig;
use middleware::rate_limiter::{RateLimitScope, RateLimiter, ScopedLimiter};
use routes::create_router;
use services::email::{build_mailer, EmailTemplates};
use services::storage::S3MediaStore;
use services::{
    AiGenerator, AuthService, DatabaseService, EmailService, ImageUploader, MediaService,
    RedisCounterStore,
};
use shared::database::{wait_for_database, wait_for_redis};
use shared::observability::{init_logging, LogConfig};
use shared::RetryPolicy;

// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseService,
    pub auth: AuthService,
    pub email: EmailService,
    pub media: MediaService,
    pub ai: AiGenerator,
    pub uploader: ImageUploader,
    pub rate_limiter: Arc<RateLimiter>,
    /// Absent only when running without Redis (tests)
    pub redis: Option<RedisCounterStore>,
}

impl AppState {
    /// Limiter bound to one route scope, for `from_fn_with_state`
    pub fn limiter(&self, scope: RateLimitScope) -> ScopedLimiter {
        ScopedLimiter::new(self.rate_limiter.clone(), scope)
    }
}

fn log_config(config: &AppConfig) -> LogConfig {
    LogConfig {
        level: config.logging.level,
        format: config.logging.format,
        service_name: config.server.project_name.clone(),
        include_line_numbers: !config.server.environment.is_production(),
        include_thread_ids: false,
    }
}

// Connect backing services, prepare the schema and build the state
async fn initialize_state(config: AppConfig) -> Result<AppState> {
    let pool = wait_for_database(&config.database, RetryPolicy::startup())
        .await
        .context("Failed to connect to database")?;
    let db = DatabaseService::new(pool);

    let redis = wait_for_redis(&config.redis.url, RetryPolicy::startup())
        .await
        .map(RedisCounterStore::new)
        .context("Failed to connect to Redis")?;

    sqlx::migrate!("./migrations")
        .run(db.pool())
        .await
        .context("Failed to run database migrations")?;

    let auth = AuthService::new(&config.security);
    let superuser = db
        .init_db(&config.superuser, &config.server.public_url, &auth)
        .await
        .context("Failed to initialize first superuser")?;
    if config.server.environment.is_local() {
        let seeded = db
            .seed_sample_posts(superuser.id)
            .await
            .context("Failed to seed sample posts")?;
        if seeded > 0 {
            info!(seeded, "Seeded sample posts");
        }
    }

    let media = MediaService::new(Arc::new(S3MediaStore::new(&config.storage)), &config.storage);
    if let Err(e) = media.ensure_bucket().await {
        warn!(bucket = %config.storage.bucket_name, error = %e, "Could not ensure media bucket");
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("contentgen-api/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let mailer = build_mailer(&config, http.clone()).context("Failed to configure mailer")?;
    let templates = EmailTemplates::new(&config).context("Failed to load email templates")?;
    let email = EmailService::new(mailer, templates);
    info!(transport = email.transport_name(), "Email transport ready");

    let ai = AiGenerator::new(http, &config, media.clone())
        .context("Failed to load AI prompt templates")?;
    let uploader = ImageUploader::new(
        db.clone(),
        ai.clone(),
        &config.storage,
        &config.server.public_url,
    );

    let rate_limiter = RateLimiter::new(Arc::new(redis.clone()), &config.rate_limits)
        .map_err(anyhow::Error::msg)
        .context("Invalid rate limit configuration")?;

    info!("All services initialized successfully");
    Ok(AppState {
        config: Arc::new(config),
        db,
        auth,
        email,
        media,
        ai,
        uploader,
        rate_limiter: Arc::new(rate_limiter),
        redis: Some(redis),
    })
}

// Graceful shutdown on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(log_config(&config)).context("Failed to initialize logging")?;
    config.validate().context("Invalid configuration")?;

    info!(
        environment = config.server.environment.as_str(),
        "Starting {} API v{}",
        config.server.project_name,
        env!("CARGO_PKG_VERSION")
    );

    let address = config.server_address();
    let api_prefix = config.server.api_prefix.clone();
    let state = initialize_state(config).await?;
    let app = create_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Listening on http://{}", address);
    info!("Health check available at http://{}{}/utils/health/", address, api_prefix);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}
