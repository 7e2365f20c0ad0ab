use std::net::SocketAddr;
use std::sync::Arc;

use civic_core::middleware::create_ip_rate_limiter;
use civic_core::observability::init_tracing;
use civic_service::{
    build_router,
    config::AppConfig,
    services::{
        AuthService, CloudinaryStorage, EmailProvider, IdentityService, JwtService,
        LogEmailProvider, MongoDb, ObjectStorage, SmtpEmailProvider, UnconfiguredStorage,
        VerificationEngine,
    },
    AppState,
};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), civic_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AppConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    // Outside production, 500 bodies carry the underlying cause.
    civic_core::error::expose_error_causes(!config.environment.is_prod());

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting civic issue service"
    );

    tracing::info!("Initializing database connection");
    let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database).await?;
    db.initialize_indexes().await?;
    tracing::info!("Database initialized successfully");

    let email: Arc<dyn EmailProvider> = match &config.smtp {
        Some(smtp) => {
            let provider = SmtpEmailProvider::new(smtp)?;
            tracing::info!(host = %smtp.host, "SMTP email provider initialized");
            Arc::new(provider)
        }
        None => {
            tracing::warn!("SMTP not configured; OTPs will be logged instead of emailed");
            Arc::new(LogEmailProvider)
        }
    };

    let storage: Arc<dyn ObjectStorage> = match &config.storage {
        Some(storage_config) => {
            tracing::info!(cloud = %storage_config.cloud_name, "Cloudinary storage initialized");
            Arc::new(CloudinaryStorage::new(storage_config))
        }
        None => Arc::new(UnconfiguredStorage),
    };

    let jwt = JwtService::new(&config.jwt);
    tracing::info!("JWT service initialized");

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let signup_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.signup_attempts,
        config.rate_limit.signup_window_seconds,
    );
    let verify_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.verify_attempts,
        config.rate_limit.verify_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login, Signup, Verify, and Global IP");

    let engine = VerificationEngine::new(db.clone());
    let auth_service = AuthService::new(
        db.clone(),
        email.clone(),
        jwt.clone(),
        engine,
        config.environment.is_prod(),
        config.frontend_url.clone(),
    );
    let identity = IdentityService::new(db.clone());

    let state = AppState {
        config: config.clone(),
        db,
        email,
        storage,
        jwt,
        auth_service,
        identity,
        login_rate_limiter,
        signup_rate_limiter,
        verify_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
