use std::net::SocketAddr;
use std::sync::Arc;

use identity_service::{
    build_router,
    config::IdentityConfig,
    services::{
        AttemptPolicy, AuditRecorder, AuthService, CredentialService, JwtService, PgAuditSink,
        PgStore, RedisKv, SecretCodec, SmtpNotifier,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Fail fast on invalid configuration
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        std::env::var("OTLP_ENDPOINT").ok().as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = identity_service::db::create_pool(&config.database)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    identity_service::db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let kv = Arc::new(RedisKv::new(&config.redis.url).await?);
    let jwt = JwtService::new(&config.jwt)?;
    let secrets = SecretCodec::from_hex(&config.security.master_key_hex)?;
    let audit = AuditRecorder::new(Arc::new(PgAuditSink::new(pool)));
    let notifier = Arc::new(SmtpNotifier::new(&config.smtp)?);

    let auth = AuthService::new(
        store.clone(),
        kv,
        jwt,
        secrets.clone(),
        audit.clone(),
        notifier,
        AttemptPolicy {
            max_attempts: config.security.max_login_attempts,
            window_seconds: config.security.login_window_seconds,
        },
    );
    let credentials = CredentialService::new(store, secrets, audit);

    let state = AppState {
        config: Arc::new(config.clone()),
        auth,
        credentials,
    };

    let app = build_router(state);

    let addr: SocketAddr = config.common.bind_addr().parse().map_err(|e| {
        service_core::error::AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e))
    })?;
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
