use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use cascade_api::config::ServerConfig;
use cascade_api::router::build_app_router;
use cascade_api::state::AppState;
use cascade_backend::blob_store::LocalBlobStore;
use cascade_backend::config::BackendConfig;
use cascade_backend::registry::BackendRegistry;
use cascade_engine::{DispatchEngine, TemplateService};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    // LOG_FORMAT=json switches to one JSON object per line.
    let fmt_layer = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt::layer().json().boxed(),
        _ => tracing_subscriber::fmt::layer().boxed(),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cascade_api=debug,cascade_engine=debug,tower_http=debug".into()
            }),
        )
        .with(fmt_layer)
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(addr = %config.bind_addr, "Loaded server configuration");

    let backend_config = BackendConfig::from_env();
    tracing::info!(
        targets = backend_config.targets.len(),
        namespace = %backend_config.namespace,
        blob_root = %backend_config.blob_root.display(),
        "Loaded execution backend configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = cascade_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    cascade_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    cascade_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Dispatch engine ---
    let blobs = Arc::new(LocalBlobStore::new(backend_config.blob_root.clone()));
    let templates = TemplateService::new(pool.clone(), blobs);
    let backends =
        BackendRegistry::from_config(&backend_config).expect("Failed to build execution backends");
    if backends.is_empty() {
        tracing::warn!("No execution targets configured; every submission will fail");
    }
    let engine = Arc::new(DispatchEngine::new(pool.clone(), backends, templates));

    // --- Router ---
    let shutdown_timeout = config.shutdown_timeout;
    let addr = config.bind_addr;
    let state = AppState::new(pool, config.clone(), engine);
    let app = build_app_router(state, &config);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Once a signal arrives, in-flight requests get `shutdown_timeout` to finish.
    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signal_tx.send(());
            })
            .await
    });
    let _ = signal_rx.await;

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(Ok(result)) => result.expect("Server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "Server task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "In-flight requests did not finish before the shutdown timeout"
        ),
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
