//! Completion watcher process.
//!
//! Polls the execution targets for runs of in-flight orders and reports
//! finished runs into the order ledger, which continues the cascade.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use cascade_backend::blob_store::LocalBlobStore;
use cascade_backend::config::BackendConfig;
use cascade_backend::registry::BackendRegistry;
use cascade_engine::{CompletionWatcher, DispatchEngine, OrderLedger, TemplateService};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let fmt_layer = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt::layer().json().boxed(),
        _ => tracing_subscriber::fmt::layer().boxed(),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cascade_watcher=debug,cascade_engine=debug".into()),
        )
        .with(fmt_layer)
        .init();

    let backend_config = BackendConfig::from_env();
    let poll_interval: u64 = std::env::var("WATCH_INTERVAL_SECS")
        .unwrap_or_else(|_| "15".into())
        .parse()
        .expect("WATCH_INTERVAL_SECS must be a valid u64");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = cascade_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    cascade_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    // Finished runs fan out through the same engine the API uses.
    let blobs = Arc::new(LocalBlobStore::new(backend_config.blob_root.clone()));
    let templates = TemplateService::new(pool.clone(), blobs);
    let backends =
        BackendRegistry::from_config(&backend_config).expect("Failed to build execution backends");
    tracing::info!(targets = ?backends.targets(), "Execution targets configured");

    let engine = Arc::new(DispatchEngine::new(pool.clone(), backends, templates));
    let ledger = OrderLedger::new(pool.clone(), engine);
    let watcher = CompletionWatcher::new(pool, ledger)
        .with_poll_interval(Duration::from_secs(poll_interval));

    let cancel = CancellationToken::new();
    let watcher_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        watcher.run(watcher_cancel).await;
    });

    shutdown_signal().await;
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    tracing::info!("Completion watcher stopped");
}

/// Wait for SIGINT or, on Unix, SIGTERM.
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
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
