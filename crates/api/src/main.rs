use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airlock_api::config::ServerConfig;
use airlock_api::dispatch::JobDispatcher;
use airlock_api::router::build_app_router;
use airlock_api::state::AppState;
use airlock_api::ws;
use airlock_core::PayloadSchema;
use airlock_db::repositories::JobRepo;
use airlock_delivery::CallbackDelivery;
use airlock_engine::{Engine, EngineLifecycle, SubprocessEngine};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "airlock_api=debug,airlock_db=debug,airlock_engine=debug,airlock_delivery=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        engine = %config.engine.name,
        "Loaded server configuration",
    );

    // --- Database ---
    let pool = airlock_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    airlock_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    airlock_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Startup retention pass ---
    let pruned = JobRepo::prune(
        &pool,
        chrono::Duration::days(config.completed_retention_days),
        chrono::Duration::days(config.retention_days),
    )
    .await
    .expect("Failed to prune expired jobs");
    tracing::info!(
        completed_removed = pruned.completed_removed,
        expired_removed = pruned.expired_removed,
        "Pruned expired jobs",
    );

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Engine lifecycle ---
    let engine: Arc<dyn Engine> =
        Arc::new(SubprocessEngine::new(config.engine.to_subprocess_config()));
    let lifecycle = Arc::new(EngineLifecycle::new(
        engine,
        Duration::from_secs(config.idle_timeout_secs),
    ));

    // --- Dispatcher ---
    let delivery = Arc::new(CallbackDelivery::new());
    let dispatcher = JobDispatcher::new(
        pool.clone(),
        Arc::clone(&lifecycle),
        Arc::clone(&ws_manager),
        delivery,
    )
    .with_poll_interval(Duration::from_millis(config.poll_interval_ms));

    let dispatcher_cancel = tokio_util::sync::CancellationToken::new();
    let dispatcher_handle = {
        let cancel = dispatcher_cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };

    // --- App state ---
    let state = AppState {
        pool,
        schema: Arc::new(PayloadSchema::new(config.required_fields.clone())),
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        lifecycle: Arc::clone(&lifecycle),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the dispatcher. A cycle in flight finishes first, so the wait
    // is bounded but can be up to one full engine run.
    dispatcher_cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(30), dispatcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("Dispatcher still finishing a job, exiting without waiting");
    } else {
        tracing::info!("Job dispatcher stopped");
    }

    lifecycle.shutdown().await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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
