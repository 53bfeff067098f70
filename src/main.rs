use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commit_hooks::config::AgentConfig;
use commit_hooks::infrastructure::database::connect;
use commit_hooks::state::AppContext;
use commit_hooks::workers::{run_webhook_checker, run_webhooks_file_watcher};
use commit_hooks::LoadOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AgentConfig::from_env()?;

    // Initialize tracing
    let _log_guard = init_tracing(&config);

    info!("Starting commit hooks agent");

    // Create data directory structure
    tokio::fs::create_dir_all(&config.data_dir).await?;
    info!("Data directory initialized: {}", config.data_dir.display());

    // Initialize database
    info!("Connecting to database: {}", config.database_url);
    let pool = connect(&config.database_url).await?;

    let context = AppContext::new(pool, config);
    info!("Application context initialized");

    // Load persisted webhooks before anything can touch the registry
    match context.webhooks.load().await {
        Ok(LoadOutcome::Loaded { hooks }) => info!("Webhook registry ready with {} hook(s)", hooks),
        Ok(LoadOutcome::NoData) => info!("Webhook registry ready (no persisted hooks)"),
        Ok(LoadOutcome::StaleFormat { found }) => {
            info!("Webhook registry ready (persisted hooks of version {:?} discarded)", found)
        }
        Err(e) => error!("Failed to load webhooks, starting empty: {:#}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start webhooks file watcher
    let mut file_watcher = tokio::spawn({
        let context = context.clone();
        let shutdown = shutdown_rx.clone();
        async move {
            if let Err(e) = run_webhooks_file_watcher(context, shutdown).await {
                error!("Webhooks file watcher error: {}", e);
            }
        }
    });

    // Start webhook checker
    let mut webhook_checker = tokio::spawn({
        let context = context.clone();
        let shutdown = shutdown_rx.clone();
        async move {
            if let Err(e) = run_webhook_checker(context, shutdown).await {
                error!("Webhook checker error: {}", e);
            }
        }
    });

    info!("All services started successfully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = &mut file_watcher => {
            info!("Webhooks file watcher stopped");
        }
        _ = &mut webhook_checker => {
            info!("Webhook checker stopped");
        }
    }

    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    for handle in [file_watcher, webhook_checker] {
        if !handle.is_finished() {
            let _ = handle.await;
        }
    }

    // Workers are gone; the in-memory table is final
    if let Err(e) = context.webhooks.persist().await {
        error!("Failed to persist webhooks on shutdown: {:#}", e);
    }

    Ok(())
}

/// Console logging plus optional daily-rotated files.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(config: &AgentConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "commit-hooks.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = config.log_json.then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!config.log_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    guard
}
