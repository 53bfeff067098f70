use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::state::AppContext;

/// Webhook checker worker
///
/// Runs the periodical webhook check every `check_interval`, starting one
/// interval after startup. Stops when `shutdown` turns true, also in the
/// middle of a sweep.
pub async fn run_webhook_checker(context: AppContext, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let period = context.config.check_interval;
    info!("Starting webhook checker worker (runs every {}s)", period.as_secs());

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if *shutdown.borrow() {
            break;
        }

        match context.webhook_checker.sweep(Some(&shutdown)).await {
            Ok(report) if report.removed_hooks > 0 => {
                info!("🧹 Removed {} orphaned webhook(s), persisting", report.removed_hooks);
                if let Err(e) = context.webhooks.persist().await {
                    warn!("Failed to persist webhooks after cleanup: {:#}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Webhook check failed: {:#}", e),
        }
    }

    info!("Webhook checker worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use crate::config::{AgentConfig, REMOVE_ORPHAN_HOOKS_VAR};
    use crate::github::{Webhook, WebhookConfig};
    use crate::infrastructure::database::connect;

    fn webhook(id: i64) -> Webhook {
        Webhook {
            id,
            url: format!("https://api.github.com/repos/gone/repo/hooks/{}", id),
            name: "web".to_string(),
            active: true,
            events: vec!["push".to_string()],
            config: WebhookConfig {
                url: format!("https://ci.example.com/app/hooks/github/key{}", id),
                content_type: Some("json".to_string()),
                insecure_ssl: None,
            },
            last_response: None,
        }
    }

    async fn context(data_dir: &Path, check_interval: Duration) -> AppContext {
        let config = AgentConfig::for_tests(data_dir, check_interval);
        let pool = connect(&config.database_url).await.unwrap();
        AppContext::new(pool, config)
    }

    #[tokio::test]
    async fn test_persists_after_removing_orphans() {
        std::env::set_var(REMOVE_ORPHAN_HOOKS_VAR, "true");
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path(), Duration::from_millis(50)).await;
        // No build configuration references this repository
        context.webhooks.get_or_add(&webhook(1)).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_webhook_checker(context.clone(), shutdown_rx));

        let path = context.webhooks.path().to_path_buf();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !path.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        assert!(context.webhooks.is_empty().await);
        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["hooks"].as_array().map(Vec::len), Some(0));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_shutdown_before_first_tick() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path(), Duration::from_secs(3600)).await;
        context.webhooks.get_or_add(&webhook(2)).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_webhook_checker(context.clone(), shutdown_rx));
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(context.webhooks.len().await, 1);
        assert!(!context.webhooks.path().exists());
    }
}
