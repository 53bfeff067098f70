use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::ports::repositories::{
    AuthDataRepository, ConnectionRepository, FeatureFlags, VcsRootRepository,
};
use crate::db::models::public_key_from_callback_url;
use crate::infrastructure::logging::{BoundaryLogger, Timer, TraceContext};
use crate::webhooks::{MapKey, RepositoryInfo, WebHookInfo, WebHooksStorage};

const SERVICE: &str = "WebhookChecker";

/// Outcome of one sweep over the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Repositories with at least one hook
    pub repositories: usize,
    /// Hooks of repositories used by a build configuration with a connection
    pub live: usize,
    /// Hooks of repositories still used but without an active connection
    pub unverifiable: usize,
    /// Hooks of repositories no build configuration uses
    pub orphaned: usize,
    pub removed_hooks: usize,
    pub removed_auth_records: usize,
    /// Repositories whose state could not be determined
    pub failed: usize,
    /// Hooks in one of the unhealthy statuses
    pub incorrect: usize,
    /// Sweep stopped before visiting every repository
    pub interrupted: bool,
}

/// WebhookPeriodicalChecker - reconciles stored hooks with build configurations
///
/// Responsibilities:
/// - Find hooks whose repository is no longer referenced by any active build configuration
/// - Remove those hooks and their auth data when orphan removal is enabled
/// - Report repositories that are referenced but have no usable OAuth connection
///
/// Storage locks are never held while a collaborator is queried.
pub struct WebhookPeriodicalChecker<A, V, C, F>
where
    A: AuthDataRepository,
    V: VcsRootRepository,
    C: ConnectionRepository,
    F: FeatureFlags,
{
    storage: Arc<WebHooksStorage>,
    auth_repo: Arc<A>,
    vcs_root_repo: Arc<V>,
    connection_repo: Arc<C>,
    flags: Arc<F>,
    logger: Arc<BoundaryLogger>,
}

impl<A, V, C, F> WebhookPeriodicalChecker<A, V, C, F>
where
    A: AuthDataRepository,
    V: VcsRootRepository,
    C: ConnectionRepository,
    F: FeatureFlags,
{
    pub fn new(
        storage: Arc<WebHooksStorage>,
        auth_repo: Arc<A>,
        vcs_root_repo: Arc<V>,
        connection_repo: Arc<C>,
        flags: Arc<F>,
        logger: Arc<BoundaryLogger>,
    ) -> Self {
        Self {
            storage,
            auth_repo,
            vcs_root_repo,
            connection_repo,
            flags,
            logger,
        }
    }

    /// Run one full sweep
    pub async fn do_check(&self) -> Result<CheckReport> {
        self.sweep(None).await
    }

    /// Run one sweep, stopping between repositories once `shutdown` turns true
    pub async fn sweep(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<CheckReport> {
        let trace_id = TraceContext::for_job("webhook-check");
        let timer = Timer::start();
        let remove_orphans = self.flags.is_orphan_removal_enabled();
        self.logger.service_entry(&trace_id, "Worker", SERVICE, "sweep", &format!("remove_orphans={}", remove_orphans));

        let groups = self.grouped_hooks().await;
        let mut report = CheckReport {
            repositories: groups.len(),
            incorrect: self.storage.get_incorrect_hooks().await.len(),
            ..Default::default()
        };

        if groups.is_empty() {
            self.logger.service_exit(&trace_id, "Worker", SERVICE, "sweep", timer.elapsed_ms());
            return Ok(report);
        }

        // Without this list nothing can be classified, so nothing is touched
        let live = match self.live_repositories(&trace_id).await {
            Ok(live) => live,
            Err(e) => {
                self.logger.service_error(&trace_id, "Worker", SERVICE, "sweep", &e);
                return Err(e);
            }
        };

        for (repository, hooks) in groups {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                info!("[{}] Webhook check interrupted by shutdown", trace_id);
                report.interrupted = true;
                break;
            }

            if live.contains(&repository.to_map_key()) {
                self.check_connection(&trace_id, &repository, hooks.len(), &mut report).await;
                continue;
            }

            report.orphaned += hooks.len();
            if !remove_orphans {
                info!(
                    "[{}] {} hook(s) of {} are not used by any build configuration (removal disabled)",
                    trace_id, hooks.len(), repository
                );
                continue;
            }

            for hook in &hooks {
                self.remove_orphan(&trace_id, &repository, hook, &mut report).await;
            }
        }

        info!("[{}] Webhook check finished: {:?}", trace_id, report);
        self.logger.service_exit(&trace_id, "Worker", SERVICE, "sweep", timer.elapsed_ms());
        Ok(report)
    }

    /// Registry snapshot grouped by repository, in first-seen order
    async fn grouped_hooks(&self) -> Vec<(RepositoryInfo, Vec<WebHookInfo>)> {
        let mut groups: Vec<(RepositoryInfo, Vec<WebHookInfo>)> = Vec::new();
        let mut index: HashMap<MapKey, usize> = HashMap::new();

        for (repository, hook) in self.storage.get_all().await {
            match index.get(&repository.to_map_key()) {
                Some(&i) => groups[i].1.push(hook),
                None => {
                    index.insert(repository.to_map_key(), groups.len());
                    groups.push((repository, vec![hook]));
                }
            }
        }

        groups
    }

    async fn live_repositories(&self, trace_id: &str) -> Result<HashSet<MapKey>> {
        let operation = "find_repositories_referenced_by_live_configurations";
        let timer = Timer::start();
        self.logger.external_call(trace_id, SERVICE, "VcsRoots", operation);

        match self.vcs_root_repo.find_repositories_referenced_by_live_configurations().await {
            Ok(repositories) => {
                self.logger.external_done(trace_id, SERVICE, "VcsRoots", operation, timer.elapsed_ms());
                Ok(repositories.iter().map(RepositoryInfo::to_map_key).collect())
            }
            Err(e) => {
                self.logger.external_error(trace_id, SERVICE, "VcsRoots", operation, &e);
                Err(e)
            }
        }
    }

    async fn check_connection(&self, trace_id: &str, repository: &RepositoryInfo, hooks: usize, report: &mut CheckReport) {
        match self.connection_repo.has_active_connection(repository).await {
            Ok(true) => report.live += hooks,
            Ok(false) => {
                warn!(
                    "[{}] No active GitHub connection for {}, {} hook(s) cannot be verified",
                    trace_id, repository, hooks
                );
                report.unverifiable += hooks;
            }
            Err(e) => {
                self.logger.external_error(trace_id, SERVICE, "Connections", "has_active_connection", &e);
                report.failed += 1;
            }
        }
    }

    /// Delete an orphaned hook and the auth data its callback url points to.
    ///
    /// Both deletions are attempted independently; missing targets are fine.
    async fn remove_orphan(&self, trace_id: &str, repository: &RepositoryInfo, hook: &WebHookInfo, report: &mut CheckReport) {
        self.logger.repo_call(trace_id, SERVICE, "WebHooksStorage", "delete", &hook.key.to_string());
        if self.storage.delete(hook).await {
            report.removed_hooks += 1;
        }

        let Some(public_key) = public_key_from_callback_url(&hook.callback_url) else {
            debug!("[{}] Callback url of {} carries no public key: {}", trace_id, hook.key, hook.callback_url);
            return;
        };

        let auth = match self.auth_repo.find(public_key).await {
            Ok(Some(auth)) => auth,
            Ok(None) => {
                debug!("[{}] No auth data for {} ({})", trace_id, hook.key, public_key);
                return;
            }
            Err(e) => {
                self.logger.repo_error(trace_id, SERVICE, "AuthDataRepo", "find", &e);
                return;
            }
        };

        if auth.repository.to_map_key() != repository.to_map_key() {
            warn!(
                "[{}] Auth data {} belongs to {}, not {}; keeping it",
                trace_id, public_key, auth.repository, repository
            );
            return;
        }

        self.logger.repo_call(trace_id, SERVICE, "AuthDataRepo", "delete", public_key);
        match self.auth_repo.delete(public_key).await {
            Ok(true) => report.removed_auth_records += 1,
            Ok(false) => {}
            Err(e) => self.logger.repo_error(trace_id, SERVICE, "AuthDataRepo", "delete", &e),
        }
    }
}
