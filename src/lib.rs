//! GitHub webhook registry and orphan hook cleanup for the build server.
//!
//! [`WebHooksStorage`] keeps the hooks the server created on GitHub, persisted
//! under the data directory. [`WebhookPeriodicalChecker`] removes hooks whose
//! repository no active build configuration uses anymore.

pub mod application;
pub mod config;
pub mod db;
pub mod github;
pub mod infrastructure;
pub mod state;
pub mod webhooks;
pub mod workers;

pub use application::ports::repositories::{
    AuthDataRepository, ConnectionRepository, FeatureFlags, VcsRootRepository,
};
pub use application::services::{CheckReport, WebhookPeriodicalChecker};
pub use db::models::{public_key_from_callback_url, AuthData};
pub use github::Webhook;
pub use webhooks::{
    allowed_actions, HookAction, HookKey, HookStatus, KeyParseError, LoadOutcome, MapKey,
    RepositoryInfo, WebHookInfo, WebHooksStorage,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::WebhookConfig;

    #[tokio::test]
    async fn test_register_hook_through_public_api() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WebHooksStorage::in_data_dir(dir.path());
        let repository = RepositoryInfo::new("github.com", "team", "service");
        let auth = AuthData::generate(1, repository.clone(), "conn-1");
        let callback_url = auth.callback_url("https://ci.example.com/");

        let created = Webhook {
            id: 77,
            url: "https://api.github.com/repos/team/service/hooks/77".to_string(),
            name: "web".to_string(),
            active: true,
            events: vec!["push".to_string()],
            config: WebhookConfig {
                url: callback_url.clone(),
                content_type: Some("json".to_string()),
                insecure_ssl: None,
            },
            last_response: None,
        };

        let info = storage.get_or_add(&created).await.unwrap();
        assert_eq!(info.key, HookKey::new("github.com", "team", "service", 77));
        assert_eq!(public_key_from_callback_url(&info.callback_url), Some(auth.public_key.as_str()));
        assert_eq!(allowed_actions(info.status), &[HookAction::Check, HookAction::Delete]);

        storage.update(&repository, |h| h.status = HookStatus::Ok).await;
        assert_eq!(storage.get_hooks(&repository).await[0].status, HookStatus::Ok);
    }
}
