pub mod webhook_checker;
pub mod webhooks_file_watcher;

pub use webhook_checker::run_webhook_checker;
pub use webhooks_file_watcher::run_webhooks_file_watcher;
