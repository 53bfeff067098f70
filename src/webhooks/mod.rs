pub mod actions;
pub mod key;
pub mod models;
pub mod storage;

pub use actions::{allowed_actions, HookAction};
pub use key::{HookKey, KeyParseError, MapKey, RepositoryInfo};
pub use models::{HookStatus, WebHookInfo};
pub use storage::{LoadOutcome, WebHooksStorage};
