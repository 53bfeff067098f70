pub mod webhook_checker;

pub use webhook_checker::{CheckReport, WebhookPeriodicalChecker};
