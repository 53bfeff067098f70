use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::HookKey;
use crate::github::Webhook;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookStatus {
    NoInfo,
    NotFound,
    Ok,
    /// Created, waiting for the first delivery (ping) to arrive
    WaitingForServerResponse,
    Incorrect,
    Disabled,
    PayloadDeliveryFailed,
    Missing,
}

impl HookStatus {
    /// Statuses reported as unhealthy
    pub fn is_bad(&self) -> bool {
        matches!(
            self,
            HookStatus::NotFound
                | HookStatus::Incorrect
                | HookStatus::Disabled
                | HookStatus::PayloadDeliveryFailed
                | HookStatus::Missing
        )
    }
}

impl std::fmt::Display for HookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookStatus::NoInfo => write!(f, "NO_INFO"),
            HookStatus::NotFound => write!(f, "NOT_FOUND"),
            HookStatus::Ok => write!(f, "OK"),
            HookStatus::WaitingForServerResponse => write!(f, "WAITING_FOR_SERVER_RESPONSE"),
            HookStatus::Incorrect => write!(f, "INCORRECT"),
            HookStatus::Disabled => write!(f, "DISABLED"),
            HookStatus::PayloadDeliveryFailed => write!(f, "PAYLOAD_DELIVERY_FAILED"),
            HookStatus::Missing => write!(f, "MISSING"),
        }
    }
}

/// Stored record of one webhook registered on GitHub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct WebHookInfo {
    pub key: HookKey,
    /// API url of the hook
    pub url: String,
    pub callback_url: String,
    pub status: HookStatus,
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

impl WebHookInfo {
    /// New record for a hook that was just created on GitHub
    pub fn created(key: HookKey, created: &Webhook) -> Self {
        Self {
            key,
            url: created.url.clone(),
            callback_url: created.callback_url().to_string(),
            status: HookStatus::WaitingForServerResponse,
            correct: created.active,
            last_used: None,
        }
    }

    /// Whether `created` describes this hook: same numeric id, or failing
    /// that the same API url.
    pub fn is_same(&self, created: &Webhook) -> bool {
        self.key.id == created.id || self.url == created.url
    }

    pub fn is_same_hook(&self, other: &WebHookInfo) -> bool {
        self.key == other.key
    }

    /// Record a delivery
    pub fn touch(&mut self) {
        self.last_used = Some(Utc::now());
        self.status = HookStatus::Ok;
        self.correct = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::WebhookConfig;

    fn webhook(id: i64) -> Webhook {
        Webhook {
            id,
            url: format!("https://api.github.com/repos/o/r/hooks/{}", id),
            name: "web".to_string(),
            active: true,
            events: vec!["push".to_string()],
            config: WebhookConfig {
                url: "https://ci.example.com/app/hooks/github/key".to_string(),
                content_type: Some("json".to_string()),
                insecure_ssl: None,
            },
            last_response: None,
        }
    }

    #[test]
    fn test_status_display_and_badness() {
        assert_eq!(HookStatus::PayloadDeliveryFailed.to_string(), "PAYLOAD_DELIVERY_FAILED");
        assert_eq!(
            serde_json::to_string(&HookStatus::WaitingForServerResponse).unwrap(),
            "\"WAITING_FOR_SERVER_RESPONSE\""
        );
        assert!(HookStatus::Incorrect.is_bad());
        assert!(HookStatus::Missing.is_bad());
        assert!(!HookStatus::Ok.is_bad());
        assert!(!HookStatus::WaitingForServerResponse.is_bad());
    }

    #[test]
    fn test_created_record_is_pending() {
        let created = webhook(1);
        let info = WebHookInfo::created(HookKey::new("github.com", "o", "r", 1), &created);
        assert_eq!(info.status, HookStatus::WaitingForServerResponse);
        assert_eq!(info.callback_url, created.config.url);
        assert!(info.last_used.is_none());
    }

    #[test]
    fn test_is_same_matches_id_then_url() {
        let info = WebHookInfo::created(HookKey::new("github.com", "o", "r", 1), &webhook(1));
        assert!(info.is_same(&webhook(1)));
        assert!(!info.is_same(&webhook(2)));

        let mut moved = webhook(3);
        moved.url = info.url.clone();
        assert!(info.is_same(&moved));
    }

    #[test]
    fn test_json_field_names() {
        let mut info = WebHookInfo::created(HookKey::new("github.com", "o", "r", 1), &webhook(1));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["key"], "github.com/o/r/1");
        assert_eq!(json["status"], "WAITING_FOR_SERVER_RESPONSE");
        assert!(json.get("callbackUrl").is_some());
        assert!(json.get("lastUsed").is_none());

        info.touch();
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("lastUsed").is_some());
        assert_eq!(json["status"], "OK");
    }
}
