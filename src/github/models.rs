use serde::{Deserialize, Serialize};

/// Hook as returned by `GET/POST /repos/{owner}/{repo}/hooks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: i64,
    /// API url of the hook itself, e.g. `https://api.github.com/repos/o/r/hooks/1`
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub events: Vec<String>,
    pub config: WebhookConfig,
    #[serde(default)]
    pub last_response: Option<LastResponse>,
}

impl Webhook {
    /// Url GitHub delivers payloads to
    pub fn callback_url(&self) -> &str {
        &self.config.url
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub insecure_ssl: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastResponse {
    pub code: Option<i64>,
    pub status: Option<String>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_api_response() {
        let json = r#"{
            "type": "Repository",
            "id": 12345678,
            "name": "web",
            "active": true,
            "events": ["push", "pull_request"],
            "config": {
                "content_type": "json",
                "insecure_ssl": "0",
                "url": "https://ci.example.com/app/hooks/github/abc"
            },
            "updated_at": "2019-06-03T00:57:16Z",
            "created_at": "2019-06-03T00:57:16Z",
            "url": "https://api.github.com/repos/octocat/Hello-World/hooks/12345678",
            "last_response": {"code": null, "status": "unused", "message": null}
        }"#;

        let hook: Webhook = serde_json::from_str(json).unwrap();
        assert_eq!(hook.id, 12345678);
        assert!(hook.active);
        assert_eq!(hook.events.len(), 2);
        assert_eq!(hook.callback_url(), "https://ci.example.com/app/hooks/github/abc");
        assert_eq!(hook.last_response.unwrap().status.as_deref(), Some("unused"));
    }
}
