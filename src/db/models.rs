use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::webhooks::RepositoryInfo;

/// Path prefix of webhook callback urls; the public key follows it
pub const CALLBACK_PATH: &str = "/app/hooks/github/";

const PUBLIC_KEY_LEN: usize = 40;
const SECRET_LEN: usize = 64;

/// Credentials GitHub deliveries for one hook are authenticated with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthData {
    pub public_key: String,
    pub user_id: i64,
    pub secret: String,
    pub repository: RepositoryInfo,
    pub connection_id: String,
}

impl AuthData {
    /// New auth data with a random public key and secret
    pub fn generate(user_id: i64, repository: RepositoryInfo, connection_id: &str) -> Self {
        Self {
            public_key: random_alphanumeric(PUBLIC_KEY_LEN),
            user_id,
            secret: random_alphanumeric(SECRET_LEN),
            repository,
            connection_id: connection_id.to_string(),
        }
    }

    /// Callback url to register on GitHub for this auth data
    pub fn callback_url(&self, root_url: &str) -> String {
        format!("{}{}{}", root_url.trim_end_matches('/'), CALLBACK_PATH, self.public_key)
    }
}

/// Extract the public key from a callback url built by [`AuthData::callback_url`]
pub fn public_key_from_callback_url(callback_url: &str) -> Option<&str> {
    let (_, rest) = callback_url.split_once(CALLBACK_PATH)?;
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let key = rest[..end].trim_end_matches('/');

    if key.is_empty() || key.contains('/') {
        None
    } else {
        Some(key)
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VcsRoot {
    pub id: i64,
    pub name: String,
    pub fetch_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthConnection {
    pub id: String,
    pub server: String,
    /// None when the connection covers every owner on the server
    pub owner: Option<String>,
    pub revoked: bool,
}
