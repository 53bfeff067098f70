use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical server name for github.com hooks
pub const GITHUB_SERVER: &str = "github.com";
const GITHUB_API_HOST: &str = "api.github.com";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("not a proper hook key or url (too few segments): \"{0}\"")]
    TooFewSegments(String),

    #[error("invalid hook id \"{id}\" in \"{input}\"")]
    InvalidId { input: String, id: String },

    #[error("expected \"{expected}\" segment but found \"{found}\" in \"{input}\"")]
    UnexpectedSegment {
        input: String,
        expected: &'static str,
        found: String,
    },

    #[error("no server found in hook url \"{0}\"")]
    MissingServer(String),
}

/// Repository on a GitHub server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub server: String,
    pub owner: String,
    pub name: String,
}

impl RepositoryInfo {
    pub fn new(server: &str, owner: &str, name: &str) -> Self {
        Self {
            server: server.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// `owner/name`
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn to_map_key(&self) -> MapKey {
        MapKey::new(&self.server, &self.owner, &self.name)
    }

    /// Parse a VCS root fetch URL.
    ///
    /// Understands `https://host/owner/name.git`, `ssh://git@host/owner/name.git`
    /// and scp-like `git@host:owner/name.git`. The host may carry a context path
    /// (`https://host/ghe/owner/name`), which becomes part of the server.
    pub fn from_fetch_url(url: &str) -> Option<Self> {
        let url = url.trim();

        let location = match url.split_once("://") {
            Some((_, rest)) => rest.to_string(),
            None => {
                // scp-like: [user@]host:owner/name
                let (host, path) = url.split_once(':')?;
                format!("{}/{}", host, path)
            }
        };

        // Drop credentials ("git@", "user:token@")
        let location = match location.split_once('/') {
            Some((authority, path)) => {
                let host = authority.rsplit('@').next().unwrap_or(authority);
                format!("{}/{}", host, path)
            }
            None => return None,
        };

        let trimmed = location.trim_end_matches('/');
        let mut segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() < 3 {
            return None;
        }

        let name = segments.pop()?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        let owner = segments.pop()?;
        let server = segments.join("/");

        if name.is_empty() || owner.is_empty() || server.is_empty() {
            return None;
        }

        Some(Self::new(&server, owner, name))
    }
}

impl fmt::Display for RepositoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.server, self.owner, self.name)
    }
}

/// Identifies one webhook on one repository.
///
/// Serialized form is `server/owner/name/id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HookKey {
    pub server: String,
    pub owner: String,
    pub name: String,
    pub id: i64,
}

impl HookKey {
    pub fn new(server: &str, owner: &str, name: &str, id: i64) -> Self {
        Self {
            server: server.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            id,
        }
    }

    /// Parse the serialized `server/owner/name/id` form.
    pub fn parse(serialized: &str) -> Result<Self, KeyParseError> {
        let mut segments: Vec<&str> = serialized.split('/').collect();
        if segments.len() < 4 {
            return Err(KeyParseError::TooFewSegments(serialized.to_string()));
        }

        let id = parse_id(serialized, segments.pop().unwrap_or_default())?;
        let name = segments.pop().unwrap_or_default();
        let owner = segments.pop().unwrap_or_default();
        let server = segments.join("/");

        Ok(Self::new(&server, owner, name, id))
    }

    /// Parse a GitHub API hook url.
    ///
    /// - `https://api.github.com/repos/{owner}/{name}/hooks/{id}`
    /// - `https://{host}[/{context}]/api/v3/repos/{owner}/{name}/hooks/{id}`
    pub fn from_hook_url(url: &str) -> Result<Self, KeyParseError> {
        let mut segments: Vec<&str> = url.split('/').collect();
        if segments.len() < 8 {
            return Err(KeyParseError::TooFewSegments(url.to_string()));
        }

        let id = parse_id(url, pop(&mut segments))?;
        expect_segment(url, pop(&mut segments), "hooks")?;
        let name = pop(&mut segments);
        let owner = pop(&mut segments);
        expect_segment(url, pop(&mut segments), "repos")?;

        let api_segment = pop(&mut segments);
        let server = if api_segment.eq_ignore_ascii_case(GITHUB_API_HOST) {
            GITHUB_SERVER.to_string()
        } else {
            // Enterprise: `{host}[/{context}]/api/v3`
            expect_segment(url, api_segment, "v3")?;
            expect_segment(url, pop(&mut segments), "api")?;
            let rest: &[&str] = match segments.as_slice() {
                [scheme, "", rest @ ..] if scheme.ends_with(':') => rest,
                [scheme] if scheme.ends_with(':') => &[],
                rest => rest,
            };
            match rest.first() {
                Some(host) if !host.is_empty() => rest.join("/"),
                _ => return Err(KeyParseError::MissingServer(url.to_string())),
            }
        };

        Ok(Self::new(&server, owner, name, id))
    }

    pub fn to_map_key(&self) -> MapKey {
        MapKey::new(&self.server, &self.owner, &self.name)
    }
}

fn pop<'a>(segments: &mut Vec<&'a str>) -> &'a str {
    segments.pop().unwrap_or_default()
}

fn parse_id(input: &str, id: &str) -> Result<i64, KeyParseError> {
    id.parse().map_err(|_| KeyParseError::InvalidId {
        input: input.to_string(),
        id: id.to_string(),
    })
}

fn expect_segment(input: &str, found: &str, expected: &'static str) -> Result<(), KeyParseError> {
    if found == expected {
        Ok(())
    } else {
        Err(KeyParseError::UnexpectedSegment {
            input: input.to_string(),
            expected,
            found: found.to_string(),
        })
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.server, self.owner, self.name, self.id)
    }
}

impl FromStr for HookKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HookKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HookKey> for String {
    fn from(key: HookKey) -> Self {
        key.to_string()
    }
}

/// Registry grouping key: a [`HookKey`] without the id.
///
/// Equality and hashing ignore ASCII case on every field.
#[derive(Debug, Clone)]
pub struct MapKey {
    pub server: String,
    pub owner: String,
    pub name: String,
}

impl MapKey {
    pub fn new(server: &str, owner: &str, name: &str) -> Self {
        Self {
            server: server.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    pub fn to_info(&self) -> RepositoryInfo {
        RepositoryInfo::new(self.server.trim_end_matches('/'), &self.owner, &self.name)
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.server.eq_ignore_ascii_case(&other.server)
            && self.owner.eq_ignore_ascii_case(&other.owner)
            && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.server.to_ascii_lowercase().hash(state);
        self.owner.to_ascii_lowercase().hash(state);
        self.name.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.server, self.owner, self.name)
    }
}
