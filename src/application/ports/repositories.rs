use async_trait::async_trait;
use anyhow::Result;

use crate::db::models::AuthData;
use crate::webhooks::RepositoryInfo;

/// Repository trait for webhook auth data
#[async_trait]
pub trait AuthDataRepository: Send + Sync {
    /// Find auth data by the public key embedded in a callback url
    async fn find(&self, public_key: &str) -> Result<Option<AuthData>>;

    /// Insert or replace auth data
    async fn store(&self, data: &AuthData) -> Result<()>;

    /// Delete auth data, returns false if nothing was stored under the key
    async fn delete(&self, public_key: &str) -> Result<bool>;

    /// All auth data created for a repository
    async fn list_for_repository(&self, repository: &RepositoryInfo) -> Result<Vec<AuthData>>;
}

/// Access to VCS roots attached to build configurations
#[async_trait]
pub trait VcsRootRepository: Send + Sync {
    /// Repositories referenced by at least one active build configuration
    async fn find_repositories_referenced_by_live_configurations(&self) -> Result<Vec<RepositoryInfo>>;
}

/// OAuth connections to GitHub servers
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Whether a non-revoked connection covers the repository
    async fn has_active_connection(&self, repository: &RepositoryInfo) -> Result<bool>;
}

/// Runtime switches
pub trait FeatureFlags: Send + Sync {
    /// Delete hooks and auth data of repositories no build configuration uses any more
    fn is_orphan_removal_enabled(&self) -> bool;
}
