use async_trait::async_trait;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::application::ports::repositories::*;
use crate::db::models::*;
use crate::webhooks::RepositoryInfo;

/// SQLite implementation of AuthDataRepository
#[derive(Clone)]
pub struct SqliteAuthDataRepository {
    pool: SqlitePool,
}

impl SqliteAuthDataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn auth_data_from_row(row: &SqliteRow) -> Result<AuthData> {
    Ok(AuthData {
        public_key: row.try_get("public_key")?,
        user_id: row.try_get("user_id")?,
        secret: row.try_get("secret")?,
        repository: RepositoryInfo {
            server: row.try_get("repo_server")?,
            owner: row.try_get("repo_owner")?,
            name: row.try_get("repo_name")?,
        },
        connection_id: row.try_get("connection_id")?,
    })
}

#[async_trait]
impl AuthDataRepository for SqliteAuthDataRepository {
    async fn find(&self, public_key: &str) -> Result<Option<AuthData>> {
        let row = sqlx::query(
            r#"
            SELECT public_key, user_id, secret, repo_server, repo_owner, repo_name, connection_id
            FROM auth_data
            WHERE public_key = ?
            "#
        )
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(auth_data_from_row).transpose()
    }

    async fn store(&self, data: &AuthData) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO auth_data (
                public_key, user_id, secret, repo_server, repo_owner, repo_name, connection_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(&data.public_key)
        .bind(data.user_id)
        .bind(&data.secret)
        .bind(&data.repository.server)
        .bind(&data.repository.owner)
        .bind(&data.repository.name)
        .bind(&data.connection_id)
        .execute(&self.pool)
        .await
        .context("Failed to store auth data")?;

        Ok(())
    }

    async fn delete(&self, public_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auth_data WHERE public_key = ?")
            .bind(public_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_repository(&self, repository: &RepositoryInfo) -> Result<Vec<AuthData>> {
        let rows = sqlx::query(
            r#"
            SELECT public_key, user_id, secret, repo_server, repo_owner, repo_name, connection_id
            FROM auth_data
            WHERE repo_server = ? COLLATE NOCASE
              AND repo_owner = ? COLLATE NOCASE
              AND repo_name = ? COLLATE NOCASE
            ORDER BY created_at
            "#
        )
        .bind(&repository.server)
        .bind(&repository.owner)
        .bind(&repository.name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(auth_data_from_row).collect()
    }
}

/// SQLite implementation of VcsRootRepository
#[derive(Clone)]
pub struct SqliteVcsRootRepository {
    pool: SqlitePool,
}

impl SqliteVcsRootRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VcsRootRepository for SqliteVcsRootRepository {
    async fn find_repositories_referenced_by_live_configurations(&self) -> Result<Vec<RepositoryInfo>> {
        let roots = sqlx::query_as::<_, VcsRoot>(
            r#"
            SELECT DISTINCT v.id, v.name, v.fetch_url
            FROM vcs_roots v
            JOIN build_configurations b ON b.vcs_root_id = v.id
            WHERE b.paused = 0
            ORDER BY v.id
            "#
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list VCS roots")?;

        let repositories = roots
            .into_iter()
            .filter_map(|root| {
                let info = RepositoryInfo::from_fetch_url(&root.fetch_url);
                if info.is_none() {
                    debug!("VCS root '{}' does not point to a GitHub repository: {}", root.name, root.fetch_url);
                }
                info
            })
            .collect();

        Ok(repositories)
    }
}

/// SQLite implementation of ConnectionRepository
#[derive(Clone)]
pub struct SqliteConnectionRepository {
    pool: SqlitePool,
}

impl SqliteConnectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionRepository for SqliteConnectionRepository {
    async fn has_active_connection(&self, repository: &RepositoryInfo) -> Result<bool> {
        let connections = sqlx::query_as::<_, OAuthConnection>(
            r#"
            SELECT id, server, owner, revoked
            FROM oauth_connections
            WHERE revoked = 0 AND server = ? COLLATE NOCASE
            "#
        )
        .bind(repository.server.trim_end_matches('/'))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list OAuth connections")?;

        Ok(connections.iter().any(|c| match &c.owner {
            Some(owner) => owner.eq_ignore_ascii_case(&repository.owner),
            None => true,
        }))
    }
}
