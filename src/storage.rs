use std::path::Path;

use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{ClientError, Result};
use crate::models::User;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const SAVED_USER_ID_KEY: &str = "savedUserId";

/// Where a value lives: `Local` survives restarts, `Session` dies with the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Session,
}

/// Key/value credential storage backed by SQLite.
pub struct CredentialStore {
    local: SqlitePool,
    session: SqlitePool,
}

impl CredentialStore {
    /// Open (creating if needed) the persistent store at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let local = SqlitePool::connect_with(options).await?;
        info!("Opened credential store at {}", path.display());

        Self::from_pools(local, Self::memory_pool().await?).await
    }

    /// Both scopes in memory; nothing touches disk.
    pub async fn in_memory() -> Result<Self> {
        Self::from_pools(Self::memory_pool().await?, Self::memory_pool().await?).await
    }

    // An in-memory database exists per connection, so the pool must keep
    // exactly one connection alive for the life of the store.
    async fn memory_pool() -> Result<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(pool)
    }

    async fn from_pools(local: SqlitePool, session: SqlitePool) -> Result<Self> {
        let store = Self { local, session };
        store.init(&store.local).await?;
        store.init(&store.session).await?;
        Ok(store)
    }

    async fn init(&self, pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn pool(&self, scope: Scope) -> &SqlitePool {
        match scope {
            Scope::Local => &self.local,
            Scope::Session => &self.session,
        }
    }

    pub async fn set(&self, scope: Scope, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO storage (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(self.pool(scope))
        .await?;

        debug!("Stored {} in {:?} scope", key, scope);
        Ok(())
    }

    pub async fn get(&self, scope: Scope, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM storage
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool(scope))
        .await?;

        Ok(row.map(|row| row.get(0)))
    }

    pub async fn remove(&self, scope: Scope, key: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM storage
            WHERE key = ?
            "#,
        )
        .bind(key)
        .execute(self.pool(scope))
        .await?;

        Ok(())
    }

    /// Persist a fresh login in the chosen scope.
    pub async fn save_credentials(&self, scope: Scope, token: &str, user: &User) -> Result<()> {
        let user_json = serde_json::to_string(user).map_err(ClientError::encoding)?;
        self.set(scope, TOKEN_KEY, token).await?;
        self.set(scope, USER_KEY, &user_json).await?;
        Ok(())
    }

    /// The bearer token, preferring the persistent scope.
    pub async fn token(&self) -> Result<Option<String>> {
        match self.get(Scope::Local, TOKEN_KEY).await? {
            Some(token) => Ok(Some(token)),
            None => self.get(Scope::Session, TOKEN_KEY).await,
        }
    }

    pub async fn cached_user(&self) -> Result<Option<User>> {
        let raw = match self.get(Scope::Local, USER_KEY).await? {
            Some(raw) => Some(raw),
            None => self.get(Scope::Session, USER_KEY).await?,
        };
        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    /// Drop token and cached user from both scopes.
    pub async fn clear_credentials(&self) -> Result<()> {
        for scope in [Scope::Local, Scope::Session] {
            self.remove(scope, TOKEN_KEY).await?;
            self.remove(scope, USER_KEY).await?;
        }
        info!("Cleared stored credentials");
        Ok(())
    }
}
