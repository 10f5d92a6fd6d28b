//! Shared cache backend for deployments running several processes.
//!
//! Entries live in an unlogged table; counters are incremented with a single
//! upsert so concurrent bumps never lose an increment.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::cache::{CacheBackend, CacheError, StoredEntry, VersionKey, VersionStamp};

use super::PostgresRepositories;

#[derive(sqlx::FromRow)]
struct EntryRow {
    payload: String,
    namespace_version: i64,
    item_version: i64,
    expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct PostgresCacheBackend {
    repositories: PostgresRepositories,
}

impl PostgresCacheBackend {
    pub fn new(repositories: PostgresRepositories) -> Self {
        Self { repositories }
    }
}

fn unavailable(err: sqlx::Error) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

fn to_column(value: u64) -> Result<i64, CacheError> {
    i64::try_from(value)
        .map_err(|_| CacheError::Unavailable(format!("counter {value} exceeds column range")))
}

fn from_column(value: i64) -> Result<u64, CacheError> {
    u64::try_from(value)
        .map_err(|_| CacheError::Unavailable(format!("negative counter {value} in store")))
}

fn counter_columns(key: &VersionKey) -> (&'static str, bool, &str) {
    (
        key.namespace.as_str(),
        key.identifier.is_none(),
        key.identifier.as_deref().unwrap_or_default(),
    )
}

#[async_trait]
impl CacheBackend for PostgresCacheBackend {
    async fn load(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT payload, namespace_version, item_version, expires_at
            FROM cache_entries
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(self.repositories.pool())
        .await
        .map_err(unavailable)?;

        row.map(|row| {
            Ok(StoredEntry {
                payload: row.payload,
                stamp: VersionStamp {
                    namespace: from_column(row.namespace_version)?,
                    item: from_column(row.item_version)?,
                },
                expires_at: row.expires_at,
            })
        })
        .transpose()
    }

    async fn store(&self, key: String, entry: StoredEntry) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, payload, namespace_version, item_version, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO UPDATE
            SET payload = EXCLUDED.payload,
                namespace_version = EXCLUDED.namespace_version,
                item_version = EXCLUDED.item_version,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(entry.payload)
        .bind(to_column(entry.stamp.namespace)?)
        .bind(to_column(entry.stamp.item)?)
        .bind(entry.expires_at)
        .execute(self.repositories.pool())
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn version(&self, key: &VersionKey) -> Result<u64, CacheError> {
        let (namespace, is_namespace, identifier) = counter_columns(key);
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT version FROM cache_versions
            WHERE namespace = $1 AND is_namespace = $2 AND identifier = $3
            "#,
        )
        .bind(namespace)
        .bind(is_namespace)
        .bind(identifier)
        .fetch_optional(self.repositories.pool())
        .await
        .map_err(unavailable)?;

        version.map_or(Ok(0), from_column)
    }

    async fn increment(&self, key: &VersionKey) -> Result<u64, CacheError> {
        let (namespace, is_namespace, identifier) = counter_columns(key);
        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cache_versions (namespace, is_namespace, identifier, version)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (namespace, is_namespace, identifier) DO UPDATE
            SET version = cache_versions.version + 1
            RETURNING version
            "#,
        )
        .bind(namespace)
        .bind(is_namespace)
        .bind(identifier)
        .fetch_one(self.repositories.pool())
        .await
        .map_err(unavailable)?;

        from_column(version)
    }
}
