use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use super::error::{
    CreateSqliteDirectorySnafu, InvariantViolationSnafu, SqliteConnectOptionsSnafu,
    SqliteConnectSnafu, SqliteMigrateSnafu, SqliteQuerySnafu, StorageResult,
};
use super::ids::{EntryKey, OwnerScope};
use super::types::{KvRecord, unix_timestamp_seconds};
use super::{BoxFuture, KvStore};

#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct KvRow {
    owner: String,
    key: String,
    value: String,
    created_at: i64,
    updated_at: i64,
}

impl SqliteKvStore {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        // A single connection keeps `:memory:` databases alive and writes serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        tracing::debug!(database_url = %database_url, "opened sqlite key-value store");
        Ok(Self { pool })
    }
}

impl KvStore for SqliteKvStore {
    fn get_record<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> BoxFuture<'a, StorageResult<Option<KvRecord>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, KvRow>(
                "SELECT owner, key, value, created_at, updated_at FROM kv_entries WHERE owner = ? AND key = ?",
            )
            .bind(owner.as_str())
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "kv-get-select",
            })?;

            row.map(kv_row_to_record).transpose()
        })
    }

    fn set<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
        value: String,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let now = u64_to_i64(unix_timestamp_seconds(), "kv-set-timestamp")?;
            sqlx::query(
                "INSERT INTO kv_entries (owner, key, value, created_at, updated_at) VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT (owner, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(owner.as_str())
            .bind(key.as_str())
            .bind(value)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "kv-set-upsert",
            })?;

            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM kv_entries WHERE owner = ? AND key = ?")
                .bind(owner.as_str())
                .bind(key.as_str())
                .execute(&self.pool)
                .await
                .context(SqliteQuerySnafu {
                    stage: "kv-delete",
                })?;

            Ok(result.rows_affected() > 0)
        })
    }
}

fn kv_row_to_record(row: KvRow) -> StorageResult<KvRecord> {
    Ok(KvRecord {
        owner: OwnerScope::parse(&row.owner)?,
        key: EntryKey::parse(&row.key)?,
        value: row.value,
        created_at_unix_seconds: i64_to_u64(row.created_at, "kv-row-created-at")?,
        updated_at_unix_seconds: i64_to_u64(row.updated_at, "kv-row-updated-at")?,
    })
}

fn i64_to_u64(value: i64, stage: &'static str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| {
        InvariantViolationSnafu {
            stage,
            details: format!("expected non-negative integer, got {value}"),
        }
        .build()
    })
}

fn u64_to_i64(value: u64, stage: &'static str) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| {
        InvariantViolationSnafu {
            stage,
            details: format!("integer {value} does not fit sqlite INTEGER"),
        }
        .build()
    })
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_memory() -> SqliteKvStore {
        SqliteKvStore::open(":memory:").await.unwrap()
    }

    fn owner(raw: &str) -> OwnerScope {
        OwnerScope::parse(raw).unwrap()
    }

    fn key(raw: &str) -> EntryKey {
        EntryKey::parse(raw).unwrap()
    }

    #[test]
    fn normalize_database_url_handles_paths_and_memory() {
        assert_eq!(normalize_database_url(":memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_database_url("sqlite://already.db"),
            "sqlite://already.db"
        );
        assert_eq!(
            normalize_database_url("/tmp/gatito/kv.db"),
            "sqlite:///tmp/gatito/kv.db"
        );
    }

    #[tokio::test]
    async fn missing_entry_reads_as_none() {
        let store = open_memory().await;
        assert_eq!(store.get(&owner("ana"), &key("history")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_upserts_and_keeps_created_at() {
        let store = open_memory().await;
        let (ana, history) = (owner("ana"), key("history"));

        store.set(&ana, &history, "[]".to_string()).await.unwrap();
        let first = store.get_record(&ana, &history).await.unwrap().unwrap();
        store
            .set(&ana, &history, "[{\"role\":\"user\"}]".to_string())
            .await
            .unwrap();
        let second = store.get_record(&ana, &history).await.unwrap().unwrap();

        assert_eq!(second.value, "[{\"role\":\"user\"}]");
        assert_eq!(second.created_at_unix_seconds, first.created_at_unix_seconds);
    }

    #[tokio::test]
    async fn owners_do_not_share_entries() {
        let store = open_memory().await;
        let history = key("history");

        store
            .set(&owner("ana"), &history, "ana".to_string())
            .await
            .unwrap();
        store
            .set(&owner("luis"), &history, "luis".to_string())
            .await
            .unwrap();

        assert_eq!(
            store.get(&owner("ana"), &history).await.unwrap().as_deref(),
            Some("ana")
        );
        assert!(store.delete(&owner("luis"), &history).await.unwrap());
        assert_eq!(store.get(&owner("luis"), &history).await.unwrap(), None);
        assert_eq!(
            store.get(&owner("ana"), &history).await.unwrap().as_deref(),
            Some("ana")
        );
    }
}
