//! SQLite-backed store implementation (durable crash-resume backend).
//!
//! Handles connection, migrations, and the single-statement atomic ops the
//! `StateStore` contract requires. The database file lives under the XDG
//! state directory: `~/.local/state/rcrawl/state.db` on Debian.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

use super::{StateStore, StoreError};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Escape `%`, `_` and `\` in a key prefix so it can be used in a LIKE
/// pattern (job names may contain underscores).
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Handle to the SQLite-backed state store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the default state database and run migrations.
    pub async fn open_default() -> Result<Self, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("rcrawl")
            .map_err(|e| StoreError::Other(e.to_string()))?;
        let state_dir = xdg_dirs.get_state_home().join("rcrawl");
        let db_path = state_dir.join("state.db");

        // Ensure parent directory exists.
        tokio::fs::create_dir_all(&state_dir).await?;

        let uri = path_to_sqlite_uri(&db_path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;

        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    /// Intended for tests so the store can be placed in a temp directory.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        // One table per structure kind. `list_items.id` provides FIFO order;
        // set/hash uniqueness is enforced by primary keys so the upserts
        // stay single-statement atomic.
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS list_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                value TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_list_items_key ON list_items(key, id)",
            r#"
            CREATE TABLE IF NOT EXISTS set_members (
                key TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (key, member)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hash_fields (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS counters (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn bump(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO counters (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = value + ?2
             RETURNING value",
        )
        .bind(key)
        .bind(by)
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO list_items (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        // Single-statement delete keeps the pop atomic under a shared pool.
        let value: Option<String> = sqlx::query_scalar(
            "DELETE FROM list_items
             WHERE id = (SELECT id FROM list_items WHERE key = ?1 ORDER BY id LIMIT 1)
             RETURNING value",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn list_len(&self, key: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM list_items WHERE key = ?1")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO set_members (key, member) VALUES (?1, ?2)
             ON CONFLICT(key, member) DO NOTHING",
        )
        .bind(key)
        .bind(member)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO hash_fields (key, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM hash_fields WHERE key = ?1 AND field = ?2")
                .bind(key)
                .bind(field)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM hash_fields WHERE key = ?1 AND field = ?2")
            .bind(key)
            .bind(field)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO hash_fields (key, field, value) VALUES (?1, ?2, CAST(?3 AS TEXT))
             ON CONFLICT(key, field) DO UPDATE
             SET value = CAST(CAST(value AS INTEGER) + ?3 AS TEXT)
             RETURNING CAST(value AS INTEGER)",
        )
        .bind(key)
        .bind(field)
        .bind(by)
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }

    async fn hash_all(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query("SELECT field, value FROM hash_fields WHERE key = ?1 ORDER BY field")
            .bind(key)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
            .collect())
    }

    async fn counter_get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM counters WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn counter_set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO counters (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.bump(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        self.bump(key, -1).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM list_items WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM set_members WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM hash_fields WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM counters WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        let pattern = like_prefix(prefix);
        sqlx::query("DELETE FROM list_items WHERE key LIKE ?1 ESCAPE '\\'")
            .bind(&pattern)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM set_members WHERE key LIKE ?1 ESCAPE '\\'")
            .bind(&pattern)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM hash_fields WHERE key LIKE ?1 ESCAPE '\\'")
            .bind(&pattern)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM counters WHERE key LIKE ?1 ESCAPE '\\'")
            .bind(&pattern)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<SqliteStore, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = SqliteStore { pool };
    store.migrate().await?;
    Ok(store)
}
