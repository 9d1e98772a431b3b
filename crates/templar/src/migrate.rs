//! Schema migrations. Every statement is idempotent, so `templar init` and
//! server startup can both run them.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect to the configured database and create the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = migrate(&pool).await;
    pool.close().await;
    result
}

/// Create the `template_chunks` table and its indexes on an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // No UNIQUE(template_id, chunk_order): a reorder batch passes through
    // transient duplicates before it commits.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_chunks (
            chunk_id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL,
            chunk_order INTEGER NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            linked_prompt_id TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_template_chunks_template ON template_chunks(template_id, chunk_order)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_template_chunks_order ON template_chunks(chunk_order)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
