//! SQLite-backed [`Collection`] implementation.
//!
//! Records live in the `template_chunks` table (see [`crate::migrate`]).
//! Storage order is `rowid` order. Identity and order predicates are
//! pushed into SQL; the case-insensitive text predicate runs in Rust via
//! [`ChunkFilter::matches`] so it agrees with every other backend.
//!
//! Single-record mutations are one statement each and never open a read
//! transaction that later has to become a write. `set_orders` and
//! `replace_group` each run in one transaction that starts with a write,
//! so a failure leaves the template exactly as it was.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::sync::Arc;

use templar_core::models::TemplateChunk;
use templar_core::store::{ChunkFilter, ChunkPatch, Collection, FindOptions, OrderUpdate, Sort};
use templar_core::TemplateStore;

use crate::config::Config;
use crate::{db, migrate};

const COLUMNS: &str = "template_id, chunk_id, chunk_order, name, content, \
                       created_at, updated_at, linked_prompt_id";

const INSERT: &str = "INSERT INTO template_chunks (template_id, chunk_id, chunk_order, name, \
                      content, created_at, updated_at, linked_prompt_id) \
                      VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// SQLite implementation of the [`Collection`] trait.
pub struct SqliteCollection {
    pool: SqlitePool,
}

impl SqliteCollection {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Connect, migrate, and build a [`TemplateStore`] over the configured
/// database. The caller closes the returned pool when done.
pub async fn open_store(config: &Config) -> Result<(SqlitePool, TemplateStore)> {
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await.context("migrations failed")?;
    let collection = Arc::new(SqliteCollection::new(pool.clone()));
    let store = TemplateStore::new(collection).with_segmenter(config.segmenter()?);
    Ok((pool, store))
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {}", ms))
}

fn row_to_chunk(row: &SqliteRow) -> Result<TemplateChunk> {
    Ok(TemplateChunk {
        template_id: row.try_get("template_id")?,
        chunk_id: row.try_get("chunk_id")?,
        chunk_order: row.try_get("chunk_order")?,
        name: row.try_get("name")?,
        content: row.try_get("content")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        linked_prompt_id: row.try_get("linked_prompt_id")?,
    })
}

/// Append the SQL-expressible part of `filter` as a WHERE clause.
fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ChunkFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(ref id) = filter.template_id {
        qb.push(" AND template_id = ").push_bind(id.clone());
    }
    if let Some(ref id) = filter.chunk_id {
        qb.push(" AND chunk_id = ").push_bind(id.clone());
    }
    if let Some(order) = filter.chunk_order {
        qb.push(" AND chunk_order = ").push_bind(order);
    }
}

/// Narrow a single-row UPDATE or DELETE to the first stored match of
/// `filter`. The filter must carry no text predicate.
fn push_first_match(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ChunkFilter) {
    qb.push(" WHERE rowid = (SELECT rowid FROM template_chunks");
    push_where(qb, filter);
    qb.push(" ORDER BY rowid LIMIT 1)");
}

/// Narrow a statement to `target`, and only while the fields the text
/// predicate looked at are still the ones it saw.
fn push_unchanged(qb: &mut QueryBuilder<'_, Sqlite>, target: &TemplateChunk) {
    qb.push(" WHERE chunk_id = ")
        .push_bind(target.chunk_id.clone())
        .push(" AND name = ")
        .push_bind(target.name.clone())
        .push(" AND content = ")
        .push_bind(target.content.clone());
}

async fn first_text_match(
    pool: &SqlitePool,
    filter: &ChunkFilter,
) -> Result<Option<TemplateChunk>> {
    let mut found = select(pool, filter, FindOptions::default().limit(1)).await?;
    Ok(found.pop())
}

/// Run a filtered, sorted, limited SELECT on any executor (pool or
/// transaction).
async fn select<'e, E>(
    executor: E,
    filter: &ChunkFilter,
    opts: FindOptions,
) -> Result<Vec<TemplateChunk>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM template_chunks", COLUMNS));
    push_where(&mut qb, filter);
    qb.push(match opts.sort {
        Sort::Storage => " ORDER BY rowid",
        Sort::OrderAsc => " ORDER BY chunk_order ASC, rowid",
        Sort::OrderDesc => " ORDER BY chunk_order DESC, rowid",
    });
    // A Rust-side text predicate must see every candidate before the limit.
    let sql_limit = opts.limit.filter(|_| filter.text.is_none());
    if let Some(limit) = sql_limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }

    let rows = qb.build().fetch_all(executor).await?;
    let mut chunks = Vec::with_capacity(rows.len());
    for row in &rows {
        let chunk = row_to_chunk(row)?;
        if filter.matches(&chunk) {
            chunks.push(chunk);
        }
    }
    if let Some(limit) = opts.limit {
        chunks.truncate(limit);
    }
    Ok(chunks)
}

#[async_trait]
impl Collection for SqliteCollection {
    async fn insert_one(&self, chunk: &TemplateChunk) -> Result<()> {
        sqlx::query(INSERT)
            .bind(&chunk.template_id)
            .bind(&chunk.chunk_id)
            .bind(chunk.chunk_order)
            .bind(&chunk.name)
            .bind(&chunk.content)
            .bind(to_millis(chunk.created_at))
            .bind(to_millis(chunk.updated_at))
            .bind(&chunk.linked_prompt_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert chunk {}", chunk.chunk_id))?;
        Ok(())
    }

    async fn find(&self, filter: &ChunkFilter, opts: FindOptions) -> Result<Vec<TemplateChunk>> {
        select(&self.pool, filter, opts).await
    }

    async fn update_one(&self, filter: &ChunkFilter, patch: &ChunkPatch) -> Result<bool> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE template_chunks SET name = ");
        qb.push_bind(patch.name.clone())
            .push(", content = ")
            .push_bind(patch.content.clone())
            .push(", linked_prompt_id = ")
            .push_bind(patch.linked_prompt_id.clone())
            .push(", updated_at = ")
            .push_bind(to_millis(patch.updated_at));

        if filter.text.is_none() {
            push_first_match(&mut qb, filter);
        } else {
            let Some(target) = first_text_match(&self.pool, filter).await? else {
                return Ok(false);
            };
            push_unchanged(&mut qb, &target);
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_one(&self, filter: &ChunkFilter) -> Result<bool> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM template_chunks");
        if filter.text.is_none() {
            push_first_match(&mut qb, filter);
        } else {
            let Some(target) = first_text_match(&self.pool, filter).await? else {
                return Ok(false);
            };
            push_unchanged(&mut qb, &target);
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, filter: &ChunkFilter) -> Result<u64> {
        if filter.text.is_none() {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM template_chunks");
            push_where(&mut qb, filter);
            let result = qb.build().execute(&self.pool).await?;
            return Ok(result.rows_affected());
        }

        let targets = select(&self.pool, filter, FindOptions::default()).await?;
        let mut removed = 0;
        for target in &targets {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM template_chunks");
            push_unchanged(&mut qb, target);
            removed += qb.build().execute(&self.pool).await?.rows_affected();
        }
        Ok(removed)
    }

    async fn set_orders(&self, updates: &[OrderUpdate]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for update in updates {
            changed += sqlx::query(
                r#"
                UPDATE template_chunks SET chunk_order = ?
                WHERE chunk_id = ? AND template_id = ? AND chunk_order != ?
                "#,
            )
            .bind(update.chunk_order)
            .bind(&update.chunk_id)
            .bind(&update.template_id)
            .bind(update.chunk_order)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("set order of {}", update.chunk_id))?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn replace_group(&self, template_id: &str, chunks: &[TemplateChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM template_chunks WHERE template_id = ?")
            .bind(template_id)
            .execute(&mut *tx)
            .await
            .context("delete existing chunks")?;

        for (i, chunk) in chunks.iter().enumerate() {
            sqlx::query(INSERT)
                .bind(&chunk.template_id)
                .bind(&chunk.chunk_id)
                .bind(chunk.chunk_order)
                .bind(&chunk.name)
                .bind(&chunk.content)
                .bind(to_millis(chunk.created_at))
                .bind(to_millis(chunk.updated_at))
                .bind(&chunk.linked_prompt_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("insert chunk {} of {}", i, chunks.len()))?;
        }

        tx.commit().await?;
        Ok(())
    }
}
