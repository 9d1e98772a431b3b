//! Persistence abstraction for template chunks.
//!
//! The [`Collection`] trait is the minimal document-collection surface the
//! [`TemplateStore`](crate::templates::TemplateStore) needs: insert, find
//! with sort and limit, update, delete, and a batched order update. Any
//! backend exposing these primitives can hold templates (SQLite, in-memory,
//! a document database).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::TemplateChunk;

/// Conjunction of optional field predicates. An empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    pub template_id: Option<String>,
    pub chunk_id: Option<String>,
    pub chunk_order: Option<i64>,
    /// Case-insensitive substring of `name` or `content`.
    pub text: Option<String>,
}

impl ChunkFilter {
    pub fn template(template_id: &str) -> Self {
        Self {
            template_id: Some(template_id.to_string()),
            ..Default::default()
        }
    }

    pub fn chunk(chunk_id: &str) -> Self {
        Self {
            chunk_id: Some(chunk_id.to_string()),
            ..Default::default()
        }
    }

    /// Main chunks only (`chunk_order == 0`).
    pub fn main() -> Self {
        Self::default().with_order(0)
    }

    pub fn with_order(mut self, chunk_order: i64) -> Self {
        self.chunk_order = Some(chunk_order);
        self
    }

    pub fn containing(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Evaluate the filter against a record.
    ///
    /// Backends that cannot express a predicate natively apply this after
    /// fetching, so every backend agrees on the text match in particular.
    pub fn matches(&self, chunk: &TemplateChunk) -> bool {
        if let Some(ref id) = self.template_id {
            if &chunk.template_id != id {
                return false;
            }
        }
        if let Some(ref id) = self.chunk_id {
            if &chunk.chunk_id != id {
                return false;
            }
        }
        if let Some(order) = self.chunk_order {
            if chunk.chunk_order != order {
                return false;
            }
        }
        if let Some(ref text) = self.text {
            return contains_ignore_case(&chunk.name, text)
                || contains_ignore_case(&chunk.content, text);
        }
        true
    }
}

/// Result ordering for [`Collection::find`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    /// Insertion order.
    #[default]
    Storage,
    OrderAsc,
    OrderDesc,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions {
    pub sort: Sort,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted(sort: Sort) -> Self {
        Self { sort, limit: None }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Field set written by [`Collection::update_one`].
#[derive(Debug, Clone)]
pub struct ChunkPatch {
    pub name: String,
    pub content: String,
    pub linked_prompt_id: String,
    pub updated_at: DateTime<Utc>,
}

/// One element of a [`Collection::set_orders`] batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub template_id: String,
    pub chunk_id: String,
    pub chunk_order: i64,
}

/// Abstract chunk collection.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_one`](Collection::insert_one) | Insert a new record (never overwrites) |
/// | [`find`](Collection::find) | Filter, sort, and limit records |
/// | [`find_one`](Collection::find_one) | First match in storage order |
/// | [`update_one`](Collection::update_one) | Patch the first matching record |
/// | [`delete_one`](Collection::delete_one) | Remove the first matching record |
/// | [`delete_many`](Collection::delete_many) | Remove every matching record |
/// | [`set_orders`](Collection::set_orders) | Batched `chunk_order` writes |
/// | [`replace_group`](Collection::replace_group) | Swap a template's whole chunk set |
#[async_trait]
pub trait Collection: Send + Sync {
    /// Insert a record. Fails if its `chunk_id` already exists.
    async fn insert_one(&self, chunk: &TemplateChunk) -> Result<()>;

    async fn find(&self, filter: &ChunkFilter, opts: FindOptions) -> Result<Vec<TemplateChunk>>;

    async fn find_one(&self, filter: &ChunkFilter) -> Result<Option<TemplateChunk>> {
        let mut found = self.find(filter, FindOptions::default().limit(1)).await?;
        Ok(found.pop())
    }

    /// Patch the first matching record. Returns `true` if one was modified.
    async fn update_one(&self, filter: &ChunkFilter, patch: &ChunkPatch) -> Result<bool>;

    /// Returns `true` if a record was removed.
    async fn delete_one(&self, filter: &ChunkFilter) -> Result<bool>;

    /// Returns the number of records removed.
    async fn delete_many(&self, filter: &ChunkFilter) -> Result<u64>;

    /// Apply each update to the record with that `chunk_id` and
    /// `template_id`.
    ///
    /// Returns how many records actually changed order. Whether the batch is
    /// all-or-nothing depends on the backend.
    async fn set_orders(&self, updates: &[OrderUpdate]) -> Result<u64>;

    /// Delete every chunk of `template_id`, then insert `chunks`.
    ///
    /// The default implementation is a plain sequence of calls: a failure
    /// after the delete leaves the template partially written. Backends with
    /// transactions override it to make the swap atomic.
    async fn replace_group(&self, template_id: &str, chunks: &[TemplateChunk]) -> Result<()> {
        let removed = self
            .delete_many(&ChunkFilter::template(template_id))
            .await
            .context("delete existing chunks")?;
        for (written, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.insert_one(chunk).await {
                tracing::error!(
                    template_id,
                    removed,
                    written,
                    total = chunks.len(),
                    "replace_group failed while inserting; template left partially written"
                );
                return Err(e.context(format!("insert chunk {} of {}", written, chunks.len())));
            }
        }
        Ok(())
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
