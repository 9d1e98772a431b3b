//! Template chunk store.
//!
//! [`TemplateStore`] implements every template operation on top of an
//! injected [`Collection`]. It owns the ordering rules:
//!
//! - `chunk_order` of a template is `0..n` after every reorder and content
//!   replacement;
//! - the order-0 chunk is the template's main chunk, the only one listed
//!   and searched;
//! - appended chunks land after the current maximum order.
//!
//! # Concurrency
//!
//! Mutations addressed by `template_id` are serialized per template through
//! [`KeyedLocks`], so a `replace_content` never interleaves with an
//! `add_chunk` or `reorder` on the same template within one process.
//! Atomicity of each multi-record write is up to the collection (see
//! [`Collection::replace_group`]). `delete_chunk` is addressed by
//! `chunk_id` alone and is not serialized.
//!
//! # Errors
//!
//! "Nothing matched" is reported as `false` / `None` / empty. Rejected
//! input is [`TemplateError::Validation`]; any backend failure is
//! [`TemplateError::Persistence`] tagged with the operation name.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, TemplateError};
use crate::lock::KeyedLocks;
use crate::models::{self, ChunkUpdate, NewChunk, TemplateChunk};
use crate::segment::Segmenter;
use crate::store::{ChunkFilter, ChunkPatch, Collection, FindOptions, OrderUpdate, Sort};

/// Chunk operations over a shared collection.
pub struct TemplateStore {
    collection: Arc<dyn Collection>,
    segmenter: Segmenter,
    locks: KeyedLocks,
}

impl TemplateStore {
    pub fn new(collection: Arc<dyn Collection>) -> Self {
        Self {
            collection,
            segmenter: Segmenter::default(),
            locks: KeyedLocks::new(),
        }
    }

    /// Use `segmenter` for [`replace_content`](Self::replace_content) and
    /// [`assemble`](Self::assemble).
    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Insert a new chunk. Never overwrites: a taken `chunk_id` fails.
    ///
    /// Returns the stored record, whose `template_id` addresses the
    /// template as a whole.
    pub async fn create(&self, new: NewChunk) -> Result<TemplateChunk> {
        new.validate()?;
        let chunk = new.into_chunk(models::now());
        let _guard = self.locks.lock(&chunk.template_id).await;

        self.collection
            .insert_one(&chunk)
            .await
            .map_err(TemplateError::persistence("create"))?;

        debug!(
            template_id = %chunk.template_id,
            chunk_id = %chunk.chunk_id,
            chunk_order = chunk.chunk_order,
            "created chunk"
        );
        Ok(chunk)
    }

    /// Create each chunk in order.
    ///
    /// Every input is validated before the first write. A backend failure
    /// part-way leaves the earlier chunks in place.
    pub async fn create_many(&self, news: Vec<NewChunk>) -> Result<Vec<TemplateChunk>> {
        for (i, new) in news.iter().enumerate() {
            new.validate().map_err(|e| match e {
                TemplateError::Validation(msg) => {
                    TemplateError::invalid(format!("chunk {}: {}", i, msg))
                }
                other => other,
            })?;
        }
        let mut created = Vec::with_capacity(news.len());
        for new in news {
            created.push(self.create(new).await?);
        }
        Ok(created)
    }

    /// Look up by `template_id`, falling back to `chunk_id`.
    ///
    /// For a multi-chunk template this is the first chunk in storage order;
    /// use [`list_chunks`](Self::list_chunks) for the whole group.
    pub async fn get(&self, id: &str) -> Result<Option<TemplateChunk>> {
        let by_template = self
            .collection
            .find_one(&ChunkFilter::template(id))
            .await
            .map_err(TemplateError::persistence("get"))?;
        if by_template.is_some() {
            return Ok(by_template);
        }
        self.collection
            .find_one(&ChunkFilter::chunk(id))
            .await
            .map_err(TemplateError::persistence("get"))
    }

    /// All chunks of a template, ascending by `chunk_order`.
    pub async fn list_chunks(&self, template_id: &str) -> Result<Vec<TemplateChunk>> {
        self.collection
            .find(
                &ChunkFilter::template(template_id),
                FindOptions::sorted(Sort::OrderAsc),
            )
            .await
            .map_err(TemplateError::persistence("list_chunks"))
    }

    /// Overwrite the writable fields of the template's main chunk.
    ///
    /// Returns `false` if the template has no order-0 chunk.
    pub async fn update(&self, template_id: &str, update: ChunkUpdate) -> Result<bool> {
        let _guard = self.locks.lock(template_id).await;
        let patch = ChunkPatch {
            name: update.name,
            content: update.content,
            linked_prompt_id: update.linked_prompt_id,
            updated_at: models::now(),
        };
        self.collection
            .update_one(&ChunkFilter::template(template_id).with_order(0), &patch)
            .await
            .map_err(TemplateError::persistence("update"))
    }

    /// Remove every chunk of a template. `false` if there were none.
    pub async fn delete_group(&self, template_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(template_id).await;
        let removed = self
            .collection
            .delete_many(&ChunkFilter::template(template_id))
            .await
            .map_err(TemplateError::persistence("delete_group"))?;
        info!(template_id, removed, "deleted template");
        Ok(removed > 0)
    }

    pub async fn delete_chunk(&self, chunk_id: &str) -> Result<bool> {
        self.collection
            .delete_one(&ChunkFilter::chunk(chunk_id))
            .await
            .map_err(TemplateError::persistence("delete_chunk"))
    }

    /// One representative (the order-0 chunk) per template.
    pub async fn list_main_templates(&self) -> Result<Vec<TemplateChunk>> {
        self.collection
            .find(&ChunkFilter::main(), FindOptions::default())
            .await
            .map_err(TemplateError::persistence("list_main_templates"))
    }

    /// Append a chunk after the template's current last chunk.
    ///
    /// An empty template gets the chunk at order 1: order 0 is reserved for
    /// a main chunk, so the new chunk never becomes the template's
    /// representative.
    pub async fn add_chunk(&self, template_id: &str, content: &str) -> Result<TemplateChunk> {
        require_id("template_id", template_id)?;
        let _guard = self.locks.lock(template_id).await;

        let last = self
            .collection
            .find(
                &ChunkFilter::template(template_id),
                FindOptions::sorted(Sort::OrderDesc).limit(1),
            )
            .await
            .map_err(TemplateError::persistence("add_chunk"))?;
        let chunk_order = last.first().map(|c| c.chunk_order + 1).unwrap_or(1);

        let chunk = NewChunk {
            template_id: Some(template_id.to_string()),
            chunk_order: Some(chunk_order),
            content: content.to_string(),
            ..Default::default()
        }
        .into_chunk(models::now());

        self.collection
            .insert_one(&chunk)
            .await
            .map_err(TemplateError::persistence("add_chunk"))?;

        debug!(template_id, chunk_id = %chunk.chunk_id, chunk_order, "appended chunk");
        Ok(chunk)
    }

    /// Set `chunk_order = i` for the `i`-th id, as one batch.
    ///
    /// Chunks of the template missing from `chunk_ids` keep their order, so
    /// callers should pass the complete set. Ids belonging to other
    /// templates are ignored. Returns `true` if any order changed.
    pub async fn reorder(&self, template_id: &str, chunk_ids: &[String]) -> Result<bool> {
        require_id("template_id", template_id)?;
        let mut seen = HashSet::new();
        if let Some(dup) = chunk_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(TemplateError::invalid(format!(
                "chunk id listed twice: {}",
                dup
            )));
        }
        if chunk_ids.is_empty() {
            return Ok(false);
        }

        let updates: Vec<OrderUpdate> = chunk_ids
            .iter()
            .enumerate()
            .map(|(i, chunk_id)| OrderUpdate {
                template_id: template_id.to_string(),
                chunk_id: chunk_id.clone(),
                chunk_order: i as i64,
            })
            .collect();

        let _guard = self.locks.lock(template_id).await;
        let changed = self
            .collection
            .set_orders(&updates)
            .await
            .map_err(TemplateError::persistence("reorder"))?;

        debug!(template_id, changed, "reordered chunks");
        Ok(changed > 0)
    }

    /// Rebuild a template's chunks from one delimited blob.
    ///
    /// The new chunks take `name` and `linked_prompt_id` from the current
    /// main chunk (empty if there is none), are numbered `0..n` in segment
    /// order, and get fresh ids and timestamps. A blank blob still leaves one
    /// empty chunk at order 0.
    pub async fn replace_content(
        &self,
        template_id: &str,
        blob: &str,
    ) -> Result<Vec<TemplateChunk>> {
        require_id("template_id", template_id)?;
        let _guard = self.locks.lock(template_id).await;

        let main = self
            .collection
            .find_one(&ChunkFilter::template(template_id).with_order(0))
            .await
            .map_err(TemplateError::persistence("replace_content"))?;
        let (name, linked_prompt_id) = main
            .map(|c| (c.name, c.linked_prompt_id))
            .unwrap_or_default();

        let now = models::now();
        let chunks: Vec<TemplateChunk> = self
            .segmenter
            .split(blob)
            .into_iter()
            .enumerate()
            .map(|(i, content)| TemplateChunk {
                template_id: template_id.to_string(),
                chunk_id: models::new_id(),
                chunk_order: i as i64,
                name: name.clone(),
                content,
                created_at: now,
                updated_at: now,
                linked_prompt_id: linked_prompt_id.clone(),
            })
            .collect();

        if let Err(cause) = self.collection.replace_group(template_id, &chunks).await {
            warn!(template_id, error = %cause, "content replacement failed");
            return Err(TemplateError::persistence("replace_content")(cause));
        }

        info!(template_id, chunks = chunks.len(), "replaced template content");
        Ok(chunks)
    }

    /// Main chunks whose name or content contains `query`, ignoring case.
    pub async fn search(&self, query: &str) -> Result<Vec<TemplateChunk>> {
        self.collection
            .find(&ChunkFilter::main().containing(query), FindOptions::default())
            .await
            .map_err(TemplateError::persistence("search"))
    }

    /// The template's chunk contents joined into one delimited blob.
    ///
    /// Inverse of [`replace_content`](Self::replace_content). `None` if the
    /// template has no chunks.
    pub async fn assemble(&self, template_id: &str) -> Result<Option<String>> {
        let chunks = self.list_chunks(template_id).await?;
        if chunks.is_empty() {
            return Ok(None);
        }
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        Ok(Some(self.segmenter.join(&contents)))
    }
}

fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TemplateError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}
