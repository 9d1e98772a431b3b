//! In-memory [`Collection`] implementation for tests and embedding.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, so storage order is
//! insertion order. Every operation takes the lock once, which makes
//! [`set_orders`](Collection::set_orders) and
//! [`replace_group`](Collection::replace_group) atomic here.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::TemplateChunk;

use super::{ChunkFilter, ChunkPatch, Collection, FindOptions, OrderUpdate, Sort};

/// In-memory chunk collection.
#[derive(Debug, Default)]
pub struct InMemoryCollection {
    chunks: RwLock<Vec<TemplateChunk>>,
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    async fn insert_one(&self, chunk: &TemplateChunk) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        if chunks.iter().any(|c| c.chunk_id == chunk.chunk_id) {
            bail!("duplicate chunk_id: {}", chunk.chunk_id);
        }
        chunks.push(chunk.clone());
        Ok(())
    }

    async fn find(&self, filter: &ChunkFilter, opts: FindOptions) -> Result<Vec<TemplateChunk>> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<TemplateChunk> =
            chunks.iter().filter(|c| filter.matches(c)).cloned().collect();
        match opts.sort {
            Sort::Storage => {}
            Sort::OrderAsc => found.sort_by_key(|c| c.chunk_order),
            Sort::OrderDesc => found.sort_by_key(|c| Reverse(c.chunk_order)),
        }
        if let Some(limit) = opts.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn update_one(&self, filter: &ChunkFilter, patch: &ChunkPatch) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let Some(chunk) = chunks.iter_mut().find(|c| filter.matches(c)) else {
            return Ok(false);
        };
        chunk.name = patch.name.clone();
        chunk.content = patch.content.clone();
        chunk.linked_prompt_id = patch.linked_prompt_id.clone();
        chunk.updated_at = patch.updated_at;
        Ok(true)
    }

    async fn delete_one(&self, filter: &ChunkFilter) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        match chunks.iter().position(|c| filter.matches(c)) {
            Some(pos) => {
                chunks.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_many(&self, filter: &ChunkFilter) -> Result<u64> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let before = chunks.len();
        chunks.retain(|c| !filter.matches(c));
        Ok((before - chunks.len()) as u64)
    }

    async fn set_orders(&self, updates: &[OrderUpdate]) -> Result<u64> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let mut changed = 0;
        for update in updates {
            let target = chunks
                .iter_mut()
                .find(|c| c.chunk_id == update.chunk_id && c.template_id == update.template_id);
            if let Some(chunk) = target {
                if chunk.chunk_order != update.chunk_order {
                    chunk.chunk_order = update.chunk_order;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn replace_group(&self, template_id: &str, new_chunks: &[TemplateChunk]) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);

        let mut ids: HashSet<&str> = chunks
            .iter()
            .filter(|c| c.template_id != template_id)
            .map(|c| c.chunk_id.as_str())
            .collect();
        for chunk in new_chunks {
            if !ids.insert(chunk.chunk_id.as_str()) {
                bail!("duplicate chunk_id: {}", chunk.chunk_id);
            }
        }

        chunks.retain(|c| c.template_id != template_id);
        chunks.extend(new_chunks.iter().cloned());
        Ok(())
    }
}
