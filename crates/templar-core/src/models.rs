//! Core data models for Templar.
//!
//! A template is a group of [`TemplateChunk`]s sharing a `template_id`,
//! ordered by `chunk_order`. The chunk at order 0 is the template's main
//! chunk and stands in for the whole template in listings and search.
//!
//! Input shapes ([`NewChunk`], [`ChunkUpdate`]) are validated here, before
//! any record is built.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TemplateError};

/// One ordered unit of a template's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateChunk {
    /// Grouping key shared by every chunk of one template.
    pub template_id: String,
    /// Unique across the whole store.
    pub chunk_id: String,
    /// Position within the template. 0 is the main chunk.
    pub chunk_order: i64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Opaque reference to an external prompt resource.
    pub linked_prompt_id: String,
}

impl TemplateChunk {
    pub fn is_main(&self) -> bool {
        self.chunk_order == 0
    }
}

/// Caller-supplied chunk for `create`.
///
/// Blank or missing identifiers are replaced with fresh UUIDs. Timestamps
/// are always set by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewChunk {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub chunk_order: Option<i64>,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub linked_prompt_id: String,
}

impl NewChunk {
    /// A main chunk (order 0) for the given template.
    pub fn main(
        template_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            template_id: Some(template_id.into()),
            chunk_order: Some(0),
            name: name.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_chunk_id(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.chunk_order = Some(order);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(order) = self.chunk_order {
            if order < 0 {
                return Err(TemplateError::invalid(format!(
                    "chunk_order must be >= 0, got {}",
                    order
                )));
            }
        }
        Ok(())
    }

    /// Build the record to insert, generating missing identifiers.
    pub fn into_chunk(self, now: DateTime<Utc>) -> TemplateChunk {
        TemplateChunk {
            template_id: present(self.template_id).unwrap_or_else(new_id),
            chunk_id: present(self.chunk_id).unwrap_or_else(new_id),
            chunk_order: self.chunk_order.unwrap_or(0),
            name: self.name,
            content: self.content,
            created_at: now,
            updated_at: now,
            linked_prompt_id: self.linked_prompt_id,
        }
    }
}

/// Writable fields of a template's main chunk.
///
/// Identity (`template_id`, `chunk_id`, `chunk_order`) and `created_at`
/// are never changed by an update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkUpdate {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub linked_prompt_id: String,
}

/// Current time at the millisecond precision every backend can store.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn present(id: Option<String>) -> Option<String> {
    id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
