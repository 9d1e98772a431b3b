//! Read commands: `templar get`, `templar chunks`, `templar export`.
//!
//! # Usage
//!
//! ```bash
//! templar get cert-of-insurance-001        # by template id or chunk id
//! templar chunks cert-of-insurance-001     # every chunk, in order
//! templar export cert-of-insurance-001 > cert.md
//! ```

use anyhow::{bail, Result};

use templar_core::TemplateChunk;

use crate::config::Config;
use crate::sqlite_store::open_store;

/// CLI entry point for `templar get <id>`.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.get(id).await;
    pool.close().await;

    match result? {
        Some(chunk) => {
            print_chunk(&chunk);
            Ok(())
        }
        None => bail!("template not found: {}", id),
    }
}

/// CLI entry point for `templar chunks <template_id>`.
pub async fn run_chunks(config: &Config, template_id: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.list_chunks(template_id).await;
    pool.close().await;

    let chunks = result?;
    if chunks.is_empty() {
        println!("No chunks for template {}.", template_id);
        return Ok(());
    }
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_chunk(chunk);
    }
    Ok(())
}

/// CLI entry point for `templar export <template_id>`.
///
/// Prints the joined content, ready for `templar import`.
pub async fn run_export(config: &Config, template_id: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.assemble(template_id).await;
    pool.close().await;

    match result? {
        Some(content) => {
            println!("{}", content);
            Ok(())
        }
        None => bail!("template not found: {}", template_id),
    }
}

pub(crate) fn print_chunk(chunk: &TemplateChunk) {
    println!("--- Chunk {} ---", chunk.chunk_order);
    println!("template_id:      {}", chunk.template_id);
    println!("chunk_id:         {}", chunk.chunk_id);
    if !chunk.name.is_empty() {
        println!("name:             {}", chunk.name);
    }
    if !chunk.linked_prompt_id.is_empty() {
        println!("linked_prompt_id: {}", chunk.linked_prompt_id);
    }
    println!("created_at:       {}", chunk.created_at.to_rfc3339());
    println!("updated_at:       {}", chunk.updated_at.to_rfc3339());
    println!();
    println!("{}", chunk.content);
}
