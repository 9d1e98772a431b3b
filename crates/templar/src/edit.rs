//! Write commands: `add`, `reorder`, `import`, `delete`, `delete-chunk`,
//! and `seed`, plus `split` to preview an import.
//!
//! # Usage
//!
//! ```bash
//! templar add cert-of-insurance-001 "CANCELLATION\n..."
//! templar reorder cert-of-insurance-001 main-chunk-001 insured-chunk-001 producer-chunk-001
//! templar split ./cert.md
//! templar import cert-of-insurance-001 ./cert.md
//! templar delete-chunk producer-chunk-001
//! templar delete cert-of-insurance-001
//! ```

use anyhow::{bail, Context, Result};
use std::path::Path;

use templar_core::segment::Segmenter;
use templar_core::{NewChunk, TemplateChunk};

use crate::config::Config;
use crate::search::preview;
use crate::sqlite_store::open_store;

/// Template id of the sample written by `templar seed`.
pub const SAMPLE_TEMPLATE_ID: &str = "cert-of-insurance-001";

/// CLI entry point for `templar add <template_id> <content>`.
pub async fn run_add(config: &Config, template_id: &str, content: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.add_chunk(template_id, content).await;
    pool.close().await;

    let chunk = result?;
    println!(
        "Added chunk {} at order {} to {}.",
        chunk.chunk_id, chunk.chunk_order, template_id
    );
    Ok(())
}

/// CLI entry point for `templar reorder <template_id> <chunk_id>...`.
pub async fn run_reorder(config: &Config, template_id: &str, chunk_ids: &[String]) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.reorder(template_id, chunk_ids).await;
    pool.close().await;

    if result? {
        println!("Reordered {} chunks of {}.", chunk_ids.len(), template_id);
    } else {
        println!("No chunk of {} changed order.", template_id);
    }
    Ok(())
}

/// CLI entry point for `templar import <template_id> <file>`.
///
/// Replaces the template's chunks with the segments of the file.
pub async fn run_import(config: &Config, template_id: &str, file: &Path) -> Result<()> {
    let blob = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let (pool, store) = open_store(config).await?;
    let result = store.replace_content(template_id, &blob).await;
    pool.close().await;

    let chunks = result?;
    println!(
        "Imported {} into {} ({} chunks).",
        file.display(),
        template_id,
        chunks.len()
    );
    Ok(())
}

/// CLI entry point for `templar split <file>`.
///
/// Shows the chunks `import` would write, without opening the database.
pub fn run_split(config: &Config, file: &Path) -> Result<()> {
    let blob = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let lines = describe_segments(&config.segmenter()?, &blob);
    for line in &lines {
        println!("{}", line);
    }
    println!("{} chunks.", lines.len());
    Ok(())
}

fn describe_segments(segmenter: &Segmenter, blob: &str) -> Vec<String> {
    segmenter
        .split(blob)
        .iter()
        .enumerate()
        .map(|(i, content)| format!("[{}] {}", i, preview(content, 60)))
        .collect()
}

/// CLI entry point for `templar delete <template_id>`.
pub async fn run_delete(config: &Config, template_id: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.delete_group(template_id).await;
    pool.close().await;

    if !result? {
        bail!("template not found: {}", template_id);
    }
    println!("Deleted template {}.", template_id);
    Ok(())
}

/// CLI entry point for `templar delete-chunk <chunk_id>`.
pub async fn run_delete_chunk(config: &Config, chunk_id: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.delete_chunk(chunk_id).await;
    pool.close().await;

    if !result? {
        bail!("chunk not found: {}", chunk_id);
    }
    println!("Deleted chunk {}.", chunk_id);
    Ok(())
}

/// Chunks of the sample certificate of insurance template.
pub fn sample_certificate() -> Vec<NewChunk> {
    let sections = [
        (
            "main-chunk-001",
            "Commercial Certificate of Insurance",
            "CERTIFICATE OF LIABILITY INSURANCE\n\
             THIS CERTIFICATE IS ISSUED AS A MATTER OF INFORMATION ONLY AND \
             CONFERS NO RIGHTS UPON THE CERTIFICATE HOLDER.",
        ),
        (
            "producer-chunk-001",
            "Producer Information",
            "PRODUCER\n[Producer Name]\n[Street Address]\n[City, State, ZIP]\n\
             Phone: [Phone Number]\nEmail: [Email]",
        ),
        (
            "insured-chunk-001",
            "Insured Information",
            "INSURED\n[Company Name]\n[Street Address]\n[City, State, ZIP]",
        ),
    ];

    sections
        .iter()
        .enumerate()
        .map(|(order, (chunk_id, name, content))| {
            NewChunk::main(SAMPLE_TEMPLATE_ID, *name, *content)
                .with_chunk_id(*chunk_id)
                .with_order(order as i64)
        })
        .collect()
}

/// CLI entry point for `templar seed`.
///
/// Rewrites the sample template from scratch, so it can be run repeatedly.
pub async fn run_seed(config: &Config) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result: templar_core::error::Result<Vec<TemplateChunk>> = async {
        store.delete_group(SAMPLE_TEMPLATE_ID).await?;
        store.create_many(sample_certificate()).await
    }
    .await;
    pool.close().await;

    let created = result?;
    println!(
        "Seeded template {} ({} chunks).",
        SAMPLE_TEMPLATE_ID,
        created.len()
    );
    Ok(())
}
