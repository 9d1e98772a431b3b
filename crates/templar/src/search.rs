//! Listing commands: `templar list` and `templar search`.
//!
//! Both print one line per template, taken from its main chunk.

use anyhow::Result;

use templar_core::TemplateChunk;

use crate::config::Config;
use crate::sqlite_store::open_store;

/// CLI entry point for `templar list`.
pub async fn run_list(config: &Config) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.list_main_templates().await;
    pool.close().await;

    print_templates(&result?, "No templates stored.");
    Ok(())
}

/// CLI entry point for `templar search <query>`.
pub async fn run_search(config: &Config, query: &str) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let result = store.search(query).await;
    pool.close().await;

    print_templates(&result?, "No results.");
    Ok(())
}

fn print_templates(mains: &[TemplateChunk], empty: &str) {
    if mains.is_empty() {
        println!("{}", empty);
        return;
    }
    for chunk in mains {
        let name = if chunk.name.is_empty() {
            "(untitled)"
        } else {
            chunk.name.as_str()
        };
        println!("{}  {}", chunk.template_id, name);
        println!("    {}", preview(&chunk.content, 80));
    }
}

/// First line of `content`, cut to `max` characters.
pub(crate) fn preview(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max).collect();
    format!("{}...", cut)
}
