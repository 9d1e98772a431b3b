//! # Templar CLI (`templar`)
//!
//! ```bash
//! templar --config ./config/templar.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `templar init` | Create the SQLite database and schema |
//! | `templar serve` | Start the HTTP server |
//! | `templar list` | List templates (main chunks) |
//! | `templar get <id>` | Show a template or chunk |
//! | `templar chunks <template_id>` | Show every chunk in order |
//! | `templar search "<query>"` | Search template names and main content |
//! | `templar add <template_id> <content>` | Append a chunk |
//! | `templar reorder <template_id> <chunk_id>...` | Set chunk order |
//! | `templar split <file>` | Preview how a file segments into chunks |
//! | `templar import <template_id> <file>` | Replace content from a file |
//! | `templar export <template_id>` | Print the joined content |
//! | `templar delete <template_id>` | Delete a template |
//! | `templar delete-chunk <chunk_id>` | Delete one chunk |
//! | `templar seed` | Write the sample certificate template |
//! | `templar completions <shell>` | Print shell completions |

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use templar::config::{self, Config};
use templar::{edit, get, logging, migrate, search, server};

/// Templar: a template chunk store with an HTTP API and agent tools.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/templar.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "templar", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/templar.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// List templates, one line per main chunk.
    List,

    /// Show a template (by template id) or a single chunk (by chunk id).
    Get {
        /// Template id or chunk id.
        id: String,
    },

    /// Show every chunk of a template in order.
    Chunks {
        template_id: String,
    },

    /// Search template names and main-chunk content, ignoring case.
    Search {
        query: String,
    },

    /// Append a chunk after the template's last chunk.
    Add {
        template_id: String,
        content: String,
    },

    /// Reorder a template's chunks: the first id gets order 0, and so on.
    Reorder {
        template_id: String,
        #[arg(required = true)]
        chunk_ids: Vec<String>,
    },

    /// Show the chunks a file would be split into, without writing.
    ///
    /// Uses the configured marker, or the default when no config file exists.
    Split {
        file: PathBuf,
    },

    /// Replace a template's chunks with the segments of a file.
    ///
    /// Segments are separated by lines holding only the configured marker
    /// (`---` by default).
    Import {
        template_id: String,
        file: PathBuf,
    },

    /// Print a template's chunks joined into one document.
    Export {
        template_id: String,
    },

    /// Delete every chunk of a template.
    Delete {
        template_id: String,
    },

    /// Delete a single chunk.
    DeleteChunk {
        chunk_id: String,
    },

    /// Write the sample certificate of insurance template.
    Seed,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "templar", &mut std::io::stdout());
        return Ok(());
    }
    if let Commands::Split { ref file } = cli.command {
        // Use config if available, otherwise a minimal default
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
        edit::run_split(&cfg, file)?;
        return Ok(());
    }

    let cfg: Config = config::load_config(&cli.config)?;
    logging::init(Some(&cfg));

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::List => search::run_list(&cfg).await?,
        Commands::Get { id } => get::run_get(&cfg, &id).await?,
        Commands::Chunks { template_id } => get::run_chunks(&cfg, &template_id).await?,
        Commands::Search { query } => search::run_search(&cfg, &query).await?,
        Commands::Add {
            template_id,
            content,
        } => edit::run_add(&cfg, &template_id, &content).await?,
        Commands::Reorder {
            template_id,
            chunk_ids,
        } => edit::run_reorder(&cfg, &template_id, &chunk_ids).await?,
        Commands::Import { template_id, file } => {
            edit::run_import(&cfg, &template_id, &file).await?
        }
        Commands::Export { template_id } => get::run_export(&cfg, &template_id).await?,
        Commands::Delete { template_id } => edit::run_delete(&cfg, &template_id).await?,
        Commands::DeleteChunk { chunk_id } => edit::run_delete_chunk(&cfg, &chunk_id).await?,
        Commands::Seed => edit::run_seed(&cfg).await?,
        Commands::Completions { .. } | Commands::Split { .. } => unreachable!(),
    }

    Ok(())
}
