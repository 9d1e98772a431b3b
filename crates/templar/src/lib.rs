//! # Templar
//!
//! **A template chunk store with an HTTP API and agent tools.**
//!
//! A template is an ordered group of text chunks sharing a `template_id`.
//! Templar stores them in SQLite, lets an editor append, reorder, and
//! re-segment them, and exposes everything through a CLI, a JSON HTTP API,
//! and tool endpoints for LLM agents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌─────────────┐
//! │   CLI    │  │   HTTP   │  │ Agent tools │
//! │(templar) │  │  (axum)  │  │  /tools/*   │
//! └────┬─────┘  └────┬─────┘  └──────┬──────┘
//!      └─────────────┼───────────────┘
//!                    ▼
//!           ┌─────────────────┐
//!           │  TemplateStore  │  templar-core
//!           └────────┬────────┘
//!                    ▼
//!           ┌─────────────────┐
//!           │SqliteCollection │  template_chunks
//!           └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Idempotent schema creation |
//! | [`sqlite_store`] | SQLite `Collection` and store construction |
//! | [`server`] | HTTP API with CORS, tracing, graceful shutdown |
//! | [`tools`] | `Tool` trait, registry, and built-in agent tools |
//! | [`get`], [`search`], [`edit`] | CLI command implementations |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod db;
pub mod edit;
pub mod get;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod tools;

pub use sqlite_store::SqliteCollection;
pub use templar_core::{store, ChunkUpdate, NewChunk, TemplateChunk, TemplateError, TemplateStore};
pub use tools::{Tool, ToolContext, ToolRegistry};
