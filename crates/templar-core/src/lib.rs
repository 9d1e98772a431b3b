//! # Templar Core
//!
//! Storage-agnostic logic for Templar: the template chunk model, the
//! content segmenter, the [`store::Collection`] persistence trait with an
//! in-memory implementation, and the [`templates::TemplateStore`] that
//! implements every chunk operation on top of a collection.
//!
//! This crate contains no sqlx, HTTP, or filesystem dependencies. Backends
//! live in the application crate and are injected as
//! `Arc<dyn Collection>`.

pub mod error;
pub mod lock;
pub mod models;
pub mod segment;
pub mod store;
pub mod templates;

pub use error::TemplateError;
pub use models::{ChunkUpdate, NewChunk, TemplateChunk};
pub use segment::Segmenter;
pub use templates::TemplateStore;
