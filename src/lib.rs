//! codewiki - cross-referenced documentation models for multi-language codebases
//!
//! Parses a source tree with tree-sitter, resolves symbols into call,
//! dependency and control-flow graphs, overlays analyzer annotations,
//! enriches units with provider text (or a templated fallback) and emits a
//! normalized document tree plus a flat search index.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod explain;
pub mod output;
pub mod parser;

// Re-export main types
pub use analysis::{Analysis, Pipeline};
pub use config::Config;
pub use error::{Error, Result};
pub use output::{Document, SearchIndex};
