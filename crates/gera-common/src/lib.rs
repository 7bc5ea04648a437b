//! Shared types for the Gera compiler: spans and source files, symbol
//! paths, and the syntax tree consumed by type checking and lowering.

pub mod ast;
pub mod build;
pub mod path;
pub mod source;
pub mod span;

pub use path::Path;
pub use span::{FileId, Span};
