//! upsync core library.
//!
//! This crate provides the pieces behind the `upsync` tool: the pure change
//! classifier, git collaborators for history and working-tree status, the
//! upstream triage engine, the schema dump sanitizer, and configuration.

pub mod classifier;
pub mod config;
pub mod errors;
pub mod git;
pub mod path_policy;
pub mod schema;
pub mod triage;

// Re-exports for convenience.
pub use classifier::{classify, Classification, PathSet, WorkingTreeStatus};
pub use config::AppConfig;
pub use git::GitClient;
pub use schema::SchemaSanitizer;
pub use triage::TriageEngine;
