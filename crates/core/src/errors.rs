//! Error types for the upsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Errors
//! from lower layers are wrapped with `#[from]` where one subsystem calls
//! another, as [`TriageError`] does with [`GitError`].
//!
//! The change classifier has no error type: it is a pure function over
//! well-formed path sets and cannot fail.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// The repository has no working directory (bare repository).
    #[error("git repository at '{0}' has no working tree")]
    BareRepository(String),

    /// Checkout of one or more paths from a reference failed.
    #[error("checkout of {count} path(s) from '{reference}' failed: {detail}")]
    CheckoutFailed {
        reference: String,
        count: usize,
        detail: String,
    },

    /// A path reported by git was not valid UTF-8.
    #[error("non UTF-8 path in git output: {0}")]
    NonUtf8Path(String),
}

// ---------------------------------------------------------------------------
// Triage errors
// ---------------------------------------------------------------------------

/// Errors from the upstream triage engine.
#[derive(Debug, Error)]
pub enum TriageError {
    /// The working-tree status reported paths as both modified and deleted.
    #[error("{} path(s) reported as both modified and deleted: {}", .paths.len(), .paths.join(", "))]
    OverlappingStatus { paths: Vec<String> },

    /// Underlying Git error while querying or writing the repository.
    #[error("triage git error: {0}")]
    GitError(#[from] GitError),

    /// Invalid engine settings.
    #[error("invalid triage setting '{field}': {detail}")]
    InvalidSetting { field: String, detail: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A section the command needs is absent.
    #[error("configuration section [{0}] is missing")]
    MissingSection(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

/// Errors from the schema sanitizer.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The dump file could not be read.
    #[error("failed to read schema dump '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The output file could not be written.
    #[error("failed to write schema template '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The dump ended inside a quoted string or dollar-quoted body.
    #[error("unterminated {kind} starting near line {line}")]
    Unterminated { kind: String, line: usize },

    /// The JS variable name for the embedded template is not an identifier.
    #[error("invalid JavaScript identifier: '{0}'")]
    InvalidIdentifier(String),

    /// A rule pattern failed to compile.
    #[error("invalid sanitizer pattern: {0}")]
    Pattern(String),

    /// The dump contained no statements after sanitization.
    #[error("schema dump '{0}' produced no statements")]
    Empty(String),
}
