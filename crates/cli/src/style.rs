//! Shared styling utilities for the CLI.

use console::Style;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// A row group in triage tables: the four classification buckets plus
/// paths held back by ignore patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    DeletedByUser,
    MissingFromRemote,
    Conflict,
    SafeUpdate,
    Ignored,
}

impl Bucket {
    pub fn name(self) -> &'static str {
        match self {
            Bucket::DeletedByUser => "deleted by you",
            Bucket::MissingFromRemote => "missing locally",
            Bucket::Conflict => "conflict",
            Bucket::SafeUpdate => "safe update",
            Bucket::Ignored => "ignored",
        }
    }

    /// What triage does with paths in this bucket.
    pub fn action(self) -> &'static str {
        match self {
            Bucket::DeletedByUser => "keep deleted",
            Bucket::MissingFromRemote => "restore",
            Bucket::Conflict => "review",
            Bucket::SafeUpdate => "overwrite",
            Bucket::Ignored => "skip",
        }
    }

    /// Coloured bucket label for tables.
    pub fn label(self) -> String {
        let style = match self {
            Bucket::DeletedByUser => Style::new().dim(),
            Bucket::MissingFromRemote => Style::new().blue().bold(),
            Bucket::Conflict => Style::new().red().bold(),
            Bucket::SafeUpdate => Style::new().green().bold(),
            Bucket::Ignored => Style::new().yellow(),
        };
        style.apply_to(self.name()).to_string()
    }
}
