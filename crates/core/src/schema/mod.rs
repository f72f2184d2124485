//! Schema dump sanitizer.
//!
//! Turns a `pg_dump --schema-only` file into an idempotent schema-creation
//! template and embeds it in a JavaScript module. The work is a static,
//! ordered rule table applied statement by statement:
//!
//! | Rule | Effect |
//! |------|--------|
//! | `session_setting` | drop `SET ...` |
//! | `set_config` | drop `SELECT pg_catalog.set_config(...)` |
//! | `owner` | drop `ALTER ... OWNER TO ...` |
//! | `privileges` | drop `GRANT` / `REVOKE` |
//! | `extension_comment` | drop `COMMENT ON EXTENSION` |
//! | `if_not_exists` | `CREATE TABLE/INDEX/SEQUENCE/SCHEMA/EXTENSION` gain `IF NOT EXISTS` |
//! | `or_replace` | `CREATE FUNCTION/PROCEDURE/VIEW` become `CREATE OR REPLACE` |
//! | `guarded` | `ADD CONSTRAINT`, `CREATE TYPE/DOMAIN/TRIGGER/POLICY` wrapped in a `DO` block |
//!
//! The configured schema qualifier is stripped from code and quoted
//! identifiers but not from string literals, except `'...'::regclass` casts.
//! Rules never fire on their own output, so sanitizing a template again
//! leaves it unchanged.

mod splitter;

pub use splitter::{split_statements, SplitStats, Statement};

use splitter::SpanKind;

use std::collections::BTreeMap;
use std::path::Path;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::SchemaConfig;
use crate::errors::SchemaError;

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Drop,
    IfNotExists,
    OrReplace,
    Guard,
}

struct Rule {
    name: &'static str,
    pattern: &'static str,
    action: Action,
}

/// Order matters: the first matching rule wins.
const RULES: &[Rule] = &[
    Rule {
        name: "session_setting",
        pattern: r"(?i)^SET\s",
        action: Action::Drop,
    },
    Rule {
        name: "set_config",
        pattern: r"(?i)^SELECT\s+pg_catalog\.set_config\s*\(",
        action: Action::Drop,
    },
    Rule {
        name: "owner",
        pattern: r"(?is)^ALTER\s.*\sOWNER\s+TO\s",
        action: Action::Drop,
    },
    Rule {
        name: "privileges",
        pattern: r"(?i)^(GRANT|REVOKE)\s",
        action: Action::Drop,
    },
    Rule {
        name: "extension_comment",
        pattern: r"(?i)^COMMENT\s+ON\s+EXTENSION\s",
        action: Action::Drop,
    },
    Rule {
        name: "if_not_exists",
        pattern: r"(?i)^(CREATE\s+(?:(?:UNLOGGED|TEMP|TEMPORARY)\s+)?TABLE\s+|CREATE\s+(?:UNIQUE\s+)?INDEX\s+(?:CONCURRENTLY\s+)?|CREATE\s+SEQUENCE\s+|CREATE\s+SCHEMA\s+|CREATE\s+EXTENSION\s+)",
        action: Action::IfNotExists,
    },
    Rule {
        name: "or_replace",
        pattern: r"(?i)^(CREATE)\s+(FUNCTION|PROCEDURE|VIEW)\b",
        action: Action::OrReplace,
    },
    Rule {
        name: "guarded",
        pattern: r"(?is)^(ALTER\s+TABLE\s.*\sADD\s+CONSTRAINT\s|CREATE\s+(TYPE|DOMAIN|TRIGGER|POLICY)\s)",
        action: Action::Guard,
    },
];

/// Exceptions swallowed by a guarded statement.
const GUARD_EXCEPTIONS: &str =
    "duplicate_object OR duplicate_table OR invalid_table_definition";

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a sanitize pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub statements_in: usize,
    pub statements_out: usize,
    pub comments_removed: usize,
    pub meta_commands_removed: usize,
    /// Statements dropped, by rule name.
    pub dropped: BTreeMap<String, usize>,
    /// Statements rewritten, by rule name.
    pub rewritten: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// Compiled rule table plus the schema qualifier to strip.
pub struct SchemaSanitizer {
    rules: Vec<(&'static Rule, Regex)>,
    if_not_exists: Regex,
    /// Schema name and the pattern matching its qualifier.
    strip: Option<(String, Regex)>,
}

impl SchemaSanitizer {
    /// Build a sanitizer. `strip_schema` is a bare identifier such as
    /// `public`, or empty to keep qualifiers.
    pub fn new(strip_schema: &str) -> Result<Self, SchemaError> {
        let rules = RULES
            .iter()
            .map(|rule| compile(rule.pattern).map(|re| (rule, re)))
            .collect::<Result<Vec<_>, _>>()?;
        let if_not_exists = compile(r"(?i)^IF\s+NOT\s+EXISTS\s")?;

        let strip = match strip_schema.trim() {
            "" => None,
            name if is_sql_identifier(name) => Some((
                name.to_string(),
                compile(&format!(r#"(?:"{name}"|\b{name})\."#))?,
            )),
            other => return Err(SchemaError::InvalidIdentifier(other.to_string())),
        };

        Ok(Self {
            rules,
            if_not_exists,
            strip,
        })
    }

    pub fn from_config(config: &SchemaConfig) -> Result<Self, SchemaError> {
        Self::new(&config.strip_schema)
    }

    /// Sanitize a whole dump.
    #[instrument(skip_all, fields(bytes = sql.len()))]
    pub fn sanitize(&self, sql: &str) -> Result<(String, SanitizeReport), SchemaError> {
        let (statements, split_stats) = split_statements(sql)?;
        let mut report = SanitizeReport {
            statements_in: statements.len(),
            comments_removed: split_stats.comments,
            meta_commands_removed: split_stats.meta_commands,
            ..Default::default()
        };

        let mut out = Vec::with_capacity(statements.len());
        for statement in &statements {
            match self.sanitize_statement(&statement.text) {
                Outcome::Dropped(rule) => {
                    debug!(rule, line = statement.line, "dropped statement");
                    *report.dropped.entry(rule.to_string()).or_default() += 1;
                }
                Outcome::Rewritten(rule, text) => {
                    *report.rewritten.entry(rule.to_string()).or_default() += 1;
                    out.push(text);
                }
                Outcome::Kept(text) => out.push(text),
            }
        }

        report.statements_out = out.len();
        info!(
            statements_in = report.statements_in,
            statements_out = report.statements_out,
            "schema sanitized"
        );

        let mut sql = out.join(";\n\n");
        if !sql.is_empty() {
            sql.push(';');
        }
        Ok((sql, report))
    }

    fn sanitize_statement(&self, text: &str) -> Outcome {
        let text = self.strip_qualifier(text);
        let Some((rule, re)) = self.rules.iter().find(|(_, re)| re.is_match(&text)) else {
            return Outcome::Kept(text);
        };

        match rule.action {
            Action::Drop => Outcome::Dropped(rule.name),
            Action::IfNotExists => {
                let end = re.find(&text).map_or(0, |m| m.end());
                let (head, rest) = text.split_at(end);
                // Already guarded, or an unnamed index that cannot take the clause.
                if self.if_not_exists.is_match(rest) || starts_with_word(rest, "ON") {
                    return Outcome::Kept(text);
                }
                Outcome::Rewritten(rule.name, format!("{}IF NOT EXISTS {}", head, rest))
            }
            Action::OrReplace => Outcome::Rewritten(
                rule.name,
                re.replace(&text, "$1 OR REPLACE $2").into_owned(),
            ),
            Action::Guard => Outcome::Rewritten(rule.name, guard(&text)),
        }
    }

    /// Remove the schema qualifier from code and quoted identifiers. String
    /// literals are left alone unless they are cast to `regclass`, as in
    /// `nextval('public.seq'::regclass)`.
    fn strip_qualifier(&self, text: &str) -> String {
        let Some((name, re)) = &self.strip else {
            return text.to_string();
        };
        let quoted = format!("\"{name}\"");
        let parts = splitter::spans(text);

        let mut out = String::with_capacity(text.len());
        let mut drop_dot = false;
        for (idx, &(kind, part)) in parts.iter().enumerate() {
            let part = if std::mem::take(&mut drop_dot) {
                part.strip_prefix('.').unwrap_or(part)
            } else {
                part
            };
            let next = parts.get(idx + 1).map_or("", |&(_, p)| p);
            match kind {
                SpanKind::Code => out.push_str(&re.replace_all(part, "")),
                SpanKind::Identifier if part == quoted && next.starts_with('.') => drop_dot = true,
                SpanKind::Literal if next.starts_with("::regclass") => {
                    out.push_str(&re.replace_all(part, ""))
                }
                _ => out.push_str(part),
            }
        }
        out
    }

    /// Read `input`, sanitize it, embed it, and write `output`.
    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        variable: &str,
        header: &str,
    ) -> Result<SanitizeReport, SchemaError> {
        let sql = std::fs::read_to_string(input).map_err(|source| SchemaError::ReadFailed {
            path: input.display().to_string(),
            source,
        })?;
        let (sanitized, report) = self.sanitize(&sql)?;
        if sanitized.is_empty() {
            return Err(SchemaError::Empty(input.display().to_string()));
        }

        let module = embed_js(&sanitized, variable, header)?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SchemaError::WriteFailed {
                path: output.display().to_string(),
                source,
            })?;
        }
        std::fs::write(output, module).map_err(|source| SchemaError::WriteFailed {
            path: output.display().to_string(),
            source,
        })?;

        info!(bytes = sanitized.len(), "schema template written");
        Ok(report)
    }
}

enum Outcome {
    Dropped(&'static str),
    Rewritten(&'static str, String),
    Kept(String),
}

fn compile(pattern: &str) -> Result<Regex, SchemaError> {
    Regex::new(pattern).map_err(|e| SchemaError::Pattern(e.to_string()))
}

fn starts_with_word(text: &str, word: &str) -> bool {
    match (text.get(..word.len()), text.get(word.len()..)) {
        (Some(head), Some(tail)) => {
            head.eq_ignore_ascii_case(word) && tail.chars().next().map_or(true, char::is_whitespace)
        }
        _ => false,
    }
}

/// Wrap a statement so re-running it after the object exists is a no-op.
fn guard(statement: &str) -> String {
    let tag = if statement.contains("$$") { "$guard$" } else { "$$" };
    format!(
        "DO {tag} BEGIN\n{statement};\nEXCEPTION WHEN {GUARD_EXCEPTIONS} THEN NULL;\nEND {tag}"
    )
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// JavaScript embedding
// ---------------------------------------------------------------------------

const JS_RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Whether `name` can be used as a JavaScript `const` name.
pub fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    head_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !JS_RESERVED.contains(&name)
}

/// Escape text for a JavaScript template literal.
pub fn escape_template_literal(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

/// Render a CommonJS module exporting `sql` as `variable`.
pub fn embed_js(sql: &str, variable: &str, header: &str) -> Result<String, SchemaError> {
    if !is_js_identifier(variable) {
        return Err(SchemaError::InvalidIdentifier(variable.to_string()));
    }
    let header = header.replace("*/", "* /");
    Ok(format!(
        "/**\n * {header}\n * Generated by upsync from a schema dump. Do not edit by hand.\n */\n\nconst {variable} = `\n{sql}\n`;\n\nmodule.exports = {variable};\n",
        sql = escape_template_literal(sql),
    ))
}
