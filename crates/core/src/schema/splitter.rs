//! Splits a SQL dump into statements.
//!
//! Understands single-quoted literals, double-quoted identifiers,
//! dollar-quoted bodies, `--` and `/* */` comments, and psql meta-commands.
//! Comments and meta-commands are dropped, and blank lines and trailing
//! whitespace outside literals are removed. Quoted literals and
//! dollar-quoted bodies are kept byte for byte.

use tracing::trace;

use crate::errors::SchemaError;

/// One statement without its terminating semicolon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    /// 1-based line the statement starts on.
    pub line: usize,
}

/// Counts of what the splitter dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitStats {
    pub comments: usize,
    pub meta_commands: usize,
}

enum Mode {
    Normal,
    SingleQuote { start: usize },
    DoubleQuote { start: usize },
    Dollar { tag: String, start: usize },
    BlockComment { start: usize },
}

/// Split `sql` into statements.
pub fn split_statements(sql: &str) -> Result<(Vec<Statement>, SplitStats), SchemaError> {
    let mut statements = Vec::new();
    let mut stats = SplitStats::default();
    let mut buf = String::new();
    let mut buf_line = 1usize;
    let mut line = 1usize;
    let mut mode = Mode::Normal;

    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match mode {
            Mode::Normal => match c {
                ';' => {
                    push_statement(&mut statements, &buf, buf_line);
                    buf.clear();
                }
                '-' if matches!(chars.peek(), Some((_, '-'))) => {
                    // Line comment: skip to end of line, keep the newline.
                    stats.comments += 1;
                    while let Some(&(_, next)) = chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                '/' if matches!(chars.peek(), Some((_, '*'))) => {
                    chars.next();
                    stats.comments += 1;
                    mode = Mode::BlockComment { start: line };
                }
                '\\' if buf.trim().is_empty() => {
                    stats.meta_commands += 1;
                    while let Some(&(_, next)) = chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                '\'' => {
                    start_text(&mut buf, &mut buf_line, line);
                    buf.push(c);
                    mode = Mode::SingleQuote { start: line };
                }
                '"' => {
                    start_text(&mut buf, &mut buf_line, line);
                    buf.push(c);
                    mode = Mode::DoubleQuote { start: line };
                }
                '$' => match dollar_tag(&sql[i..]) {
                    Some(tag) => {
                        start_text(&mut buf, &mut buf_line, line);
                        buf.push_str(&tag);
                        for _ in 1..tag.chars().count() {
                            chars.next();
                        }
                        mode = Mode::Dollar { tag, start: line };
                    }
                    None => buf.push(c),
                },
                '\n' => {
                    line += 1;
                    // Outside literals: drop trailing whitespace and blank lines.
                    let kept = buf.trim_end_matches(|c: char| c == ' ' || c == '\t' || c == '\r').len();
                    buf.truncate(kept);
                    if !buf.is_empty() && !buf.ends_with('\n') {
                        buf.push('\n');
                    }
                }
                _ => {
                    if !c.is_whitespace() {
                        start_text(&mut buf, &mut buf_line, line);
                    }
                    buf.push(c);
                }
            },
            Mode::SingleQuote { .. } => {
                buf.push(c);
                if c == '\n' {
                    line += 1;
                } else if c == '\'' {
                    // '' is an escaped quote inside the literal.
                    if matches!(chars.peek(), Some((_, '\''))) {
                        chars.next();
                        buf.push('\'');
                    } else {
                        mode = Mode::Normal;
                    }
                }
            }
            Mode::DoubleQuote { .. } => {
                buf.push(c);
                if c == '\n' {
                    line += 1;
                } else if c == '"' {
                    if matches!(chars.peek(), Some((_, '"'))) {
                        chars.next();
                        buf.push('"');
                    } else {
                        mode = Mode::Normal;
                    }
                }
            }
            Mode::Dollar { ref tag, .. } => {
                if c == '$' && sql[i..].starts_with(tag.as_str()) {
                    buf.push_str(tag);
                    for _ in 1..tag.chars().count() {
                        chars.next();
                    }
                    mode = Mode::Normal;
                } else {
                    if c == '\n' {
                        line += 1;
                    }
                    buf.push(c);
                }
            }
            Mode::BlockComment { .. } => {
                if c == '\n' {
                    line += 1;
                } else if c == '*' && matches!(chars.peek(), Some((_, '/'))) {
                    chars.next();
                    mode = Mode::Normal;
                }
            }
        }
    }

    let unterminated = match mode {
        Mode::Normal => None,
        Mode::SingleQuote { start } => Some(("string literal", start)),
        Mode::DoubleQuote { start } => Some(("quoted identifier", start)),
        Mode::Dollar { start, .. } => Some(("dollar-quoted body", start)),
        Mode::BlockComment { start } => Some(("block comment", start)),
    };
    if let Some((kind, line)) = unterminated {
        return Err(SchemaError::Unterminated {
            kind: kind.into(),
            line,
        });
    }

    push_statement(&mut statements, &buf, buf_line);
    trace!(count = statements.len(), "split statements");
    Ok((statements, stats))
}

/// What a run of statement text is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SpanKind {
    /// SQL outside quotes. Dollar-quoted bodies count as code.
    Code,
    /// A `'...'` string literal, quotes included.
    Literal,
    /// A `"..."` quoted identifier, quotes included.
    Identifier,
}

/// Cut one statement into runs of code, string literals and quoted
/// identifiers. Concatenating the runs gives back `text`.
pub(super) fn spans(text: &str) -> Vec<(SpanKind, &str)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                if start < i {
                    out.push((SpanKind::Code, &text[start..i]));
                }
                let end = quoted_end(bytes, i, quote);
                let kind = if quote == b'\'' {
                    SpanKind::Literal
                } else {
                    SpanKind::Identifier
                };
                out.push((kind, &text[i..end]));
                start = end;
                i = end;
            }
            b'$' => match dollar_tag(&text[i..]) {
                Some(tag) => {
                    let body = i + tag.len();
                    i = text[body..]
                        .find(tag.as_str())
                        .map_or(text.len(), |pos| body + pos + tag.len());
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    if start < text.len() {
        out.push((SpanKind::Code, &text[start..]));
    }
    out
}

/// Index just past the quote closing the run opened at `open`. A doubled
/// quote is an escape.
fn quoted_end(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// `$tag$` or `$$` at the start of `rest`, if it opens a dollar quote.
fn dollar_tag(rest: &str) -> Option<String> {
    let body = rest.strip_prefix('$')?;
    let end = body.find('$')?;
    let tag = &body[..end];
    let valid = tag.is_empty()
        || (tag
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && tag.chars().all(|c| c.is_alphanumeric() || c == '_'));
    valid.then(|| format!("${}$", tag))
}

fn start_text(buf: &mut String, buf_line: &mut usize, line: usize) {
    if buf.trim().is_empty() {
        buf.clear();
        *buf_line = line;
    }
}

fn push_statement(statements: &mut Vec<Statement>, buf: &str, line: usize) {
    let text = buf.trim();
    if !text.is_empty() {
        statements.push(Statement {
            text: text.to_string(),
            line,
        });
    }
}
