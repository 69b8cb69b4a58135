//! SQL Classifier (C2): a pure, shallow prefix match from a raw statement to
//! an operation kind and (optionally) a table name. Not a parser — the
//! embedded engine is the source of truth for execution; this only routes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Insert,
    CreateTable,
    Select,
    AlterTable,
    Vacuum,
    DropTable,
    Unknown,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Insert => "insert",
            Op::CreateTable => "create_table",
            Op::Select => "select",
            Op::AlterTable => "alter_table",
            Op::Vacuum => "vacuum",
            Op::DropTable => "drop_table",
            Op::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// `classify` never fails; statements it cannot place are `Op::Unknown`.
pub fn classify(stmt: &str) -> (Op, Option<String>) {
    let trimmed = skip_leading_noise(stmt);

    if let Some(rest) = eat_word(trimmed, "INSERT") {
        let rest = eat_word(rest, "OR").unwrap_or(rest);
        let rest = eat_word(rest, "REPLACE").or_else(|| eat_word(rest, "IGNORE")).unwrap_or(rest);
        return match eat_word(rest, "INTO") {
            Some(after) => (Op::Insert, Some(first_identifier(after))),
            None => (Op::Insert, None),
        };
    }

    if let Some(rest) = eat_word(trimmed, "CREATE") {
        let rest = eat_word(rest, "OR")
            .and_then(|r| eat_word(r, "REPLACE"))
            .unwrap_or(rest);
        let rest = eat_word(rest, "TEMPORARY")
            .or_else(|| eat_word(rest, "TEMP"))
            .unwrap_or(rest);
        return match eat_word(rest, "TABLE") {
            Some(after) => (Op::CreateTable, Some(first_identifier(after))),
            None => (Op::Unknown, None),
        };
    }

    if let Some(rest) = eat_word(trimmed, "SELECT") {
        return (Op::Select, find_table_after_from(rest));
    }

    if let Some(rest) = eat_word(trimmed, "ALTER").and_then(|r| eat_word(r, "TABLE")) {
        return (Op::AlterTable, Some(first_identifier(rest)));
    }

    if let Some(rest) = eat_word(trimmed, "VACUUM") {
        return (Op::Vacuum, first_identifier_opt(rest).map(|name| first_segment(&name)));
    }

    if let Some(rest) = eat_word(trimmed, "DROP").and_then(|r| eat_word(r, "TABLE")) {
        return (Op::DropTable, Some(first_identifier(rest)));
    }

    // EXPLAIN and SHOW/DESCRIBE are Select-shaped passthroughs: the engine
    // understands them natively and they never enter the write path.
    if eat_word(trimmed, "EXPLAIN").is_some()
        || eat_word(trimmed, "SHOW").is_some()
        || eat_word(trimmed, "DESCRIBE").is_some()
    {
        return (Op::Select, None);
    }

    (Op::Unknown, None)
}

/// Skip leading whitespace and `--` line comments.
fn skip_leading_noise(stmt: &str) -> &str {
    let mut s = stmt;
    loop {
        let before = s.len();
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix("--") {
            s = match rest.find('\n') {
                Some(i) => &rest[i + 1..],
                None => "",
            };
        }
        if s.len() == before {
            break;
        }
    }
    s
}

/// If `s` starts with `word` (case-insensitive) followed by a word
/// boundary (whitespace, `(`, or end of input), return the trimmed
/// remainder.
fn eat_word<'a>(s: &'a str, word: &str) -> Option<&'a str> {
    if s.len() < word.len() || !s[..word.len()].eq_ignore_ascii_case(word) {
        return None;
    }
    let after = &s[word.len()..];
    match after.chars().next() {
        None => Some(""),
        Some(c) if c.is_whitespace() || c == '(' => Some(after.trim_start()),
        _ => None,
    }
}

/// First identifier (qualified `schema.table` allowed, kept verbatim) up to
/// whitespace, `(`, or end of input.
fn first_identifier(rest: &str) -> String {
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .unwrap_or(rest.len());
    rest[..end].trim_matches(|c| c == '"' || c == '`').to_string()
}

/// Truncate a possibly-qualified identifier at its first `.`. `VACUUM` is
/// the one op whose name the classifier deliberately keeps unqualified —
/// preserve that until the product requires otherwise.
fn first_segment(name: &str) -> String {
    name.split('.').next().unwrap_or(name).to_string()
}

fn first_identifier_opt(rest: &str) -> Option<String> {
    let rest = rest.trim();
    if rest.is_empty() || rest.starts_with(';') {
        None
    } else {
        Some(first_identifier(rest))
    }
}

/// Scan forward (ignoring string literals) for a top-level `FROM` and return
/// the identifier that follows it, if any.
fn find_table_after_from(rest: &str) -> Option<String> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    let mut in_string: Option<u8> = None;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' => {
                in_string = Some(c);
                i += 1;
            }
            _ => {
                if (c == b'F' || c == b'f') && rest[i..].len() >= 4 && rest[i..i + 4].eq_ignore_ascii_case("FROM")
                {
                    let before_ok = i == 0 || bytes[i - 1].is_ascii_whitespace() || bytes[i - 1] == b'(';
                    let after_idx = i + 4;
                    let after_ok = after_idx >= bytes.len() || bytes[after_idx].is_ascii_whitespace();
                    if before_ok && after_ok {
                        let after = rest[after_idx..].trim_start();
                        if after.is_empty() {
                            return None;
                        }
                        return Some(first_identifier(after));
                    }
                }
                i += 1;
            }
        }
    }
    None
}
