//! SQL text helpers used by the capture engine.
//!
//! Nothing here parses SQL semantically. The helpers only look far enough into
//! a statement to classify it and to splice bound parameters back into their
//! `$N` placeholders for display.


use crate::value::Value;

/// Whether a statement hands back rows rather than an affected-row count.
///
/// Looks past leading comments, parentheses and CTE definitions to the main
/// statement. A `RETURNING` clause on that statement also produces rows.
pub(crate) fn returns_rows(sql: &str) -> bool {
    let mut head = strip_sql_prefix(sql);
    if starts_with_keyword(head, "WITH") {
        head = cte_body(head);
    }
    ["SELECT", "VALUES", "TABLE", "SHOW"]
        .iter()
        .any(|keyword| starts_with_keyword(head, keyword))
        || contains_keyword(head, "RETURNING")
}

/// The statement that follows the CTE definitions of a `WITH` query.
fn cte_body(sql: &str) -> &str {
    let bytes = sql.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let rest = sql[i + 1..].trim_start();
                    // `name (cols) AS (...)` and `..., next AS (...)` continue the list.
                    if !rest.starts_with(',') && !starts_with_keyword(rest, "AS") {
                        return rest;
                    }
                }
            }
            b'\'' => i = skip_quoted(bytes, i, b'\''),
            _ => {}
        }
        i += 1;
    }
    ""
}

/// Whether a statement is a read query eligible for EXPLAIN.
///
/// Deliberately literal: the statement is trimmed and case-folded and must
/// begin with `select`. CTEs and parenthesised selects are not explained.
pub fn is_select(sql: &str) -> bool {
    starts_with_keyword(sql.trim(), "select")
}

/// Strip leading whitespace, SQL comments (`--` and `/* */`), and parentheses
/// from a SQL string to find the first meaningful keyword.
pub(crate) fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            if let Some(pos) = s.find('\n') {
                s = &s[pos + 1..];
                continue;
            }
            return "";
        }
        if s.starts_with("/*") {
            if let Some(pos) = s.find("*/") {
                s = &s[pos + 2..];
                continue;
            }
            return "";
        }
        if s.starts_with('(') {
            s = &s[1..];
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) => prefix.eq_ignore_ascii_case(keyword),
        None => false,
    }
}

fn contains_keyword(sql: &str, keyword: &str) -> bool {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case(keyword))
}

/// Splice bound parameters into `$N` placeholders, producing the statement as
/// it would read with literal values.
///
/// Placeholders inside string literals, quoted identifiers, dollar-quoted
/// bodies and comments are left alone. Returns `None` when a placeholder
/// refers to a parameter that was not supplied, so callers can fall back to
/// the raw text.
pub fn resolve_literal(sql: &str, params: &[Value]) -> Option<String> {
    if params.is_empty() {
        return Some(sql.to_string());
    }

    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => i = skip_quoted(bytes, i, b'\''),
            b'"' => i = skip_quoted(bytes, i, b'"'),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = match sql[i..].find('\n') {
                    Some(pos) => i + pos,
                    None => bytes.len(),
                };
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match sql[i + 2..].find("*/") {
                    Some(pos) => i + 2 + pos + 1,
                    None => bytes.len(),
                };
            }
            b'$' => {
                let digits = bytes[i + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_digit())
                    .count();
                if digits > 0 {
                    let index: usize = sql[i + 1..i + 1 + digits].parse().ok()?;
                    let value = params.get(index.checked_sub(1)?)?;
                    out.push_str(&sql[copied..i]);
                    out.push_str(&value.to_sql_literal());
                    i += digits;
                    copied = i + 1;
                } else if let Some(end) = skip_dollar_quoted(sql, i) {
                    i = end;
                }
            }
            _ => {}
        }
        i += 1;
    }

    out.push_str(&sql[copied.min(sql.len())..]);
    Some(out)
}

/// Returns the index of the closing quote (or the last byte if unterminated).
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i;
        }
        i += 1;
    }
    bytes.len().saturating_sub(1)
}

/// Given `$tag$ ... $tag$` starting at `start`, returns the index of the final
/// `$`. Returns `None` if the text at `start` is not a dollar-quote opener.
fn skip_dollar_quoted(sql: &str, start: usize) -> Option<usize> {
    let rest = &sql[start + 1..];
    let tag_len = rest.find('$')?;
    let tag = &rest[..tag_len];
    if !tag.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let opener = &sql[start..start + tag_len + 2];
    let body_start = start + opener.len();
    match sql[body_start..].find(opener) {
        Some(pos) => Some(body_start + pos + opener.len() - 1),
        None => Some(sql.len() - 1),
    }
}
