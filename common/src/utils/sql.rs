//! SQL text helpers.
//!
//! Identifiers are always quoted and values always bound; nothing a caller
//! sends is spliced into statement text verbatim.

use crate::errors::{AppError, AppResult};

const MAX_IDENTIFIER_LEN: usize = 255;

/// Checks a caller supplied identifier and returns it trimmed.
///
/// # Errors
/// Returns `AppError::Validation` for empty names, names containing NUL or
/// names longer than 255 bytes.
pub fn validate_identifier<'a>(kind: &str, name: &'a str) -> AppResult<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{} name is required", kind)));
    }
    if name.contains('\0') {
        return Err(AppError::Validation(format!(
            "{} name contains a NUL character",
            kind
        )));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::Validation(format!(
            "{} name exceeds {} bytes",
            kind, MAX_IDENTIFIER_LEN
        )));
    }
    Ok(name)
}

/// Double-quotes an identifier, doubling embedded quotes.
///
/// Quoted names keep their case, so `users` does not resolve to `USERS`.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// LIKE pattern matching `term` as a literal substring.
///
/// `\`, `%` and `_` are escaped with the default backslash escape.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
