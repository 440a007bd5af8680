//! Identifier and literal handling for generated MySQL statements.
//!
//! Trigger DDL, catalog queries and `SHOW` statements are all built as text,
//! since MySQL cannot bind identifiers as parameters. Everything that ends up
//! inside generated SQL passes through one of the functions here.

use crate::error::{MigrateError, Result};

/// Maximum identifier length in the MySQL family, in characters.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers longer than [`MAX_IDENTIFIER_LENGTH`] characters
///
/// # Errors
///
/// Returns `MigrateError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let len = name.chars().count();
    if len > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, len, name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// Escapes backticks by doubling them and wraps in backticks.
/// Validates the identifier before quoting.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(quote_unchecked(name, '`'))
}

/// Qualify a MySQL table name with its database.
pub fn qualify_mysql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(schema)?, quote_mysql(table)?))
}

/// Wrap `name` in `quote`, doubling any embedded quote characters.
///
/// Does not validate. Used when reproducing a quoting style found in
/// existing DDL, where the name already came from the server.
pub(crate) fn quote_unchecked(name: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!("{quote}{}{quote}", name.replace(quote, &doubled))
}

/// Quote a string literal for embedding in a catalog query.
///
/// Doubles single quotes and escapes backslashes, which MySQL treats as an
/// escape character unless `NO_BACKSLASH_ESCAPES` is set.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Truncate an identifier to [`MAX_IDENTIFIER_LENGTH`] characters.
///
/// Counts characters, not bytes, matching how MySQL measures identifier length.
pub fn truncate_identifier(name: &str) -> &str {
    match name.char_indices().nth(MAX_IDENTIFIER_LENGTH) {
        Some((byte_idx, _)) => &name[..byte_idx],
        None => name,
    }
}

/// Whether `c` can appear in an unquoted MySQL identifier.
pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Replace every whole-identifier occurrence of `from` in `text` with `to`.
///
/// An occurrence only matches when the characters on either side cannot be
/// part of an identifier, so `fk_user` inside `fk_user_role` is left alone.
pub(crate) fn replace_identifier(text: &str, from: &str, to: &str) -> String {
    replace_bounded(text, from, to, is_identifier_char)
}

/// Replace every occurrence of `from` wrapped in `quote` with `to` in the same quotes.
///
/// Quoted names may contain characters such as `-` or spaces, so the match is
/// on the whole quoted token. A doubled quote next to the match means it sits
/// inside a longer name and is skipped.
pub(crate) fn replace_quoted(text: &str, from: &str, to: &str, quote: char) -> String {
    replace_bounded(
        text,
        &quote_unchecked(from, quote),
        &quote_unchecked(to, quote),
        |c| c == quote,
    )
}

fn replace_bounded(text: &str, from: &str, to: &str, joins: impl Fn(char) -> bool) -> String {
    if from.is_empty() {
        return text.to_string();
    }

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;

    for (idx, _) in text.match_indices(from) {
        if idx < cursor {
            continue;
        }

        let before_ok = text[..idx].chars().next_back().map_or(true, |c| !joins(c));
        let after_idx = idx + from.len();
        let after_ok = text[after_idx..].chars().next().map_or(true, |c| !joins(c));

        if before_ok && after_ok {
            output.push_str(&text[cursor..idx]);
            output.push_str(to);
            cursor = after_idx;
        }
    }

    output.push_str(&text[cursor..]);
    output
}
