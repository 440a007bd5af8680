//! Destination naming and textual DDL rewriting.
//!
//! The destination table is created from the origin's own `SHOW CREATE TABLE`
//! output. Rather than parsing SQL, two targeted substitutions are applied:
//! the table name right after `CREATE TABLE`, and each foreign-key constraint
//! name. Constraint names are schema-wide in InnoDB, so the destination's must
//! differ from the origin's while both tables exist.

use std::collections::BTreeSet;

use tracing::warn;

use crate::core::identifier::{quote_unchecked, replace_identifier, replace_quoted};
use crate::core::schema::Table;

/// Prefix of the shadow table name.
pub const DESTINATION_PREFIX: &str = "shmn_";

/// Suffix appended to foreign-key constraint names on the shadow table.
pub const CONSTRAINT_SUFFIX: &str = "_shmn";

/// Identifier quote characters MySQL may emit, depending on `ANSI_QUOTES`.
const QUOTE_CHARS: [char; 2] = ['`', '"'];

const CREATE_TABLE: &str = "CREATE TABLE ";

/// Shadow table name for an origin table.
///
/// Deterministic; callers running several migrations at once must check for
/// collisions themselves.
pub fn destination_name(origin: &str) -> String {
    format!("{}{}", DESTINATION_PREFIX, origin)
}

/// Toggle the migration suffix on a constraint name.
///
/// Appends [`CONSTRAINT_SUFFIX`] when absent and strips it when present, so
/// applying it twice returns the original name (a name ending in the suffix
/// twice is the one exception). The same function renames constraints forward
/// onto the shadow table and back after the swap.
pub fn replacement_constraint(name: &str) -> String {
    match name.strip_suffix(CONSTRAINT_SUFFIX) {
        Some(stripped) => stripped.to_string(),
        None => format!("{}{}", name, CONSTRAINT_SUFFIX),
    }
}

/// Rewrite a `CREATE TABLE` statement for a new table name.
///
/// The first `CREATE TABLE` followed by `old_name` in either backticks or
/// double quotes is renamed to `new_name`, keeping the quote style. Each
/// `(from, to)` pair in `constraint_renames` is then applied to every quoted
/// occurrence of `from`, or to every bare whole-identifier occurrence when
/// the statement never quotes it. All other bytes are preserved.
pub fn rewrite_ddl(
    ddl: &str,
    old_name: &str,
    new_name: &str,
    constraint_renames: &[(String, String)],
) -> String {
    let mut output = rename_table(ddl, old_name, new_name);

    for (from, to) in constraint_renames {
        let quoted = QUOTE_CHARS
            .iter()
            .any(|&q| output.contains(&quote_unchecked(from, q)));
        output = if quoted {
            QUOTE_CHARS
                .iter()
                .fold(output, |text, &q| replace_quoted(&text, from, to, q))
        } else {
            replace_identifier(&output, from, to)
        };
    }

    output
}

/// Destination DDL for an introspected table.
pub fn destination_ddl(table: &Table) -> String {
    let renames = constraint_renames(table);
    let dest = destination_name(&table.name);
    let ddl = rewrite_ddl(&table.ddl, &table.name, &dest, &renames);

    if find_create_table(&table.ddl, &table.name).is_none() {
        warn!(
            "No CREATE TABLE for {} found in DDL; destination DDL keeps the origin name",
            table.name
        );
    }

    ddl
}

/// Rename pairs for every distinct foreign-key constraint of `table`.
///
/// A multi-column foreign key shows up once per column; it is renamed once,
/// since a second toggle would undo the first.
pub fn constraint_renames(table: &Table) -> Vec<(String, String)> {
    let names: BTreeSet<&str> = table.foreign_keys().map(|c| c.name.as_str()).collect();
    names
        .into_iter()
        .map(|name| (name.to_string(), replacement_constraint(name)))
        .collect()
}

fn rename_table(ddl: &str, old_name: &str, new_name: &str) -> String {
    match find_create_table(ddl, old_name) {
        Some((start, len, quote)) => {
            let mut output = String::with_capacity(ddl.len() + new_name.len());
            output.push_str(&ddl[..start]);
            output.push_str(CREATE_TABLE);
            output.push_str(&quote_unchecked(new_name, quote));
            output.push_str(&ddl[start + len..]);
            output
        }
        None => ddl.to_string(),
    }
}

/// Byte offset and length of the earliest `CREATE TABLE <quoted name>`, with
/// the quote character used.
fn find_create_table(ddl: &str, name: &str) -> Option<(usize, usize, char)> {
    QUOTE_CHARS
        .iter()
        .filter_map(|&quote| {
            let needle = format!("{}{}", CREATE_TABLE, quote_unchecked(name, quote));
            ddl.find(&needle).map(|idx| (idx, needle.len(), quote))
        })
        .min_by_key(|(idx, _, _)| *idx)
}
