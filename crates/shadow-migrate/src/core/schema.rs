//! Schema metadata for tables under migration.
//!
//! A [`Table`] is produced once per introspection call and is not mutated
//! afterwards. The destination name and destination DDL are derived from it
//! (see [`crate::ddl`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Primary key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// Exactly one primary key column.
    Single(String),
    /// Zero or several primary key columns, in column order.
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// Build from the list of columns flagged as primary key.
    pub fn from_columns(mut columns: Vec<String>) -> Self {
        if columns.len() == 1 {
            PrimaryKey::Single(columns.remove(0))
        } else {
            PrimaryKey::Composite(columns)
        }
    }

    /// Primary key column names, in order.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(name) => vec![name.as_str()],
            PrimaryKey::Composite(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// Whether the table has no primary key at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, PrimaryKey::Composite(names) if names.is_empty())
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::Composite(Vec::new())
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Full column type as reported by the catalog (e.g. `int(11) unsigned`).
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,

    /// Ordinal position (1-based).
    pub ordinal_pos: u32,
}

/// Non-primary index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Member columns in index order.
    pub columns: Vec<String>,
}

/// A `key_column_usage` row describing one column of a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub ordinal_position: Option<u32>,
    pub position_in_unique_constraint: Option<u32>,
    pub referenced_schema: Option<String>,
    pub referenced_table: Option<String>,
    /// `None` means the constraint is not a foreign key.
    pub referenced_column: Option<String>,
}

impl ConstraintDescriptor {
    /// Whether this describes an outgoing foreign key.
    pub fn is_foreign_key(&self) -> bool {
        self.referenced_column.is_some()
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Database (schema) name.
    pub schema: String,

    /// Primary key.
    pub pk: PrimaryKey,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Non-primary indexes in catalog order.
    pub indices: Vec<Index>,

    /// Outgoing foreign keys of this table, keyed by column name.
    pub constraints: BTreeMap<String, ConstraintDescriptor>,

    /// Verbatim `CREATE TABLE` statement.
    pub ddl: String,
}

impl Table {
    /// Create an empty table description.
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            pk: PrimaryKey::default(),
            columns: Vec::new(),
            indices: Vec::new(),
            constraints: BTreeMap::new(),
            ddl: String::new(),
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up an index by name.
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indices.iter().find(|i| i.name == name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.pk.is_empty()
    }

    /// Whether the primary key supports chunked copy by numeric range:
    /// a single integer-typed column.
    pub fn satisfies_pk_requirement(&self) -> bool {
        let PrimaryKey::Single(pk) = &self.pk else {
            return false;
        };
        self.column(pk)
            .map(|col| is_integer_type(&col.data_type))
            .unwrap_or(false)
    }

    /// Outgoing foreign keys, skipping descriptors without a referenced column.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ConstraintDescriptor> {
        self.constraints.values().filter(|c| c.is_foreign_key())
    }
}

/// Whether a catalog column type is an integer type, with or without display
/// width (`int(11)` on 5.7, `int` on 8.0).
fn is_integer_type(data_type: &str) -> bool {
    let lower = data_type.to_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    matches!(
        base,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint"
    )
}
