//! Per-schema record of foreign-key constraints seen during introspection.
//!
//! After the swap, constraints pointing at the old table have to be renamed or
//! recreated. Introspection stores every foreign key of the schema here so the
//! orchestrator can find them without querying the catalog again.
//!
//! The registry is owned by one migration run and passed by `&mut` reference.
//! Introspecting two tables of the same schema replaces the earlier entry.

use std::collections::{BTreeMap, HashMap};

use crate::core::schema::ConstraintDescriptor;

/// Constraints of one schema, keyed by constraint name.
pub type SchemaConstraints = BTreeMap<String, ConstraintDescriptor>;

#[derive(Debug, Clone, Default)]
pub struct SchemaConstraintRegistry {
    schemas: HashMap<String, SchemaConstraints>,
}

impl SchemaConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the constraints recorded for `schema`.
    pub fn record(&mut self, schema: &str, constraints: SchemaConstraints) {
        self.schemas.insert(schema.to_string(), constraints);
    }

    /// Constraints recorded for `schema`, if it has been introspected.
    pub fn get(&self, schema: &str) -> Option<&SchemaConstraints> {
        self.schemas.get(schema)
    }

    /// Foreign keys in `schema` that reference `table`.
    pub fn referencing(&self, schema: &str, table: &str) -> Vec<&ConstraintDescriptor> {
        self.get(schema)
            .map(|constraints| {
                constraints
                    .values()
                    .filter(|c| {
                        c.referenced_table.as_deref() == Some(table)
                            && c.referenced_schema.as_deref() == Some(schema)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Foreign keys declared on `table` in `schema`.
    pub fn declared_on(&self, schema: &str, table: &str) -> Vec<&ConstraintDescriptor> {
        self.get(schema)
            .map(|constraints| constraints.values().filter(|c| c.table == table).collect())
            .unwrap_or_default()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
