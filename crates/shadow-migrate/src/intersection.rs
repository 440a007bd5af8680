//! Columns shared by the origin and destination tables.
//!
//! The origin and destination lists have equal length and pair up by index.
//! They only differ where a column was renamed by the migration.

use std::collections::HashMap;

use crate::core::identifier::quote_unchecked;
use crate::core::schema::Table;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intersection {
    origin: Vec<String>,
    destination: Vec<String>,
}

impl Intersection {
    /// Intersection where every column keeps its name.
    pub fn new(common: Vec<String>) -> Self {
        Self {
            destination: common.clone(),
            origin: common,
        }
    }

    /// Intersection from explicit `(origin, destination)` column pairs.
    pub fn with_renames(pairs: Vec<(String, String)>) -> Self {
        let (origin, destination) = pairs.into_iter().unzip();
        Self {
            origin,
            destination,
        }
    }

    /// Derive the intersection of two tables in origin column order.
    ///
    /// `renames` maps origin column names to their destination names. An
    /// origin column is kept when its (possibly renamed) name exists in the
    /// destination.
    pub fn between(origin: &Table, destination: &Table, renames: &HashMap<String, String>) -> Self {
        let pairs = origin
            .columns
            .iter()
            .filter_map(|col| {
                let target = renames.get(&col.name).unwrap_or(&col.name);
                destination
                    .has_column(target)
                    .then(|| (col.name.clone(), target.clone()))
            })
            .collect();
        Self::with_renames(pairs)
    }

    pub fn origin(&self) -> &[String] {
        &self.origin
    }

    pub fn destination(&self) -> &[String] {
        &self.destination
    }

    pub fn len(&self) -> usize {
        self.origin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origin.is_empty()
    }

    /// Destination columns as a quoted, comma separated list.
    pub fn joined_destination(&self) -> String {
        joined(&self.destination)
    }

    /// Origin columns as a quoted, comma separated list.
    pub fn joined_origin(&self) -> String {
        joined(&self.origin)
    }

    /// Origin columns qualified with a row alias, e.g. ``NEW.`id` ``.
    pub fn typed_origin(&self, alias: &str) -> String {
        self.origin
            .iter()
            .map(|c| format!("{}.{}", alias, quote_unchecked(c, '`')))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn joined(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_unchecked(c, '`'))
        .collect::<Vec<_>>()
        .join(", ")
}
