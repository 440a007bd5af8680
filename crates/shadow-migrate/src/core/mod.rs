//! Core abstractions shared by the migration components.
//!
//! - [`connection`]: the [`Connection`] and [`ConnectionFactory`] traits
//! - [`schema`]: table, column, index and constraint metadata
//! - [`identifier`]: quoting, truncation and identifier-aware replacement
//! - [`sleep`]: injectable delays for retry loops and throttlers
//!
//! Driver modules (`drivers::mysql`) implement the traits; the entangler,
//! DDL rewriter and throttlers only depend on what is defined here.

pub mod connection;
pub mod identifier;
pub mod schema;
pub mod sleep;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{Connection, ConnectionFactory, Row};
pub use schema::{Column, ConstraintDescriptor, Index, PrimaryKey, Table};
pub use sleep::{Sleeper, TokioSleeper};
