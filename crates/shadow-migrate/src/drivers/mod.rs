//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB connections and catalog introspection
//!
//! The migration core only depends on the traits in [`crate::core`]; drivers
//! implement them for a concrete client library.

pub mod mysql;

pub use mysql::{MysqlConnection, MysqlConnectionFactory};
