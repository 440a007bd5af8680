//! MySQL/MariaDB database driver.
//!
//! - [`MysqlConnection`]: a single session implementing [`Connection`](crate::core::Connection)
//! - [`MysqlConnectionFactory`]: opens replica sessions with the primary's settings
//! - [`introspect`]: builds a [`Table`](crate::core::Table) from the catalog
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod connection;
mod introspect;

pub use connection::{MysqlConnection, MysqlConnectionFactory};
pub use introspect::introspect;
