//! MySQL table introspection.
//!
//! Builds a [`Table`] from `information_schema` and `SHOW` statements, and
//! records the schema's foreign keys in the run's constraint registry.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::core::connection::{Connection, Row};
use crate::core::identifier::{qualify_mysql, quote_literal, quote_mysql};
use crate::core::schema::{Column, ConstraintDescriptor, Index, PrimaryKey, Table};
use crate::error::{MigrateError, Result};
use crate::registry::{SchemaConstraintRegistry, SchemaConstraints};

/// Introspect `table_name` in the connection's current database.
///
/// # Errors
///
/// `MigrateError::TableNotFound` when the column catalog has no rows for the
/// table. Query failures propagate unchanged.
pub async fn introspect(
    table_name: &str,
    conn: &dyn Connection,
    registry: &mut SchemaConstraintRegistry,
) -> Result<Table> {
    let schema = conn.current_database().await?;
    let introspector = MysqlIntrospector {
        conn,
        schema: &schema,
        table: table_name,
    };
    introspector.run(registry).await
}

struct MysqlIntrospector<'a> {
    conn: &'a dyn Connection,
    schema: &'a str,
    table: &'a str,
}

impl MysqlIntrospector<'_> {
    async fn run(&self, registry: &mut SchemaConstraintRegistry) -> Result<Table> {
        let mut table = Table::new(self.table, self.schema);

        self.load_columns(&mut table).await?;
        self.load_ddl(&mut table).await?;
        self.load_indices(&mut table).await?;
        let all_constraints = self.load_constraints(&mut table).await?;

        registry.record(self.schema, all_constraints);

        info!(
            "Introspected {}: {} columns, {} indexes, {} foreign keys",
            table.full_name(),
            table.columns.len(),
            table.indices.len(),
            table.constraints.len()
        );
        Ok(table)
    }

    /// Load columns and derive the primary key.
    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        let query = format!(
            "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY, ORDINAL_POSITION \
             FROM information_schema.columns \
             WHERE table_name = {} AND table_schema = {} \
             ORDER BY ORDINAL_POSITION",
            quote_literal(self.table),
            quote_literal(self.schema)
        );

        let rows = self.conn.select_all(&query).await?;
        if rows.is_empty() {
            return Err(MigrateError::TableNotFound(format!(
                "{}.{}",
                self.schema, self.table
            )));
        }

        let mut pk_columns = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            let name = required(row, "COLUMN_NAME", self.table)?;
            if row.get("COLUMN_KEY") == Some("PRI") {
                pk_columns.push(name.to_string());
            }

            table.columns.push(Column {
                name: name.to_string(),
                data_type: row.get("COLUMN_TYPE").unwrap_or_default().to_string(),
                is_nullable: row.get("IS_NULLABLE") == Some("YES"),
                default: row.get("COLUMN_DEFAULT").map(str::to_string),
                ordinal_pos: row
                    .get("ORDINAL_POSITION")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(idx as u32 + 1),
            });
        }

        table.pk = PrimaryKey::from_columns(pk_columns);
        Ok(())
    }

    /// Load the verbatim `CREATE TABLE` statement.
    async fn load_ddl(&self, table: &mut Table) -> Result<()> {
        let query = format!("SHOW CREATE TABLE {}", quote_mysql(self.table)?);
        let rows = self.conn.select_all(&query).await?;

        table.ddl = rows
            .last()
            .and_then(Row::last)
            .map(str::to_string)
            .ok_or_else(|| MigrateError::TableNotFound(table.full_name()))?;
        Ok(())
    }

    /// Load non-primary indexes, keeping catalog order.
    ///
    /// Functional key parts (MySQL 8.0.13+) have no `Column_name`; their
    /// `Expression` is recorded in its place.
    async fn load_indices(&self, table: &mut Table) -> Result<()> {
        let query = format!(
            "SHOW INDEXES FROM {} WHERE Key_name != 'PRIMARY'",
            qualify_mysql(self.schema, self.table)?
        );
        let rows = self.conn.select_all(&query).await?;

        for row in &rows {
            let key_name = required(row, "Key_name", self.table)?;
            let column = match row.get("Column_name") {
                Some(column) => column,
                None => required(row, "Expression", self.table)?,
            };

            match table.indices.iter_mut().find(|i| i.name == key_name) {
                Some(index) => index.columns.push(column.to_string()),
                None => table.indices.push(Index {
                    name: key_name.to_string(),
                    columns: vec![column.to_string()],
                }),
            }
        }

        debug!(
            "Loaded {} indexes for {}",
            table.indices.len(),
            table.full_name()
        );
        Ok(())
    }

    /// Load every foreign key of the schema.
    ///
    /// The table's own foreign keys go into `table.constraints`; the full set
    /// is returned for the registry.
    async fn load_constraints(&self, table: &mut Table) -> Result<SchemaConstraints> {
        let query = format!(
            "SELECT CONSTRAINT_NAME, TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, ORDINAL_POSITION, \
             POSITION_IN_UNIQUE_CONSTRAINT, REFERENCED_TABLE_SCHEMA, REFERENCED_TABLE_NAME, \
             REFERENCED_COLUMN_NAME \
             FROM information_schema.key_column_usage \
             WHERE table_schema = {} AND referenced_column_name IS NOT NULL",
            quote_literal(self.schema)
        );
        let rows = self.conn.select_all(&query).await?;

        let mut all = BTreeMap::new();
        for row in &rows {
            let descriptor = constraint_from_row(row, self.table)?;

            if descriptor.schema == self.schema && descriptor.table == self.table {
                table
                    .constraints
                    .insert(descriptor.column.clone(), descriptor.clone());
            }
            all.insert(descriptor.name.clone(), descriptor);
        }

        debug!(
            "Loaded {} foreign keys for {} ({} in schema)",
            table.constraints.len(),
            table.full_name(),
            all.len()
        );
        Ok(all)
    }
}

fn constraint_from_row(row: &Row, table: &str) -> Result<ConstraintDescriptor> {
    let optional = |name: &str| row.get(name).map(str::to_string);
    let position = |name: &str| row.get(name).and_then(|v| v.parse().ok());

    Ok(ConstraintDescriptor {
        name: required(row, "CONSTRAINT_NAME", table)?.to_string(),
        schema: required(row, "TABLE_SCHEMA", table)?.to_string(),
        table: required(row, "TABLE_NAME", table)?.to_string(),
        column: required(row, "COLUMN_NAME", table)?.to_string(),
        ordinal_position: position("ORDINAL_POSITION"),
        position_in_unique_constraint: position("POSITION_IN_UNIQUE_CONSTRAINT"),
        referenced_schema: optional("REFERENCED_TABLE_SCHEMA"),
        referenced_table: optional("REFERENCED_TABLE_NAME"),
        referenced_column: optional("REFERENCED_COLUMN_NAME"),
    })
}

fn required<'r>(row: &'r Row, column: &str, table: &str) -> Result<&'r str> {
    row.get(column).ok_or_else(|| {
        MigrateError::database(format!(
            "catalog row for {} is missing {}",
            table, column
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::MockConnection;

    fn column_row(name: &str, data_type: &str, key: &str, pos: &str) -> Row {
        Row::new()
            .with("COLUMN_NAME", Some(name))
            .with("COLUMN_TYPE", Some(data_type))
            .with("IS_NULLABLE", Some(if key == "PRI" { "NO" } else { "YES" }))
            .with("COLUMN_DEFAULT", None)
            .with("COLUMN_KEY", Some(key))
            .with("ORDINAL_POSITION", Some(pos))
    }

    fn index_row(key: &str, column: &str) -> Row {
        Row::new()
            .with("Table", Some("users"))
            .with("Non_unique", Some("1"))
            .with("Key_name", Some(key))
            .with("Column_name", Some(column))
    }

    fn fk_row(name: &str, table: &str, column: &str, ref_table: &str) -> Row {
        Row::new()
            .with("CONSTRAINT_NAME", Some(name))
            .with("TABLE_SCHEMA", Some("app"))
            .with("TABLE_NAME", Some(table))
            .with("COLUMN_NAME", Some(column))
            .with("ORDINAL_POSITION", Some("1"))
            .with("POSITION_IN_UNIQUE_CONSTRAINT", Some("1"))
            .with("REFERENCED_TABLE_SCHEMA", Some("app"))
            .with("REFERENCED_TABLE_NAME", Some(ref_table))
            .with("REFERENCED_COLUMN_NAME", Some("id"))
    }

    fn users_connection() -> MockConnection {
        let conn = MockConnection::new("db1", "app");
        conn.respond(
            "information_schema.columns",
            vec![
                column_row("id", "int(11)", "PRI", "1"),
                column_row("account_id", "int(11)", "MUL", "2"),
                column_row("first", "varchar(64)", "", "3"),
                column_row("last", "varchar(64)", "", "4"),
            ],
        );
        conn.respond(
            "SHOW CREATE TABLE",
            vec![Row::new()
                .with("Table", Some("users"))
                .with("Create Table", Some("CREATE TABLE `users` (`id` int(11))"))],
        );
        conn.respond(
            "SHOW INDEXES",
            vec![
                index_row("idx_name", "last"),
                index_row("idx_name", "first"),
                index_row("fk_account", "account_id"),
            ],
        );
        conn.respond(
            "information_schema.key_column_usage",
            vec![
                fk_row("fk_account", "users", "account_id", "accounts"),
                fk_row("fk_orders_user", "orders", "user_id", "users"),
            ],
        );
        conn
    }

    #[tokio::test]
    async fn test_introspect_builds_table() {
        let conn = users_connection();
        let mut registry = SchemaConstraintRegistry::new();

        let table = introspect("users", &conn, &mut registry).await.unwrap();

        assert_eq!(table.name, "users");
        assert_eq!(table.schema, "app");
        assert_eq!(table.pk, PrimaryKey::Single("id".into()));
        assert_eq!(table.column_names(), vec!["id", "account_id", "first", "last"]);
        assert_eq!(table.column("id").unwrap().data_type, "int(11)");
        assert!(!table.column("id").unwrap().is_nullable);
        assert!(table.column("first").unwrap().is_nullable);
        assert_eq!(table.ddl, "CREATE TABLE `users` (`id` int(11))");
        assert!(table.satisfies_pk_requirement());
    }

    #[tokio::test]
    async fn test_index_column_order_preserved() {
        let conn = users_connection();
        let mut registry = SchemaConstraintRegistry::new();

        let table = introspect("users", &conn, &mut registry).await.unwrap();

        assert_eq!(table.indices.len(), 2);
        assert_eq!(table.indices[0].name, "idx_name");
        // Catalog order, not alphabetical.
        assert_eq!(table.index("idx_name").unwrap().columns, vec!["last", "first"]);
        assert_eq!(table.index("fk_account").unwrap().columns, vec!["account_id"]);
    }

    #[tokio::test]
    async fn test_functional_index_uses_expression() {
        let conn = users_connection();
        conn.respond(
            "SHOW INDEXES",
            vec![
                index_row("idx_name", "last"),
                Row::new()
                    .with("Key_name", Some("idx_name"))
                    .with("Column_name", None)
                    .with("Expression", Some("lower(`first`)")),
            ],
        );
        let mut registry = SchemaConstraintRegistry::new();

        let table = introspect("users", &conn, &mut registry).await.unwrap();

        assert_eq!(
            table.index("idx_name").unwrap().columns,
            vec!["last", "lower(`first`)"]
        );
    }

    #[tokio::test]
    async fn test_index_row_without_key_part_fails() {
        let conn = users_connection();
        conn.respond(
            "SHOW INDEXES",
            vec![Row::new()
                .with("Key_name", Some("idx_name"))
                .with("Column_name", None)
                .with("Expression", None)],
        );
        let mut registry = SchemaConstraintRegistry::new();

        let err = introspect("users", &conn, &mut registry).await.unwrap_err();
        assert!(err.to_string().contains("Expression"));
    }

    #[tokio::test]
    async fn test_constraints_split_between_table_and_registry() {
        let conn = users_connection();
        let mut registry = SchemaConstraintRegistry::new();

        let table = introspect("users", &conn, &mut registry).await.unwrap();

        assert_eq!(table.constraints.len(), 1);
        let own = &table.constraints["account_id"];
        assert_eq!(own.name, "fk_account");
        assert_eq!(own.referenced_table.as_deref(), Some("accounts"));

        let recorded = registry.get("app").unwrap();
        assert_eq!(recorded.len(), 2);
        assert!(recorded.contains_key("fk_orders_user"));
    }

    #[tokio::test]
    async fn test_composite_and_missing_primary_keys() {
        let conn = MockConnection::new("db1", "app");
        conn.respond(
            "information_schema.columns",
            vec![
                column_row("a", "int", "PRI", "1"),
                column_row("b", "int", "PRI", "2"),
            ],
        );
        conn.respond(
            "SHOW CREATE TABLE",
            vec![Row::new().with("Create Table", Some("CREATE TABLE `pairs` (a int, b int)"))],
        );
        let mut registry = SchemaConstraintRegistry::new();
        let table = introspect("pairs", &conn, &mut registry).await.unwrap();
        assert_eq!(table.pk, PrimaryKey::Composite(vec!["a".into(), "b".into()]));
        assert!(!table.satisfies_pk_requirement());

        let conn = MockConnection::new("db1", "app");
        conn.respond(
            "information_schema.columns",
            vec![column_row("v", "text", "", "1")],
        );
        conn.respond(
            "SHOW CREATE TABLE",
            vec![Row::new().with("Create Table", Some("CREATE TABLE `log` (v text)"))],
        );
        let table = introspect("log", &conn, &mut registry).await.unwrap();
        assert!(table.pk.is_empty());
        assert!(!table.has_pk());
    }

    #[tokio::test]
    async fn test_table_not_found() {
        let conn = MockConnection::new("db1", "app");
        let mut registry = SchemaConstraintRegistry::new();

        let err = introspect("ghost", &conn, &mut registry).await.unwrap_err();

        assert!(matches!(err, MigrateError::TableNotFound(ref t) if t == "app.ghost"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_queries_escape_literals() {
        let conn = MockConnection::new("db1", "app");
        let mut registry = SchemaConstraintRegistry::new();

        let _ = introspect("o'neil", &conn, &mut registry).await;

        let statements = conn.statements();
        assert!(statements[0].contains("table_name = 'o''neil'"));
        assert!(statements[0].contains("table_schema = 'app'"));
    }
}
