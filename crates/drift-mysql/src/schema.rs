//! Catalog queries against `information_schema`

use anyhow::Result;
use mysql_async::{prelude::*, Conn};
use std::collections::BTreeMap;

/// Columns and primary key of one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    /// Column names in ordinal order
    pub column_order: Vec<String>,
    /// Column name to full column type, e.g. `tinyint(1)` or `decimal(10,2)`
    pub columns: BTreeMap<String, String>,
    /// Primary key columns in key order; empty when the table has none
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// `TINYINT(1)` is MySQL's spelling of BOOLEAN.
    pub fn is_boolean(&self, column: &str) -> bool {
        self.columns
            .get(column)
            .is_some_and(|t| t.to_ascii_lowercase().starts_with("tinyint(1)"))
    }
}

/// Base tables of `database`, sorted by name
pub async fn get_user_tables(conn: &mut Conn, database: &str) -> Result<Vec<String>> {
    let query = "
        SELECT TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ?
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    ";

    let tables: Vec<String> = conn.exec(query, (database,)).await?;
    Ok(tables)
}

/// Column and primary key information for every table in `database`
pub async fn collect_schema(
    conn: &mut Conn,
    database: &str,
) -> Result<BTreeMap<String, TableSchema>> {
    let columns_query = "
        SELECT TABLE_NAME, COLUMN_NAME, COLUMN_TYPE
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = ?
        ORDER BY TABLE_NAME, ORDINAL_POSITION";
    let column_rows: Vec<(String, String, String)> = conn.exec(columns_query, (database,)).await?;

    let pk_query = "
        SELECT TABLE_NAME, COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ?
        AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY TABLE_NAME, ORDINAL_POSITION";
    let pk_rows: Vec<(String, String)> = conn.exec(pk_query, (database,)).await?;

    Ok(build_schema(column_rows, pk_rows))
}

/// Group catalog rows by table
pub fn build_schema(
    column_rows: Vec<(String, String, String)>,
    pk_rows: Vec<(String, String)>,
) -> BTreeMap<String, TableSchema> {
    let mut tables: BTreeMap<String, TableSchema> = BTreeMap::new();
    for (table, column, column_type) in column_rows {
        let schema = tables.entry(table).or_default();
        schema.column_order.push(column.clone());
        schema.columns.insert(column, column_type);
    }
    for (table, column) in pk_rows {
        if let Some(schema) = tables.get_mut(&table) {
            schema.primary_key.push(column);
        }
    }
    tables
}
