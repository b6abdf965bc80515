//! Catalog inspection and table reads for one-shot snapshots

use crate::config::PostgresConfig;
use crate::value::row_from_json;
use anyhow::{Context, Result};
use drift_core::TableCapture;
use std::collections::BTreeMap;
use tokio_postgres::Client;
use tracing::{debug, info};

/// Base tables of the configured schema, filtered by the configured list
pub async fn list_tables(client: &Client, config: &PostgresConfig) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema::text = $1 AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            &[&config.schema],
        )
        .await
        .context("Failed to list tables")?;

    let tables: Vec<String> = rows
        .iter()
        .map(|row| row.get::<_, String>(0))
        .filter(|table| config.includes(table))
        .collect();
    info!(
        "Found {} tables in schema '{}'",
        tables.len(),
        config.schema
    );
    Ok(tables)
}

/// Read columns, primary key and every row of one table
pub async fn capture_table(client: &Client, schema: &str, table: &str) -> Result<TableCapture> {
    let columns = get_columns(client, schema, table).await?;
    let primary_key = get_primary_key_columns(client, schema, table).await?;

    let query = format!(
        "SELECT row_to_json(t)::text FROM {} t",
        qualified_name(schema, table)
    );
    debug!("Snapshot querying table {table} with: {query}");
    let rows = client
        .query(&query, &[])
        .await
        .with_context(|| format!("Failed to read rows of '{table}'"))?;

    let mut captured = Vec::with_capacity(rows.len());
    for row in &rows {
        let json: String = row.get(0);
        captured.push(row_from_json(&json, &columns)?);
    }
    info!("Captured {} rows from {table}", captured.len());

    Ok(TableCapture::new(columns, primary_key, captured))
}

async fn get_columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<BTreeMap<String, String>> {
    let rows = client
        .query(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema::text = $1 AND table_name::text = $2 \
             ORDER BY ordinal_position",
            &[&schema, &table],
        )
        .await
        .with_context(|| format!("Failed to read columns of '{table}'"))?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect())
}

/// Get primary key columns for a table, in key order. Empty when the table
/// has no primary key.
async fn get_primary_key_columns(client: &Client, schema: &str, table: &str) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT a.attname::text \
             FROM pg_index i \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
             WHERE i.indrelid = ($1::text)::regclass \
             AND i.indisprimary \
             ORDER BY array_position(i.indkey, a.attnum)",
            &[&qualified_name(schema, table)],
        )
        .await
        .with_context(|| format!("Failed to read primary key of '{table}'"))?;
    Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
}

/// `"schema"."table"` with embedded quotes doubled
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
