//! MySQL source adapter
//!
//! Snapshots only. Live capture would need a binlog reader, which this
//! adapter does not provide.

pub mod config;
pub mod rows;
pub mod schema;

pub use config::MysqlConfig;

use anyhow::Context;
use async_trait::async_trait;
use drift_core::{Error, Result, Snapshot, SourceKind, TableCapture};
use drift_source::{CaptureReport, Connection, ReportBuilder, SnapshotSource};
use mysql_async::{prelude::*, Conn, Pool};
use schema::TableSchema;
use tracing::{debug, info};

pub struct MysqlSource {
    config: MysqlConfig,
}

impl MysqlSource {
    pub fn new(config: MysqlConfig) -> Self {
        Self { config }
    }

    async fn database_name(&self, conn: &mut Conn) -> anyhow::Result<String> {
        if let Some(db) = &self.config.database {
            return Ok(db.clone());
        }
        let current_db: Option<Option<String>> = conn.query_first("SELECT DATABASE()").await?;
        current_db
            .flatten()
            .context("No database selected; name one in the connection string")
    }
}

#[async_trait]
impl SnapshotSource for MysqlSource {
    async fn capture_snapshot(&self, connection: &Connection) -> Result<CaptureReport> {
        let source_name = connection.source_name();
        let pool = Pool::from_url(connection.as_str())
            .map_err(|e| Error::connection(source_name, e))?;
        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| Error::connection(source_name, e))?;
        info!("Connected to MySQL");

        let database = self
            .database_name(&mut conn)
            .await
            .map_err(|e| Error::connection(source_name, e))?;
        let catalog = async {
            let tables = schema::get_user_tables(&mut conn, &database).await?;
            let schema = schema::collect_schema(&mut conn, &database).await?;
            anyhow::Ok((tables, schema))
        }
        .await;
        let (tables, mut schema) =
            catalog.map_err(|e| Error::capture(source_name, "information_schema", e))?;
        info!("Found {} tables in database '{database}'", tables.len());

        let mut report =
            ReportBuilder::new(Snapshot::builder(source_name, SourceKind::Mysql));
        for table in tables.iter().filter(|t| self.config.includes(t)) {
            let table_schema = schema.remove(table).unwrap_or_default();
            let outcome = capture_table(&mut conn, table, table_schema).await;
            report.record(table, outcome);
        }

        drop(conn);
        if let Err(e) = pool.disconnect().await {
            debug!("Error while disconnecting MySQL pool: {e}");
        }
        Ok(report.finish())
    }
}

async fn capture_table(
    conn: &mut Conn,
    table: &str,
    schema: TableSchema,
) -> anyhow::Result<TableCapture> {
    if schema.column_order.is_empty() {
        anyhow::bail!("No columns found for table '{table}'");
    }
    let query = rows::json_object_query(table, &schema);
    debug!("Snapshot querying table {table} with: {query}");
    let rendered: Vec<String> = conn
        .query(query)
        .await
        .with_context(|| format!("Failed to read rows of '{table}'"))?;

    let mut captured = Vec::with_capacity(rendered.len());
    for json in &rendered {
        captured.push(rows::row_from_json(json, &schema)?);
    }
    info!("Captured {} rows from {table}", captured.len());

    Ok(TableCapture::new(schema.columns, schema.primary_key, captured))
}
