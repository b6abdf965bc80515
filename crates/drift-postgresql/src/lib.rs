//! PostgreSQL source adapter
//!
//! Snapshots read the catalog (`information_schema`, `pg_index`) for columns
//! and primary keys and render rows with `row_to_json`. Live capture polls a
//! logical replication slot decoded by the wal2json output plugin, so the
//! server needs `wal_level = logical` and wal2json installed.

pub mod config;
pub mod replication;
pub mod snapshot;
pub mod value;
pub mod wal2json;

pub use config::PostgresConfig;

use async_trait::async_trait;
use drift_core::{Error, Result, Snapshot, SourceKind};
use drift_source::{
    CaptureReport, Connection, DeltaStream, ReportBuilder, SnapshotSource, StreamSource,
    WorkerStream,
};
use replication::Slot;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

pub struct PostgresSource {
    config: PostgresConfig,
}

impl PostgresSource {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }
}

async fn connect(connection: &Connection) -> Result<Client> {
    let (client, conn) = tokio_postgres::connect(connection.as_str(), NoTls)
        .await
        .map_err(|e| Error::connection(connection.source_name(), e))?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            error!("PostgreSQL connection error: {e}");
        }
    });

    info!("Connected to PostgreSQL");
    Ok(client)
}

#[async_trait]
impl SnapshotSource for PostgresSource {
    async fn capture_snapshot(&self, connection: &Connection) -> Result<CaptureReport> {
        let client = connect(connection).await?;
        let tables = snapshot::list_tables(&client, &self.config)
            .await
            .map_err(|e| Error::capture(connection.source_name(), "information_schema.tables", e))?;

        let mut report = ReportBuilder::new(Snapshot::builder(
            connection.source_name(),
            SourceKind::Postgres,
        ));
        for table in &tables {
            let outcome = snapshot::capture_table(&client, &self.config.schema, table).await;
            report.record(table, outcome);
        }
        Ok(report.finish())
    }
}

#[async_trait]
impl StreamSource for PostgresSource {
    async fn start_capture(&self, connection: &Connection) -> Result<Box<dyn DeltaStream>> {
        let source_name = connection.source_name();
        self.config
            .validate()
            .map_err(|e| Error::stream(source_name, None, e))?;

        let client = connect(connection).await?;
        let slot = Slot::new(&self.config.slot_name);
        slot.ensure(&client)
            .await
            .map_err(|e| Error::stream(source_name, None, e))?;
        info!("Logical replication started on slot: {}", slot.name());

        let config = self.config.clone();
        let stream = WorkerStream::spawn(source_name, config.queue_capacity, move |tx| {
            replication::poll_slot(client, slot, config, tx)
        });
        Ok(Box::new(stream))
    }
}
