//! MongoDB source adapter
//!
//! Collections map to tables and documents to rows keyed by `_id`.
//! Live capture uses a database-wide change stream, which requires a replica
//! set or sharded cluster.

pub mod change;
pub mod config;
pub mod snapshot;
pub mod stream;
pub mod value;

pub use config::MongoConfig;

use async_trait::async_trait;
use drift_core::{Error, Result, Snapshot, SourceKind};
use drift_source::{
    CaptureReport, Connection, DeltaStream, ReportBuilder, SnapshotSource, StreamSource,
    WorkerStream,
};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use std::time::Duration;
use tracing::{debug, info};

pub struct MongoSource {
    config: MongoConfig,
}

impl MongoSource {
    pub fn new(config: MongoConfig) -> Self {
        Self { config }
    }

    async fn connect(&self, connection: &Connection) -> Result<Database> {
        let source_name = connection.source_name();
        let mut options = ClientOptions::parse(connection.as_str())
            .await
            .map_err(|e| Error::connection(source_name, e))?;
        // Fail fast instead of hanging on an unreachable server
        options.connect_timeout = Some(Duration::from_secs(10));
        options.server_selection_timeout = Some(Duration::from_secs(10));

        let database = self
            .config
            .database
            .clone()
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| {
                Error::connection(
                    source_name,
                    "no database given in the connection string or configuration",
                )
            })?;
        debug!("Using MongoDB database: {database}");

        let client = Client::with_options(options).map_err(|e| Error::connection(source_name, e))?;
        let db = client.database(&database);
        // The driver connects lazily; ping so connection errors surface here
        db.run_command(bson::doc! { "ping": 1 })
            .await
            .map_err(|e| Error::connection(source_name, e))?;
        info!("Connected to MongoDB");
        Ok(db)
    }
}

#[async_trait]
impl SnapshotSource for MongoSource {
    async fn capture_snapshot(&self, connection: &Connection) -> Result<CaptureReport> {
        let db = self.connect(connection).await?;
        let collections = snapshot::list_collections(&db, &self.config)
            .await
            .map_err(|e| Error::capture(connection.source_name(), "listCollections", e))?;

        let mut report = ReportBuilder::new(Snapshot::builder(
            connection.source_name(),
            SourceKind::Mongodb,
        ));
        for name in &collections {
            let outcome = snapshot::capture_collection(&db, name).await;
            report.record(name, outcome);
        }
        Ok(report.finish())
    }
}

#[async_trait]
impl StreamSource for MongoSource {
    async fn start_capture(&self, connection: &Connection) -> Result<Box<dyn DeltaStream>> {
        let source_name = connection.source_name();
        let db = self.connect(connection).await?;
        let changes = stream::open(&db)
            .await
            .map_err(|e| Error::stream(source_name, None, e))?;

        let config = self.config.clone();
        let stream = WorkerStream::spawn(source_name, config.queue_capacity, move |tx| {
            stream::watch_changes(changes, config, tx)
        });
        Ok(Box::new(stream))
    }
}
