//! Closed registry of source adapters, selected by connection scheme.

use crate::config::Config;
use drift_core::{Error, Result, SourceKind};
use drift_mongodb::MongoSource;
use drift_mysql::MysqlSource;
use drift_postgresql::PostgresSource;
use drift_source::{CaptureReport, Connection, SnapshotSource, StreamSource};
use std::sync::Arc;

pub enum SourceAdapter {
    Postgres(Arc<PostgresSource>),
    Mongodb(Arc<MongoSource>),
    Mysql(Arc<MysqlSource>),
}

impl SourceAdapter {
    /// Adapter for the connection's scheme, configured from `config`.
    pub fn for_connection(connection: &Connection, config: &Config) -> Self {
        match connection.kind() {
            SourceKind::Postgres => {
                SourceAdapter::Postgres(Arc::new(PostgresSource::new(config.postgres.clone().into())))
            }
            SourceKind::Mongodb => {
                SourceAdapter::Mongodb(Arc::new(MongoSource::new(config.mongodb.clone().into())))
            }
            SourceKind::Mysql => {
                SourceAdapter::Mysql(Arc::new(MysqlSource::new(config.mysql.clone().into())))
            }
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceAdapter::Postgres(_) => SourceKind::Postgres,
            SourceAdapter::Mongodb(_) => SourceKind::Mongodb,
            SourceAdapter::Mysql(_) => SourceKind::Mysql,
        }
    }

    pub fn supports_streaming(&self) -> bool {
        !matches!(self, SourceAdapter::Mysql(_))
    }

    pub async fn capture_snapshot(&self, connection: &Connection) -> Result<CaptureReport> {
        match self {
            SourceAdapter::Postgres(source) => source.capture_snapshot(connection).await,
            SourceAdapter::Mongodb(source) => source.capture_snapshot(connection).await,
            SourceAdapter::Mysql(source) => source.capture_snapshot(connection).await,
        }
    }

    /// The adapter as a live capture source, for [`drift_capture::CaptureSession`].
    pub fn stream_source(&self, connection: &Connection) -> Result<Arc<dyn StreamSource>> {
        match self {
            SourceAdapter::Postgres(source) => Ok(source.clone()),
            SourceAdapter::Mongodb(source) => Ok(source.clone()),
            SourceAdapter::Mysql(_) => Err(Error::stream(
                connection.source_name(),
                None,
                "live capture is not available for MySQL sources",
            )),
        }
    }
}
