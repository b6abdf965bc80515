//! Logical replication slot polling
//!
//! Changes are read with `pg_logical_slot_peek_changes` using regular SQL
//! connections (not the replication protocol). After a batch has been handed
//! to the consumer the slot is advanced to the batch's last commit, so a
//! crash between the two redelivers rather than loses changes.

use crate::config::PostgresConfig;
use crate::wal2json::parse_wal2json;
use anyhow::{Context, Result};
use chrono::Utc;
use drift_core::{parse_timestamp, DeltaOrigin, Error};
use drift_source::DeltaSender;
use tokio_postgres::Client;
use tracing::{debug, info, warn};

/// wal2json options
///
/// 'format-version', '2' - one JSON object per change
/// 'include-transaction', 'true' - emit B/C markers (commit timestamp, nextlsn)
/// 'include-lsn', 'true' - add nextlsn to commit markers
/// 'include-timestamp', 'true' - add the commit timestamp to markers
/// 'include-pk', 'true' - add primary key column names to each change
const WAL2JSON_OPTIONS: &str = "'format-version', '2', 'include-transaction', 'true', \
     'include-lsn', 'true', 'include-timestamp', 'true', 'include-pk', 'true'";

/// A wal2json logical replication slot
pub struct Slot {
    name: String,
}

impl Slot {
    /// The name must already have passed [`PostgresConfig::validate`].
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the slot unless it already exists
    pub async fn ensure(&self, client: &Client) -> Result<()> {
        let rows = client
            .query(
                "SELECT slot_name FROM pg_replication_slots WHERE slot_name = $1",
                &[&self.name],
            )
            .await
            .context("Failed to check for existing replication slot")?;

        if rows.is_empty() {
            info!("Creating new logical replication slot: {}", self.name);
            let create_slot_query = format!(
                "SELECT * FROM pg_create_logical_replication_slot('{}', 'wal2json')",
                self.name
            );
            client
                .execute(&create_slot_query, &[])
                .await
                .context("Failed to create logical replication slot")?;
        } else {
            info!("Replication slot already exists: {}", self.name);
        }
        Ok(())
    }

    /// Raw wal2json rows of the next committed transactions, not consumed
    pub async fn peek(&self, client: &Client, limit: usize) -> Result<Vec<String>> {
        let query = format!(
            "SELECT data FROM pg_logical_slot_peek_changes('{}', NULL, {limit}, {WAL2JSON_OPTIONS})",
            self.name
        );
        let rows = client
            .query(&query, &[])
            .await
            .context("Failed to peek changes from replication slot")?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    /// Mark everything up to `lsn` as consumed
    pub async fn advance(&self, client: &Client, lsn: &str) -> Result<()> {
        let query = format!(
            "SELECT * FROM pg_replication_slot_advance('{}', '{}'::pg_lsn)",
            self.name,
            lsn.replace('\'', "")
        );
        client
            .execute(&query, &[])
            .await
            .with_context(|| format!("Failed to advance replication slot to {lsn}"))?;
        Ok(())
    }

    pub async fn drop_slot(&self, client: &Client) -> Result<()> {
        info!("Dropping replication slot: {}", self.name);
        let query = format!("SELECT pg_drop_replication_slot('{}')", self.name);
        client
            .execute(&query, &[])
            .await
            .context("Failed to drop replication slot")?;
        Ok(())
    }
}

/// Poll loop run on the stream's worker task
pub async fn poll_slot(
    client: Client,
    slot: Slot,
    config: PostgresConfig,
    mut tx: DeltaSender,
) -> drift_core::Result<()> {
    let source_name = tx.source_name().to_string();
    let failed = |table: Option<String>, e: anyhow::Error| Error::stream(&source_name, table, e);
    let mut total = 0u64;

    'poll: while !tx.is_stopped() {
        let batch = slot
            .peek(&client, config.batch_size)
            .await
            .map_err(|e| failed(None, e))?;
        if batch.is_empty() {
            if !tx.pause(config.poll_interval).await {
                break;
            }
            continue;
        }
        debug!("Decoding {} wal2json records", batch.len());

        let mut commit_time = None;
        let mut advance_to = None;
        for data in batch {
            let record = parse_wal2json(&data).map_err(|e| failed(None, e))?;
            if record.is_begin() {
                commit_time = record.timestamp.as_deref().and_then(parse_timestamp);
                continue;
            }
            if record.is_commit() {
                advance_to = record.nextlsn.clone();
                continue;
            }
            if record.operation().is_none() {
                continue;
            }
            let schema_matches = record.schema.as_deref().unwrap_or("public") == config.schema;
            let table = record.table.clone();
            if !schema_matches || !table.as_deref().is_some_and(|t| config.includes(t)) {
                continue;
            }

            let origin = DeltaOrigin::new(&source_name, commit_time.unwrap_or_else(Utc::now));
            let deltas = record
                .into_deltas(|| tx.next_id(), &origin)
                .map_err(|e| failed(table, e))?;
            for delta in deltas {
                if !tx.send(delta).await {
                    break 'poll;
                }
                total += 1;
            }
        }

        if let Some(lsn) = advance_to {
            slot.advance(&client, &lsn)
                .await
                .map_err(|e| failed(None, e))?;
        }
    }

    info!("Stopped polling slot {} after {total} changes", slot.name());
    if config.drop_slot_on_stop {
        if let Err(e) = slot.drop_slot(&client).await {
            warn!("Failed to drop replication slot {}: {e:#}", slot.name());
        }
    }
    Ok(())
}
