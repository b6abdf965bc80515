//! Change stream polling
//!
//! The database-wide change stream is opened before the worker starts, so
//! every change committed after `start_capture` returns is observed. Update
//! events look up the post-image (`UpdateLookup`).

use crate::change::ChangeEvent;
use crate::config::MongoConfig;
use drift_core::Error;
use drift_source::DeltaSender;
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::change_stream::ChangeStream;
use mongodb::options::{ChangeStreamOptions, FullDocumentType};
use mongodb::Database;
use tracing::{debug, info};

pub type DocumentChangeStream = ChangeStream<ChangeStreamEvent<bson::Document>>;

pub async fn open(db: &Database) -> anyhow::Result<DocumentChangeStream> {
    let options = ChangeStreamOptions::builder()
        .full_document(Some(FullDocumentType::UpdateLookup))
        .build();
    let stream = db.watch().with_options(options).await?;
    info!("Opened change stream on database '{}'", db.name());
    Ok(stream)
}

/// Poll loop run on the stream's worker task
pub async fn watch_changes(
    mut stream: DocumentChangeStream,
    config: MongoConfig,
    mut tx: DeltaSender,
) -> drift_core::Result<()> {
    let source_name = tx.source_name().to_string();
    let mut total = 0u64;

    while !tx.is_stopped() {
        let event = stream
            .next_if_any()
            .await
            .map_err(|e| Error::stream(&source_name, None, e))?;
        let Some(event) = event else {
            if !tx.pause(config.poll_interval).await {
                break;
            }
            continue;
        };

        let event = ChangeEvent::from(event);
        let collection = event.collection.clone();
        if !event.is_invalidate()
            && !collection.as_deref().is_some_and(|c| config.includes(c))
        {
            continue;
        }
        debug!("Received {:?} on {:?}", event.operation, collection);

        let id = tx.next_id();
        let delta = event
            .into_delta(id, &source_name)
            .map_err(|e| Error::stream(&source_name, collection, e))?;
        if let Some(delta) = delta {
            if !tx.send(delta).await {
                break;
            }
            total += 1;
        }
    }

    info!("Stopped watching change stream after {total} changes");
    Ok(())
}
