//! Change stream events to deltas

use crate::value::{convert_bson, convert_document};
use anyhow::{anyhow, bail, Result};
use bson::Document;
use chrono::{DateTime, Utc};
use drift_core::{Delta, DeltaOrigin, Row, RowKey, Value};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};

/// The parts of a change stream event a delta is built from.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub operation: OperationType,
    pub collection: Option<String>,
    pub document_key: Option<Document>,
    pub full_document: Option<Document>,
    /// Dotted paths set by an update
    pub updated_fields: Option<Document>,
    /// Dotted paths removed by an update
    pub removed_fields: Vec<String>,
    pub wall_time: Option<DateTime<Utc>>,
}

impl From<ChangeStreamEvent<Document>> for ChangeEvent {
    fn from(event: ChangeStreamEvent<Document>) -> Self {
        let (updated_fields, removed_fields) = match event.update_description {
            Some(description) => (Some(description.updated_fields), description.removed_fields),
            None => (None, Vec::new()),
        };
        let wall_time = event.wall_time.map(|t| t.to_chrono()).or_else(|| {
            event
                .cluster_time
                .and_then(|t| DateTime::from_timestamp(t.time as i64, 0))
        });
        Self {
            operation: event.operation_type,
            collection: event.ns.and_then(|ns| ns.coll),
            document_key: event.document_key,
            full_document: event.full_document,
            updated_fields,
            removed_fields,
            wall_time,
        }
    }
}

impl ChangeEvent {
    /// True for events after which the stream cannot continue.
    pub fn is_invalidate(&self) -> bool {
        matches!(self.operation, OperationType::Invalidate)
    }

    /// Build the delta for a document change.
    ///
    /// Returns `Ok(None)` for collection and database level events (drop,
    /// rename, ...), and for updates whose document was deleted before the
    /// post-image lookup ran; the delete itself follows as its own event.
    pub fn into_delta(self, id: u64, source_name: &str) -> Result<Option<Delta>> {
        if self.is_invalidate() {
            bail!("change stream was invalidated (collection or database dropped or renamed)");
        }
        let is_document_change = matches!(
            self.operation,
            OperationType::Insert
                | OperationType::Update
                | OperationType::Replace
                | OperationType::Delete
        );
        let collection = match &self.collection {
            Some(c) if is_document_change => c.clone(),
            _ => return Ok(None),
        };
        let origin = DeltaOrigin::new(source_name, self.wall_time.unwrap_or_else(Utc::now));
        let key = document_id(self.document_key.as_ref(), self.full_document.as_ref())
            .ok_or_else(|| anyhow!("{:?} event on '{collection}' has no _id", self.operation))?;

        let delta = match self.operation {
            OperationType::Insert => {
                let after = self
                    .full_document
                    .map(convert_document)
                    .ok_or_else(|| anyhow!("insert on '{collection}' carries no document"))?;
                Delta::insert(id, &origin, &collection, key, after)
            }
            OperationType::Replace => {
                let Some(after) = self.full_document.map(convert_document) else {
                    return Ok(None);
                };
                Delta::update(id, &origin, &collection, key, None, after, None)
            }
            OperationType::Update => {
                let Some(after) = self.full_document.map(convert_document) else {
                    return Ok(None);
                };
                let fields = update_fields(self.updated_fields, self.removed_fields);
                Delta::update(id, &origin, &collection, key, None, after, fields)
            }
            OperationType::Delete => {
                let before = self.document_key.map(convert_document).unwrap_or_default();
                Delta::delete(id, &origin, &collection, key, before)
            }
            _ => return Ok(None),
        };
        Ok(Some(delta))
    }
}

fn document_id(key: Option<&Document>, full: Option<&Document>) -> Option<RowKey> {
    let id = key
        .and_then(|k| k.get("_id"))
        .or_else(|| full.and_then(|d| d.get("_id")))?;
    Some(RowKey::Columns(vec![(
        "_id".to_string(),
        convert_bson(id.clone()),
    )]))
}

/// Changed fields of an update: set paths with their new values and removed
/// paths as null. `None` when the event describes no field changes.
fn update_fields(updated: Option<Document>, removed: Vec<String>) -> Option<Row> {
    let mut fields: Row = updated.map(convert_document).unwrap_or_default();
    for path in removed {
        fields.insert(path, Value::Null);
    }
    (!fields.is_empty()).then_some(fields)
}
