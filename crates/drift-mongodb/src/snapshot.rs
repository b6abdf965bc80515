//! Collection scans for one-shot snapshots

use crate::config::MongoConfig;
use crate::value::convert_document;
use anyhow::Result;
use bson::doc;
use drift_core::{Row, TableCapture};
use mongodb::Database;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub async fn list_collections(db: &Database, config: &MongoConfig) -> Result<Vec<String>> {
    let mut names: Vec<String> = db
        .list_collection_names()
        .await?
        .into_iter()
        .filter(|name| config.includes(name))
        .collect();
    names.sort();
    info!("Found {} collections in MongoDB", names.len());
    debug!("Collections: {:?}", names);
    Ok(names)
}

/// Read every document of a collection. Documents are keyed by `_id`.
pub async fn capture_collection(db: &Database, name: &str) -> Result<TableCapture> {
    let collection = db.collection::<bson::Document>(name);
    let mut cursor = collection.find(doc! {}).await?;

    let mut rows = Vec::new();
    while cursor.advance().await? {
        let doc: bson::Document = cursor.current().try_into()?;
        rows.push(convert_document(doc));
    }
    info!("Captured {} documents from '{name}'", rows.len());

    Ok(TableCapture::new(infer_columns(&rows), vec!["_id".to_string()], rows))
}

/// Collections have no declared schema, so column types are taken from the
/// first non-null value seen for each field.
pub fn infer_columns(rows: &[Row]) -> BTreeMap<String, String> {
    let mut columns: BTreeMap<String, String> = BTreeMap::new();
    for row in rows {
        for (field, value) in row {
            let known = columns.get(field).is_some_and(|t| t != "null");
            if !known {
                columns.insert(field.clone(), value.type_name().to_string());
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_columns() {
        let rows: Vec<Row> = serde_json::from_value(json!([
            {"_id": 1, "nickname": null},
            {"_id": 2, "nickname": "bo", "tags": ["x"]},
        ]))
        .unwrap();
        let columns = infer_columns(&rows);
        assert_eq!(columns["_id"], "number");
        assert_eq!(columns["nickname"], "string");
        assert_eq!(columns["tags"], "array");
    }
}
