use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use serde::{Deserialize, Serialize};

use crate::store::{StoreError, StoreResult};

use super::Coll;

/// A counter object used to implement auto-increment fields.
///
/// Each counter is keyed by the name of the collection whose IDs it hands out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Atomically retrieve the next ID for the given collection.
    ///
    /// The increment commits immediately, outside any transaction, so that
    /// concurrent transactions never write the same counter document. IDs
    /// handed to a transaction that later rolls back are skipped.
    pub async fn next(counters: &Coll<Counter>, collection: &str) -> StoreResult<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": collection }, update, options)
            .await?
            .ok_or_else(|| {
                StoreError::backend(format!("Failed to find ID counter for {collection}"))
            })?;
        Ok(counter.next)
    }
}

/// Ensure an ID counter exists for each of the given collections, starting at 1.
///
/// This operation is idempotent.
pub async fn ensure_id_counters_exist(
    counters: &Coll<Counter>,
    collections: &[&str],
) -> Result<(), DbError> {
    let upsert = UpdateOptions::builder().upsert(true).build();
    for collection in collections {
        let update = doc! {
            "$setOnInsert": { "next": 1_u32 }
        };
        counters
            .update_one(doc! { "_id": *collection }, update, upsert.clone())
            .await?;
    }
    Ok(())
}
