//! MongoDB backend.
//!
//! Records cross the boundary as JSON objects. On the way in they are
//! serialized to BSON documents with the ObjectId attached under `_id`; on the
//! way out `_id` becomes its hex string and every other value is rendered as
//! relaxed extended JSON.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Database};
use serde_json::Value;
use tracing::{debug, info};

use super::{Collection, DocumentStore, FieldFilter, SortSpec, StoreError};
use crate::types::{DeleteAck, InsertAck, Record, RecordId, UpdateAck, ID_FIELD};

/// Server error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// How long to wait for a reachable server before an operation fails.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Application name reported to the server.
const APP_NAME: &str = "galaxy-server";

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Document store backed by a MongoDB deployment.
///
/// The driver keeps its own connection pool; cloning the inner client is
/// cheap and every handler shares the same pool.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connects with the Stable API v1 and verifies the deployment answers a
    /// `ping`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the URI cannot be parsed or the
    /// deployment does not respond.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.server_api = Some(
            ServerApi::builder()
                .version(ServerApiVersion::V1)
                .strict(true)
                .deprecation_errors(true)
                .build(),
        );
        options.app_name = Some(APP_NAME.to_string());
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

        let client = Client::with_options(options)?;
        let store = Self {
            database: client.database(database),
            client,
        };

        store.ping().await?;
        info!(database = %database, "Connected to MongoDB deployment");
        Ok(store)
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.database.collection(collection.name())
    }
}

fn by_id(id: &RecordId) -> Document {
    doc! { "_id": id.object_id() }
}

/// Serializes a record to BSON, dropping any `_id` it carries.
fn record_to_document(mut record: Record) -> Result<Document, StoreError> {
    record.remove(ID_FIELD);
    bson::to_document(&record).map_err(|e| StoreError::Conversion(e.to_string()))
}

/// Renders a stored document as a client-facing record.
fn document_to_record(mut document: Document) -> Record {
    let mut record = Record::new();
    if let Some(id) = document.remove(ID_FIELD) {
        let id = match id {
            Bson::ObjectId(oid) => Value::String(oid.to_hex()),
            other => other.into_relaxed_extjson(),
        };
        record.insert(ID_FIELD.to_string(), id);
    }
    for (key, value) in document {
        record.insert(key, value.into_relaxed_extjson());
    }
    record
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(
        &self,
        collection: Collection,
        filter: Option<FieldFilter>,
        sort: Option<SortSpec>,
    ) -> Result<Vec<Record>, StoreError> {
        let mut query = Document::new();
        if let Some(filter) = filter {
            query.insert(filter.field, filter.value);
        }

        let target = self.collection(collection);
        let mut find = target.find(query);
        if let Some(sort) = sort {
            let mut order = Document::new();
            order.insert(sort.field, sort.direction.as_i32());
            find = find.sort(order);
        }

        let documents: Vec<Document> = find.await?.try_collect().await?;
        debug!(
            collection = collection.name(),
            count = documents.len(),
            "Query returned documents"
        );
        Ok(documents.into_iter().map(document_to_record).collect())
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let document = self.collection(collection).find_one(by_id(id)).await?;
        Ok(document.map(document_to_record))
    }

    async fn insert(
        &self,
        collection: Collection,
        id: RecordId,
        record: Record,
    ) -> Result<InsertAck, StoreError> {
        let mut document = record_to_document(record)?;
        document.insert(ID_FIELD, id.object_id());

        match self.collection(collection).insert_one(document).await {
            Ok(_) => Ok(InsertAck {
                acknowledged: true,
                inserted_id: id,
            }),
            Err(err) if is_duplicate_key(&err) => Err(StoreError::Duplicate(id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn upsert_fields(
        &self,
        collection: Collection,
        id: &RecordId,
        fields: Record,
    ) -> Result<UpdateAck, StoreError> {
        let fields = record_to_document(fields)?;
        if fields.is_empty() {
            return Err(StoreError::Conversion("no fields to update".to_string()));
        }

        let result = self
            .collection(collection)
            .update_one(by_id(id), doc! { "$set": fields })
            .upsert(true)
            .await?;

        let upserted_id = match result.upserted_id {
            Some(Bson::ObjectId(oid)) => Some(RecordId::from(oid)),
            Some(_) | None => None,
        };
        Ok(UpdateAck {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(upserted_id.is_some()),
            upserted_id,
        })
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<DeleteAck, StoreError> {
        let result = self.collection(collection).delete_one(by_id(id)).await?;
        Ok(DeleteAck {
            acknowledged: true,
            deleted_count: result.deleted_count,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB client shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn document_to_record_renders_object_id_as_hex() {
        let oid = ObjectId::new();
        let document = doc! {
            "_id": oid,
            "title": "Nebula Suite",
            "price": 320_i32,
            "availability": 4_i64,
            "rating": 4.5,
        };

        let record = document_to_record(document);
        assert_eq!(record["_id"], json!(oid.to_hex()));
        assert_eq!(record["title"], json!("Nebula Suite"));
        assert_eq!(record["price"], json!(320));
        assert_eq!(record["availability"], json!(4));
        assert_eq!(record["rating"], json!(4.5));
    }

    #[test]
    fn document_to_record_keeps_string_ids() {
        let record = document_to_record(doc! { "_id": "legacy-id", "sid": "r1" });
        assert_eq!(record["_id"], json!("legacy-id"));
    }

    #[test]
    fn record_to_document_drops_embedded_id() {
        let record = match json!({"_id": "x", "email": "a@x.com", "guests": 2}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let document = record_to_document(record).unwrap();
        assert!(!document.contains_key("_id"));
        assert_eq!(document.get_str("email").unwrap(), "a@x.com");
        assert!(document.contains_key("guests"));
    }

    #[test]
    fn by_id_filters_on_object_id() {
        let id = RecordId::new();
        let filter = by_id(&id);
        assert_eq!(filter.get_object_id("_id").unwrap(), id.object_id());
    }
}
