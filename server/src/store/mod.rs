//! Document store abstraction.
//!
//! Handlers talk to a [`DocumentStore`] trait object held in the application
//! state. The connection is created once at startup by [`connect`] and closed
//! explicitly through [`DocumentStore::shutdown`] when the server stops.
//!
//! Two backends are provided:
//! - [`MongoStore`] - MongoDB through the official driver
//! - [`MemoryStore`] - in-process store with the same semantics, used by the
//!   tests and for local development

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, StoreBackend};
use crate::types::{DeleteAck, InsertAck, Record, RecordId, UpdateAck};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A record could not be mapped between JSON and the backend format.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// An insert reused an identifier that already exists.
    #[error("duplicate identifier {0}")]
    Duplicate(RecordId),

    /// The store cannot be reached or configured.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The collections this server reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Rooms,
    Bookings,
    Reviews,
}

impl Collection {
    /// Collection name in the database.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rooms => "rooms",
            Self::Bookings => "bookings",
            Self::Reviews => "reviews",
        }
    }
}

/// Equality match on a single string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: &'static str,
    pub value: String,
}

impl FieldFilter {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Maps a caller directive: positive ascends, negative descends, zero
    /// means no ordering.
    pub fn from_directive(directive: i64) -> Option<Self> {
        match directive.signum() {
            1 => Some(Self::Ascending),
            -1 => Some(Self::Descending),
            _ => None,
        }
    }

    /// Numeric form understood by the document store.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Ordering on a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: &'static str,
    pub direction: SortDirection,
}

/// Operations the route handlers perform against the document store.
///
/// Each call is a single-document (or single-query) operation; no method
/// spans multiple documents atomically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns every record in `collection` matching `filter`, ordered by
    /// `sort` when given and in the store's natural order otherwise.
    async fn find(
        &self,
        collection: Collection,
        filter: Option<FieldFilter>,
        sort: Option<SortSpec>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Looks up a single record by identifier.
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError>;

    /// Inserts `record` under `id`. Any `_id` key inside the record is ignored.
    async fn insert(
        &self,
        collection: Collection,
        id: RecordId,
        record: Record,
    ) -> Result<InsertAck, StoreError>;

    /// Sets `fields` on the record with `id`, creating a record holding only
    /// those fields when none matches.
    async fn upsert_fields(
        &self,
        collection: Collection,
        id: &RecordId,
        fields: Record,
    ) -> Result<UpdateAck, StoreError>;

    /// Removes the record with `id`. Zero matches is not an error.
    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<DeleteAck, StoreError>;

    /// Round trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Releases backend resources. The store must not be used afterwards.
    async fn shutdown(&self);
}

/// Opens the backend selected by the configuration.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] when the Mongo backend has no
/// connection string, or any error raised while connecting and pinging.
pub async fn connect(config: &Config) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.store {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Mongo => {
            let uri = config
                .connection_uri()
                .ok_or_else(|| StoreError::Unavailable("no database credentials".to_string()))?;
            let store = MongoStore::connect(&uri, &config.db_name).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_direction_from_directive() {
        assert_eq!(SortDirection::from_directive(1), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::from_directive(42), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::from_directive(-1), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_directive(0), None);
    }

    #[test]
    fn collection_names() {
        assert_eq!(Collection::Rooms.name(), "rooms");
        assert_eq!(Collection::Bookings.name(), "bookings");
        assert_eq!(Collection::Reviews.name(), "reviews");
    }
}
