//! In-process document store.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Collection, DocumentStore, FieldFilter, SortDirection, SortSpec, StoreError};
use crate::types::{DeleteAck, InsertAck, Record, RecordId, UpdateAck, ID_FIELD};

type Rows = Vec<(RecordId, Record)>;

/// Document store kept in memory.
///
/// Records are held in insertion order per collection, which is the
/// "natural order" returned by unsorted queries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Rows>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<Collection, Rows>) -> T) -> Result<T, StoreError> {
        let guard = self
            .collections
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        Ok(f(&guard))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut HashMap<Collection, Rows>) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .collections
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

/// Copy of a stored record with its identifier attached.
fn with_id(id: &RecordId, record: &Record) -> Record {
    let mut out = record.clone();
    out.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    out
}

/// Position of a JSON type in the document store's cross-type sort order:
/// missing and null first, then numbers, strings, objects, arrays, booleans.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Orders two field values the way the document store sorts them.
///
/// Values of different types order by [`type_rank`]. Within a type, numbers
/// compare numerically, strings bytewise and booleans false-first; objects
/// and arrays are left in place.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.as_bytes().cmp(y.as_bytes()),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn matches(record: &Record, filter: Option<&FieldFilter>) -> bool {
    match filter {
        None => true,
        Some(filter) => record
            .get(filter.field)
            .and_then(Value::as_str)
            .is_some_and(|v| v == filter.value),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: Collection,
        filter: Option<FieldFilter>,
        sort: Option<SortSpec>,
    ) -> Result<Vec<Record>, StoreError> {
        let mut found: Vec<Record> = self.read(|collections| {
            collections
                .get(&collection)
                .map(|rows| {
                    rows.iter()
                        .filter(|(_, record)| matches(record, filter.as_ref()))
                        .map(|(id, record)| with_id(id, record))
                        .collect()
                })
                .unwrap_or_default()
        })?;

        if let Some(sort) = sort {
            found.sort_by(|a, b| {
                let ordering = compare_values(a.get(sort.field), b.get(sort.field));
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        Ok(found)
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        self.read(|collections| {
            collections.get(&collection).and_then(|rows| {
                rows.iter()
                    .find(|(row_id, _)| row_id == id)
                    .map(|(row_id, record)| with_id(row_id, record))
            })
        })
    }

    async fn insert(
        &self,
        collection: Collection,
        id: RecordId,
        mut record: Record,
    ) -> Result<InsertAck, StoreError> {
        record.remove(ID_FIELD);
        self.write(|collections| {
            let rows = collections.entry(collection).or_default();
            if rows.iter().any(|(row_id, _)| *row_id == id) {
                return Err(StoreError::Duplicate(id));
            }
            rows.push((id, record));
            Ok(InsertAck {
                acknowledged: true,
                inserted_id: id,
            })
        })?
    }

    async fn upsert_fields(
        &self,
        collection: Collection,
        id: &RecordId,
        mut fields: Record,
    ) -> Result<UpdateAck, StoreError> {
        fields.remove(ID_FIELD);
        self.write(|collections| {
            let rows = collections.entry(collection).or_default();
            match rows.iter_mut().find(|(row_id, _)| row_id == id) {
                Some((_, record)) => {
                    let mut changed = false;
                    for (key, value) in fields {
                        if record.get(&key) != Some(&value) {
                            record.insert(key, value);
                            changed = true;
                        }
                    }
                    UpdateAck {
                        acknowledged: true,
                        matched_count: 1,
                        modified_count: u64::from(changed),
                        upserted_count: 0,
                        upserted_id: None,
                    }
                }
                None => {
                    rows.push((*id, fields));
                    UpdateAck {
                        acknowledged: true,
                        matched_count: 0,
                        modified_count: 0,
                        upserted_count: 1,
                        upserted_id: Some(*id),
                    }
                }
            }
        })
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<DeleteAck, StoreError> {
        self.write(|collections| {
            let deleted = collections.get_mut(&collection).map_or(0, |rows| {
                let before = rows.len();
                rows.retain(|(row_id, _)| row_id != id);
                (before - rows.len()) as u64
            });
            DeleteAck {
                acknowledged: true,
                deleted_count: deleted,
            }
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read(|_| ())
    }

    async fn shutdown(&self) {
        debug!("Memory store released");
    }
}
