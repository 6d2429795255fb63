//!  Blob operations for record storage.
//!
//! Each record is stored as one JSON blob. Field names and values are kept
//! as two parallel arrays so property order survives the round trip.

use serde::{Deserialize, Serialize};

use crate::record::LogicalRecord;
use crate::record::RecordId;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::odb::ObjectStore;
use crate::storage::types::{BlobId, ObjectId, ObjectKind};

/// internal format for JSON serialization
///
/// The stored form:
/// ```text
/// {"_id":"01J...","_fields":["kind","name"],"_values":["job","nightly"]}
/// ```
#[derive(Serialize, Deserialize)]
struct RecordJson {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "_fields")]
    fields: Vec<String>,
    #[serde(rename = "_values")]
    values: Vec<String>,
}

/// serialize a record to JSON bytes
///
/// compact and order-preserving, so equal records give equal bytes
pub fn serialize_record(record: &LogicalRecord) -> StorageResult<Vec<u8>> {
    let json = RecordJson {
        id: record.identity().map(|id| id.to_string()),
        fields: record.field_names().map(str::to_string).collect(),
        values: record.values().map(str::to_string).collect(),
    };
    Ok(serde_json::to_vec(&json)?)
}

/// deserialize a record from JSON bytes
pub fn deserialize_record(bytes: &[u8], blob_id: BlobId) -> StorageResult<LogicalRecord> {
    let json: RecordJson = serde_json::from_slice(bytes)?;

    let record =
        LogicalRecord::new(json.fields, json.values).map_err(|e| StorageError::CorruptedData {
            path: blob_id.to_string().into(),
            reason: e.to_string(),
        })?;

    Ok(match json.id {
        Some(id) => record.with_identity(RecordId::new(id)),
        None => record,
    })
}

/// the blob id `record` would get, without writing it
pub fn record_blob_id(record: &LogicalRecord) -> StorageResult<BlobId> {
    let bytes = serialize_record(record)?;
    Ok(BlobId::new(ObjectId::compute(ObjectKind::Blob, &bytes)))
}

/// write a record as a blob to the object store
pub fn write_record(store: &dyn ObjectStore, record: &LogicalRecord) -> StorageResult<BlobId> {
    let bytes = serialize_record(record)?;
    store.put_blob(&bytes)
}

/// read a record blob back from the object store
pub fn read_record(store: &dyn ObjectStore, blob_id: BlobId) -> StorageResult<LogicalRecord> {
    let bytes = store.get_blob(blob_id)?;
    deserialize_record(&bytes, blob_id)
}
