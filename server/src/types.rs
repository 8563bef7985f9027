//! Record, payload and acknowledgment types.
//!
//! Records are schemaless JSON objects: the store keeps whatever fields a
//! client submitted. The payload types below are the boundary where the
//! fields this server relies on (owner email, stay dates, review subject)
//! are checked before anything is persisted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::ApiError;

/// A stored document as returned to clients.
pub type Record = serde_json::Map<String, Value>;

/// Key every record carries its identifier under.
pub const ID_FIELD: &str = "_id";

/// Canonical record identifier: a 12-byte ObjectId rendered as 24 hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(ObjectId);

impl RecordId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// The underlying ObjectId.
    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for RecordId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl FromStr for RecordId {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s)
            .map(Self)
            .map_err(|_| ApiError::validation(format!("invalid identifier '{s}'")))
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ObjectId::parse_str(&raw)
            .map(Self)
            .map_err(|_| serde::de::Error::custom(format!("invalid identifier '{raw}'")))
    }
}

/// Booking creation payload.
///
/// Beyond the checked fields, anything else the client sends (room
/// reference, price, image, ...) is stored verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    /// Optional client-chosen identifier.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "checkIn", default)]
    pub check_in: Option<String>,
    #[serde(rename = "checkOut", default)]
    pub check_out: Option<String>,
    #[serde(flatten)]
    pub extra: Record,
}

impl NewBooking {
    /// Validates the payload and splits it into an identifier and the
    /// record to persist.
    pub fn into_record(self) -> Result<(RecordId, Record), ApiError> {
        let id = match self.id.as_deref() {
            Some(raw) => raw.parse()?,
            None => RecordId::new(),
        };
        let email = require_email(self.email)?;
        let check_in = require_field(self.check_in, "checkIn")?;
        let check_out = require_field(self.check_out, "checkOut")?;
        check_stay(&check_in, &check_out)?;

        let mut record = self.extra;
        record.insert("email".to_string(), Value::String(email));
        record.insert("checkIn".to_string(), Value::String(check_in));
        record.insert("checkOut".to_string(), Value::String(check_out));
        Ok((id, record))
    }
}

/// Payload for rescheduling a booking.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingDates {
    #[serde(rename = "checkIn", default)]
    pub check_in: Option<String>,
    #[serde(rename = "checkOut", default)]
    pub check_out: Option<String>,
}

impl BookingDates {
    /// Validates both dates and returns the fields to set.
    pub fn into_fields(self) -> Result<Record, ApiError> {
        let check_in = require_field(self.check_in, "checkIn")?;
        let check_out = require_field(self.check_out, "checkOut")?;
        check_stay(&check_in, &check_out)?;

        let mut fields = Record::new();
        fields.insert("checkIn".to_string(), Value::String(check_in));
        fields.insert("checkOut".to_string(), Value::String(check_out));
        Ok(fields)
    }
}

/// Review creation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    /// Subject (room) the review is about.
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(flatten)]
    pub extra: Record,
}

impl NewReview {
    /// Validates the payload and returns the record to persist.
    ///
    /// Review identifiers are always store-generated, so a client `_id` is
    /// dropped.
    pub fn into_record(self) -> Result<Record, ApiError> {
        let sid = require_field(self.sid, "sid")?;
        let mut record = self.extra;
        record.remove(ID_FIELD);
        record.insert("sid".to_string(), Value::String(sid));
        Ok(record)
    }
}

/// Identity submitted to `POST /jwt`.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Record,
}

impl IdentityPayload {
    /// Returns the validated email and the remaining claims.
    pub fn into_parts(self) -> Result<(String, Record), ApiError> {
        let email = require_email(self.email)?;
        Ok((email, self.extra))
    }
}

/// Acknowledgment of a single insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertAck {
    pub acknowledged: bool,
    pub inserted_id: RecordId,
}

/// Acknowledgment of an update-or-insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAck {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    pub upserted_id: Option<RecordId>,
}

/// Acknowledgment of a single delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAck {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

fn require_field(value: Option<String>, name: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::validation(format!("missing required field '{name}'"))),
    }
}

fn require_email(value: Option<String>) -> Result<String, ApiError> {
    let email = require_field(value, "email")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::validation(format!("invalid email '{email}'"))),
    }
}

/// Parses a stay date: either a plain `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_stay_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

fn check_stay(check_in: &str, check_out: &str) -> Result<(), ApiError> {
    let start = parse_stay_date(check_in)
        .ok_or_else(|| ApiError::validation(format!("invalid checkIn date '{check_in}'")))?;
    let end = parse_stay_date(check_out)
        .ok_or_else(|| ApiError::validation(format!("invalid checkOut date '{check_out}'")))?;
    if end < start {
        return Err(ApiError::validation("checkOut must not be before checkIn"));
    }
    Ok(())
}
