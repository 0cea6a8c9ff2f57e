//! Subscription Record — the value type described in spec §3/§4.A.
//!
//! A record is constructed once per customer subscription, never mutated
//! except for the single `active` flag, and compared by field equality. The
//! on-disk/wire shape is a versioned envelope so that future record formats
//! can be added by extending a `match`, never by guessing at an unknown
//! shape.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// An opaque identifier: a customer id, product id, or subscription id.
///
/// The source system treats these as raw bytes; over JSON they travel as
/// strings, so that's the representation kept here too.
pub type OpaqueId = String;

/// Two adjacent TCP ports assigned to a subscription's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    pub introducer_port_number: u16,
    pub storage_port_number: u16,
}

impl PortPair {
    pub const RANGE_START: u16 = 10000;
    pub const RANGE_END: u16 = 65535;

    /// Construct a pair, checking the adjacency invariant and the range.
    pub fn new(introducer_port_number: u16, storage_port_number: u16) -> Result<Self, StoreError> {
        if storage_port_number != introducer_port_number + 1 {
            return Err(StoreError::SerializationError(format!(
                "storage port {} is not introducer port {} + 1",
                storage_port_number, introducer_port_number
            )));
        }
        if introducer_port_number < Self::RANGE_START || introducer_port_number >= Self::RANGE_END
        {
            return Err(StoreError::SerializationError(format!(
                "introducer port {} out of range [{}, {})",
                introducer_port_number,
                Self::RANGE_START,
                Self::RANGE_END
            )));
        }
        Ok(Self {
            introducer_port_number,
            storage_port_number,
        })
    }
}

/// The full, immutable-apart-from-`active` subscription descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub subscription_id: OpaqueId,
    pub customer_id: OpaqueId,
    pub product_id: OpaqueId,
    pub customer_email: String,
    pub bucket_name: String,
    pub introducer_port_number: u16,
    pub storage_port_number: u16,
    pub old_secrets: serde_json::Value,
    pub active: bool,
}

impl Record {
    pub fn ports(&self) -> PortPair {
        PortPair {
            introducer_port_number: self.introducer_port_number,
            storage_port_number: self.storage_port_number,
        }
    }
}

/// The caller-supplied portion of a record: everything except ports and
/// `active`, which the store assigns. This is the body of `PUT
/// /v1/subscriptions/<id>` (spec §4.C/§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecordDetails {
    pub customer_id: OpaqueId,
    pub product_id: OpaqueId,
    pub customer_email: String,
    pub bucket_name: String,
    #[serde(default)]
    pub old_secrets: serde_json::Value,
}

/// Versioned on-disk/wire envelope: `{"version": 1, "details": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub version: u32,
    pub details: RecordDetailsV1,
}

/// The version-1 on-disk field names (spec §6), distinct from the client
/// facing field names — `id` mirrors `subscription_id` the way the original
/// on-disk format carries both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDetailsV1 {
    pub active: bool,
    pub id: OpaqueId,
    pub bucket_name: String,
    #[serde(rename = "oldsecrets")]
    pub old_secrets: serde_json::Value,
    #[serde(rename = "email")]
    pub customer_email: String,
    pub product_id: OpaqueId,
    pub customer_id: OpaqueId,
    pub subscription_id: OpaqueId,
    pub introducer_port_number: u16,
    pub storage_port_number: u16,
}

impl RecordEnvelope {
    pub fn from_record(record: &Record) -> Self {
        RecordEnvelope {
            version: 1,
            details: RecordDetailsV1 {
                active: record.active,
                id: record.subscription_id.clone(),
                bucket_name: record.bucket_name.clone(),
                old_secrets: record.old_secrets.clone(),
                customer_email: record.customer_email.clone(),
                product_id: record.product_id.clone(),
                customer_id: record.customer_id.clone(),
                subscription_id: record.subscription_id.clone(),
                introducer_port_number: record.introducer_port_number,
                storage_port_number: record.storage_port_number,
            },
        }
    }

    /// Parse a stored/transmitted envelope into a [`Record`], dispatching on
    /// `version` explicitly. An unknown version fails loudly rather than
    /// being coerced into the latest shape.
    pub fn into_record(self) -> Result<Record, StoreError> {
        match self.version {
            1 => Ok(Record {
                subscription_id: self.details.subscription_id,
                customer_id: self.details.customer_id,
                product_id: self.details.product_id,
                customer_email: self.details.customer_email,
                bucket_name: self.details.bucket_name,
                introducer_port_number: self.details.introducer_port_number,
                storage_port_number: self.details.storage_port_number,
                old_secrets: self.details.old_secrets,
                active: self.details.active,
            }),
            other => Err(StoreError::SerializationError(format!(
                "unknown record envelope version: {other}"
            ))),
        }
    }
}
