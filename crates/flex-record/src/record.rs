//! Records and their lifecycle
//!
//! Stored data is untyped JSON keyed by property key. It only becomes typed
//! when resolved through the owning table's current schema, see
//! [`ResolvedRecord::resolve`].
//!
//! # Lifecycle
//!
//! ```text
//! Active --soft_delete--> SoftDeleted --retention elapses--> Expired --purge--> (gone)
//!    ^                         |
//!    +--------restore----------+
//! ```

use chrono::{DateTime, Duration, Utc};
use flex_model::{PropertyKey, PropertyTypeRegistry, RecordId, TableId, UserId, Value};
use flex_schema::Table;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stored cell data, untyped
pub type RecordData = BTreeMap<PropertyKey, serde_json::Value>;

/// Lifecycle state of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Active,
    /// Deleted, still restorable
    SoftDeleted { deleted_at: DateTime<Utc> },
    /// Deleted longer than the retention window; awaiting purge
    Expired { deleted_at: DateTime<Utc> },
}

impl RecordState {
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Readable with the include-deleted flag
    #[inline]
    #[must_use]
    pub fn is_visible(&self, include_deleted: bool) -> bool {
        match self {
            Self::Active => true,
            Self::SoftDeleted { .. } => include_deleted,
            Self::Expired { .. } => false,
        }
    }
}

/// One row of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub table_id: TableId,
    pub data: RecordData,
    pub created_at: DateTime<Utc>,
    /// Strictly increasing; doubles as the optimistic-concurrency token
    pub updated_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_by: UserId,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub schema_version_at_write: u64,
}

impl Record {
    /// Lifecycle state given the oldest `deleted_at` still inside retention
    #[must_use]
    pub fn state(&self, cutoff: DateTime<Utc>) -> RecordState {
        match self.deleted_at {
            None => RecordState::Active,
            Some(deleted_at) if deleted_at < cutoff => RecordState::Expired { deleted_at },
            Some(deleted_at) => RecordState::SoftDeleted { deleted_at },
        }
    }

    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Soft-deleted and past `cutoff`
    #[inline]
    #[must_use]
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.deleted_at.is_some_and(|d| d < cutoff)
    }

    /// Copy stamped as written by `by` at `now`
    #[must_use]
    pub fn touched(&self, by: &UserId, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.updated_at = next_stamp(self.updated_at, now);
        next.updated_by = by.clone();
        next
    }
}

/// Next `updated_at` after `previous`, never equal to it
#[must_use]
pub fn next_stamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Record with values typed through the current schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRecord {
    pub id: RecordId,
    pub table_id: TableId,
    /// Live properties that hold a value, in schema order; `data` on the
    /// wire, matching write payloads
    #[serde(rename = "data")]
    pub values: IndexMap<PropertyKey, Value>,
    /// Stored keys no longer in the live schema
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphaned_keys: Vec<PropertyKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_by: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub schema_version_at_write: u64,
}

impl ResolvedRecord {
    /// Type the stored data through `table`'s live properties
    ///
    /// Orphaned keys are listed, never decoded. A stored value that no longer
    /// decodes is skipped with a warning.
    #[must_use]
    pub fn resolve(record: &Record, table: &Table, registry: &PropertyTypeRegistry) -> Self {
        let mut values = IndexMap::new();
        for def in table.properties.values() {
            let Some(stored) = record.data.get(&def.key) else {
                continue;
            };
            match registry.deserialize(def.property_type, stored) {
                Ok(value) => {
                    values.insert(def.key.clone(), value);
                }
                Err(e) => {
                    tracing::warn!("Skipping undecodable value {}.{} of record {}: {}", table.id, def.key, record.id, e);
                }
            }
        }

        let orphaned_keys = record
            .data
            .keys()
            .filter(|k| !table.is_live(k.as_str()))
            .cloned()
            .collect();

        Self {
            id: record.id,
            table_id: record.table_id,
            values,
            orphaned_keys,
            created_at: record.created_at,
            updated_at: record.updated_at,
            created_by: record.created_by.clone(),
            updated_by: record.updated_by.clone(),
            deleted_at: record.deleted_at,
            schema_version_at_write: record.schema_version_at_write,
        }
    }

    /// Typed value of a live property
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}
