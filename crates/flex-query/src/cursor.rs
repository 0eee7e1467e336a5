//! Pagination cursors
//!
//! A cursor is the position of the last row of a page: its sort values, its
//! id, and a fingerprint of the sort it was produced under. It is opaque to
//! clients (hex of a small JSON document) and only valid with the same sort.

use crate::error::QueryError;
use flex_model::{PropertyDefinition, PropertyTypeRegistry, RecordId, SortSpec, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

/// Decoded cursor position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// One entry per effective sort key; `None` for absent values
    pub values: Vec<Option<Value>>,
    pub id: RecordId,
}

#[derive(Debug, Serialize, Deserialize)]
struct Token {
    v: Vec<Json>,
    id: RecordId,
    f: String,
}

/// Fingerprint of a requested sort
#[must_use]
pub fn fingerprint(sort: &[SortSpec]) -> String {
    let mut hasher = Sha256::new();
    for spec in sort {
        hasher.update(spec.key.as_str().as_bytes());
        hasher.update(match spec.direction {
            flex_model::SortDirection::Asc => b":asc;",
            flex_model::SortDirection::Desc => b":dsc;",
        });
    }
    hex::encode(&hasher.finalize()[..8])
}

/// Opaque cursor for `position` under `sort`
#[must_use]
pub fn encode(position: &Position, sort: &[SortSpec], registry: &PropertyTypeRegistry) -> String {
    let token = Token {
        v: position
            .values
            .iter()
            .map(|v| v.as_ref().map_or(Json::Null, |v| registry.serialize(v)))
            .collect(),
        id: position.id,
        f: fingerprint(sort),
    };
    // Serializing plain JSON values and a ULID cannot fail
    hex::encode(serde_json::to_vec(&token).unwrap_or_default())
}

/// Decode `cursor`, checking it was issued for `sort`
///
/// `keys` are the definitions of the effective sort keys, in sort order.
pub fn decode(
    cursor: &str,
    sort: &[SortSpec],
    keys: &[&PropertyDefinition],
    registry: &PropertyTypeRegistry,
) -> Result<Position, QueryError> {
    let malformed = || QueryError::invalid("cursor", "malformed cursor");
    let bytes = hex::decode(cursor).map_err(|_| malformed())?;
    let token: Token = serde_json::from_slice(&bytes).map_err(|_| malformed())?;

    if token.f != fingerprint(sort) {
        return Err(QueryError::invalid("cursor", "cursor was issued for a different sort"));
    }
    if token.v.len() != keys.len() {
        return Err(QueryError::invalid("cursor", "cursor no longer matches the table schema"));
    }

    let values = token
        .v
        .iter()
        .zip(keys)
        .map(|(json, def)| {
            if json.is_null() {
                Ok(None)
            } else {
                registry.deserialize(def.property_type, json).map(Some).map_err(|_| malformed())
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Position { values, id: token.id })
}
