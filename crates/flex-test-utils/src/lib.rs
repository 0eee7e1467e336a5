//! Testing utilities for the Flextable workspace
//!
//! Shared fixtures: request contexts, the Expenses table, and an engine
//! running on a manually driven clock.

#![allow(missing_docs)]

use chrono::{DateTime, TimeZone, Utc};
use flex_core::{FlexConfig, FlexTables};
use flex_model::{
    ManualClock, PropertyConfig, PropertyKey, PropertySpec, PropertyType, RecordId, RequestContext, SelectOption,
    TableId,
};
use flex_record::RecordPayload;
use flex_schema::NewTable;
use std::str::FromStr;
use std::sync::Arc;

/// Fixed start instant of every test clock
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

pub fn ctx() -> RequestContext {
    RequestContext::new("ws-1", "alice")
}

/// Second user of the same workspace
pub fn colleague_ctx() -> RequestContext {
    RequestContext::new("ws-1", "bob")
}

/// Caller from a different tenant
pub fn foreign_ctx() -> RequestContext {
    RequestContext::new("ws-2", "mallory")
}

pub fn key(raw: &str) -> PropertyKey {
    PropertyKey::from_str(raw).unwrap()
}

/// JSON object literal as a record payload
pub fn payload(value: serde_json::Value) -> RecordPayload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {other}"),
    }
}

/// `amount` (required number), `category` (select travel/meals/office),
/// `note` (text), `spent_on` (date)
pub fn expenses_table() -> NewTable {
    NewTable::new("Expenses")
        .with_description("Reimbursable expenses")
        .with_property(PropertySpec::new("amount", PropertyType::Number).required())
        .with_property(
            PropertySpec::new("category", PropertyType::Select).with_config(PropertyConfig::options(vec![
                SelectOption::new("travel", "Travel"),
                SelectOption::new("meals", "Meals"),
                SelectOption::new("office", "Office"),
            ])),
        )
        .with_property(PropertySpec::new("note", PropertyType::Text))
        .with_property(PropertySpec::new("spent_on", PropertyType::Date))
}

/// Engine on a [`ManualClock`] starting at [`epoch`]
#[derive(Debug, Clone)]
pub struct TestEngine {
    pub engine: FlexTables,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(FlexConfig::new())
    }

    pub fn with_config(config: FlexConfig) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        let engine = FlexTables::with_clock(config, clock.clone()).unwrap();
        Self { engine, clock }
    }

    /// Create the Expenses table as [`ctx`]
    pub async fn expenses(&self) -> TableId {
        self.engine.create_table(&ctx(), expenses_table()).await.unwrap().id
    }

    /// Insert a record as [`ctx`]
    pub async fn insert(&self, table_id: TableId, data: serde_json::Value) -> RecordId {
        self.engine
            .create_record(&ctx(), table_id, payload(data))
            .await
            .unwrap()
            .id
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
