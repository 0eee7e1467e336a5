//! Record store
//!
//! Validates writes against the table's *current* schema and persists them
//! through a [`RecordRepository`]. Every write to an existing record is a
//! compare-and-set on `updated_at`.

use crate::error::RecordError;
use crate::record::{Record, RecordData, RecordState, ResolvedRecord};
use crate::repository::{RecordRepository, WriteOutcome};
use chrono::{DateTime, Duration, Utc};
use flex_model::{PropertyKey, RecordId, RequestContext, TableId, ValidationError, ValidationErrors};
use flex_schema::{SchemaConflict, SchemaError, SchemaManager, Table};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use tokio::sync::watch;

/// Default soft-delete retention
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Default rows per purge batch
pub const DEFAULT_PURGE_BATCH_SIZE: usize = 500;

/// Attempts for internal read-modify-write loops (soft delete, restore)
const MAX_CAS_ATTEMPTS: usize = 8;

/// Raw client payload: property key to JSON value, `null` meaning absent
pub type RecordPayload = Map<String, Json>;

/// Outcome of one purge sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    /// Rows hard-deleted
    pub purged: usize,
    /// Candidates that were restored or already gone when reached
    pub skipped: usize,
    pub batches: usize,
    /// Sweep stopped on the cancellation signal
    pub cancelled: bool,
}

/// Record CRUD, soft-delete, restore and purge
#[derive(Debug, Clone)]
pub struct RecordStore {
    schemas: SchemaManager,
    repo: Arc<dyn RecordRepository>,
    retention: Duration,
    purge_batch_size: usize,
}

impl RecordStore {
    pub fn new(schemas: SchemaManager, repo: Arc<dyn RecordRepository>) -> Self {
        Self {
            schemas,
            repo,
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            purge_batch_size: DEFAULT_PURGE_BATCH_SIZE,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_purge_batch_size(mut self, size: usize) -> Self {
        self.purge_batch_size = size.max(1);
        self
    }

    #[inline]
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    #[inline]
    #[must_use]
    pub fn schemas(&self) -> &SchemaManager {
        &self.schemas
    }

    #[inline]
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn RecordRepository> {
        &self.repo
    }

    /// Oldest `deleted_at` still inside the retention window
    ///
    /// A window reaching past the earliest representable instant keeps
    /// every deleted record.
    #[inline]
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.retention).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Validate `payload` against the live schema and store a new record
    ///
    /// # Errors
    /// - `Validation` with every unknown key, bad value and missing required property
    /// - `Schema` if the table is not visible or is archived
    pub async fn create_record(
        &self,
        ctx: &RequestContext,
        table_id: TableId,
        payload: RecordPayload,
    ) -> Result<ResolvedRecord, RecordError> {
        let table = self.writable_table(ctx, table_id).await?;

        let mut errors = ValidationErrors::new();
        let mut data = RecordData::new();
        for (key, value) in self.validate_fields(&table, payload, &mut errors) {
            if let Some(value) = value {
                data.insert(key, value);
            }
        }
        for def in table.required_properties() {
            let reported = errors.for_field(def.key.as_str()).next().is_some();
            if !data.contains_key(&def.key) && !reported {
                errors.push(def.key.as_str(), ValidationError::MissingRequired);
            }
        }
        errors.into_result(())?;

        let now = self.schemas.clock().now();
        let record = Record {
            id: RecordId::new(),
            table_id,
            data,
            created_at: now,
            updated_at: now,
            created_by: ctx.user_id.clone(),
            updated_by: ctx.user_id.clone(),
            deleted_at: None,
            schema_version_at_write: table.schema_version,
        };
        self.repo.insert(record.clone()).await?;

        tracing::info!("Created record {} in table {}", record.id, table_id);
        Ok(self.resolve(&record, &table))
    }

    /// Read a record through the current schema
    ///
    /// Soft-deleted records need `include_deleted`; records past retention
    /// read as `NotFound` even before the purge removes them.
    pub async fn get_record(
        &self,
        ctx: &RequestContext,
        id: RecordId,
        include_deleted: bool,
    ) -> Result<ResolvedRecord, RecordError> {
        let (record, table) = self.load(ctx, id).await?;
        let cutoff = self.cutoff(self.schemas.clock().now());
        if !record.state(cutoff).is_visible(include_deleted) {
            return Err(RecordError::NotFound(id));
        }
        Ok(self.resolve(&record, &table))
    }

    /// Merge `partial` into the record if it is still at `expected_updated_at`
    ///
    /// Only supplied keys are validated; `null` clears a key.
    ///
    /// # Errors
    /// - `WriteConflict` if the record changed since `expected_updated_at`
    /// - `NotFound` for soft-deleted records
    /// - `Validation` for unknown keys, bad values and cleared required keys
    pub async fn update_record(
        &self,
        ctx: &RequestContext,
        id: RecordId,
        partial: RecordPayload,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<ResolvedRecord, RecordError> {
        let (record, table) = self.load(ctx, id).await?;
        if record.is_deleted() {
            return Err(RecordError::NotFound(id));
        }
        ensure_writable(&table)?;
        if record.updated_at != expected_updated_at {
            return Err(RecordError::WriteConflict {
                record_id: id,
                expected: expected_updated_at,
                actual: record.updated_at,
            });
        }

        let mut errors = ValidationErrors::new();
        let fields = self.validate_fields(&table, partial, &mut errors);
        errors.into_result(())?;

        let mut next = record.touched(&ctx.user_id, self.schemas.clock().now());
        for (key, value) in fields {
            match value {
                Some(value) => next.data.insert(key, value),
                None => next.data.remove(&key),
            };
        }
        next.schema_version_at_write = table.schema_version;

        self.write(next.clone(), expected_updated_at).await?;
        tracing::info!("Updated record {} of table {}", id, table.id);
        Ok(self.resolve(&next, &table))
    }

    /// Mark a record deleted; already-deleted records keep their timestamp
    pub async fn soft_delete(&self, ctx: &RequestContext, id: RecordId) -> Result<ResolvedRecord, RecordError> {
        let step = |record: &Record, now: DateTime<Utc>| match record.state(self.cutoff(now)) {
            RecordState::Active => {
                let mut next = record.touched(&ctx.user_id, now);
                next.deleted_at = Some(now);
                Ok(Some(next))
            }
            RecordState::SoftDeleted { .. } => Ok(None),
            RecordState::Expired { .. } => Err(RecordError::NotFound(id)),
        };

        let record = self.transition(ctx, id, step).await?;
        tracing::info!("Soft-deleted record {} (deleted at {:?})", record.id, record.deleted_at);
        Ok(record)
    }

    /// Undo a soft delete within the retention window
    ///
    /// Restoring an active record is a no-op.
    ///
    /// # Errors
    /// `Expired` once `now - deleted_at` exceeds the retention window
    pub async fn restore(&self, ctx: &RequestContext, id: RecordId) -> Result<ResolvedRecord, RecordError> {
        let step = |record: &Record, now: DateTime<Utc>| match record.state(self.cutoff(now)) {
            RecordState::Active => Ok(None),
            RecordState::SoftDeleted { .. } => {
                let mut next = record.touched(&ctx.user_id, now);
                next.deleted_at = None;
                Ok(Some(next))
            }
            RecordState::Expired { deleted_at } => Err(RecordError::Expired {
                record_id: id,
                deleted_at,
            }),
        };

        let record = self.transition(ctx, id, step).await?;
        tracing::info!("Restored record {}", record.id);
        Ok(record)
    }

    /// Hard-delete records soft-deleted longer than the retention window
    ///
    /// Runs batches of `purge_batch_size` until a batch comes back short or
    /// removes nothing, checking `cancel` before each batch.
    pub async fn purge_expired(&self, cancel: &watch::Receiver<bool>) -> Result<PurgeReport, RecordError> {
        let mut report = PurgeReport::default();
        loop {
            if *cancel.borrow() {
                report.cancelled = true;
                break;
            }

            let cutoff = self.cutoff(self.schemas.clock().now());
            let ids = self.repo.expired_ids(cutoff, self.purge_batch_size).await?;
            if ids.is_empty() {
                break;
            }

            let mut purged = 0;
            for id in &ids {
                if self.repo.purge_if_expired(*id, cutoff).await? {
                    purged += 1;
                } else {
                    report.skipped += 1;
                }
            }
            report.purged += purged;
            report.batches += 1;
            tracing::debug!("Purge batch {}: {} of {} removed", report.batches, purged, ids.len());

            if ids.len() < self.purge_batch_size || purged == 0 {
                break;
            }
        }

        if report.purged > 0 || report.cancelled {
            tracing::info!(
                "Purged {} expired records in {} batches (cancelled: {})",
                report.purged,
                report.batches,
                report.cancelled
            );
        }
        Ok(report)
    }

    /// Every record of a visible table, with the table snapshot they resolve against
    pub async fn scan(&self, ctx: &RequestContext, table_id: TableId) -> Result<(Arc<Table>, Vec<Record>), RecordError> {
        let table = self.schemas.get_table(ctx, table_id).await?;
        let records = self.repo.scan(table_id).await?;
        Ok((table, records))
    }

    /// Type a stored record through `table`
    #[must_use]
    pub fn resolve(&self, record: &Record, table: &Table) -> ResolvedRecord {
        ResolvedRecord::resolve(record, table, self.schemas.registry())
    }

    /// Read-compute-CAS loop for state transitions that must not lose races
    ///
    /// `step` returns `None` when the record is already in the target state.
    async fn transition<F>(&self, ctx: &RequestContext, id: RecordId, step: F) -> Result<ResolvedRecord, RecordError>
    where
        F: Fn(&Record, DateTime<Utc>) -> Result<Option<Record>, RecordError>,
    {
        let mut last_actual = None;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let (record, table) = self.load(ctx, id).await?;
            let now = self.schemas.clock().now();
            let Some(next) = step(&record, now)? else {
                return Ok(self.resolve(&record, &table));
            };
            ensure_writable(&table)?;

            match self.repo.compare_and_set(next.clone(), record.updated_at).await? {
                WriteOutcome::Written => return Ok(self.resolve(&next, &table)),
                WriteOutcome::Missing => return Err(RecordError::NotFound(id)),
                WriteOutcome::Stale { actual } => {
                    tracing::debug!("Record {} changed under transition, retrying", id);
                    last_actual = Some((record.updated_at, actual));
                }
            }
        }

        let (expected, actual) = last_actual.unwrap_or_default();
        Err(RecordError::WriteConflict {
            record_id: id,
            expected,
            actual,
        })
    }

    async fn write(&self, next: Record, expected_updated_at: DateTime<Utc>) -> Result<(), RecordError> {
        let id = next.id;
        match self.repo.compare_and_set(next, expected_updated_at).await? {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::Stale { actual } => Err(RecordError::WriteConflict {
                record_id: id,
                expected: expected_updated_at,
                actual,
            }),
            WriteOutcome::Missing => Err(RecordError::NotFound(id)),
        }
    }

    /// Record plus its table, scoped to the caller's workspace
    async fn load(&self, ctx: &RequestContext, id: RecordId) -> Result<(Record, Arc<Table>), RecordError> {
        let record = self.repo.get(id).await?.ok_or(RecordError::NotFound(id))?;
        match self.schemas.get_table(ctx, record.table_id).await {
            Ok(table) => Ok((record, table)),
            Err(SchemaError::NotFound(_)) => Err(RecordError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn writable_table(&self, ctx: &RequestContext, table_id: TableId) -> Result<Arc<Table>, RecordError> {
        let table = self.schemas.get_table(ctx, table_id).await?;
        ensure_writable(&table)?;
        Ok(table)
    }

    /// Normalize keys and validate values; `None` marks a key to clear
    ///
    /// Problems are pushed to `errors`; only valid fields are returned.
    fn validate_fields(
        &self,
        table: &Table,
        payload: RecordPayload,
        errors: &mut ValidationErrors,
    ) -> Vec<(PropertyKey, Option<Json>)> {
        let registry = self.schemas.registry();
        let policy = self.schemas.key_policy();
        let mut fields: Vec<(PropertyKey, Option<Json>)> = Vec::with_capacity(payload.len());

        for (raw_key, raw) in payload {
            let key = match policy.normalize(&raw_key) {
                Ok(key) => key,
                Err(e) => {
                    errors.push(raw_key, e);
                    continue;
                }
            };
            let Some(def) = table.property(key.as_str()) else {
                errors.push(raw_key, ValidationError::UnknownProperty);
                continue;
            };
            if fields.iter().any(|(k, _)| k == &key) {
                errors.push(
                    raw_key,
                    ValidationError::InvalidKey {
                        reason: format!("duplicates key '{key}'"),
                    },
                );
                continue;
            }

            if raw.is_null() {
                if def.required {
                    errors.push(key.as_str(), ValidationError::MissingRequired);
                } else {
                    fields.push((key, None));
                }
                continue;
            }

            match registry.validate(def, &raw) {
                Ok(value) => fields.push((key, Some(registry.serialize(&value)))),
                Err(e) => errors.push(key.as_str(), e),
            }
        }
        fields
    }
}

fn ensure_writable(table: &Table) -> Result<(), RecordError> {
    if table.is_archived() {
        return Err(SchemaError::from(SchemaConflict::Archived { table_id: table.id }).into());
    }
    Ok(())
}
