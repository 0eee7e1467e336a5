use chrono::{Duration, Utc};
use flex_model::{
    ManualClock, PropertyConfig, PropertySpec, PropertyType, RequestContext, SelectOption, ValidationError, Value,
};
use flex_record::{MemoryRecordRepository, RecordError, RecordPayload, RecordStore};
use flex_schema::{MemoryTableRepository, NewTable, SchemaConflict, SchemaError, SchemaManager, SchemaOp, Table};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

struct Fixture {
    clock: Arc<ManualClock>,
    records: Arc<MemoryRecordRepository>,
    store: RecordStore,
    table: Arc<Table>,
    ctx: RequestContext,
}

async fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let schemas = SchemaManager::new(Arc::new(MemoryTableRepository::new()), clock.clone());
    let records = Arc::new(MemoryRecordRepository::new());
    let store = RecordStore::new(schemas.clone(), records.clone()).with_purge_batch_size(2);
    let ctx = RequestContext::new("ws-1", "alice");

    let table = schemas
        .create_table(
            &ctx,
            NewTable::new("Expenses")
                .with_property(PropertySpec::new("amount", PropertyType::Number).required())
                .with_property(
                    PropertySpec::new("category", PropertyType::Select).with_config(PropertyConfig::options(vec![
                        SelectOption::new("o1", "Travel"),
                        SelectOption::new("o2", "Meals"),
                    ])),
                )
                .with_property(PropertySpec::new("note", PropertyType::Text)),
        )
        .await
        .unwrap();

    Fixture {
        clock,
        records,
        store,
        table,
        ctx,
    }
}

fn payload(value: serde_json::Value) -> RecordPayload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn validation(err: RecordError) -> flex_model::ValidationErrors {
    match err {
        RecordError::Validation(errors) => errors,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn create_coerces_and_stamps() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": "1500", "category": "o1"})))
        .await
        .unwrap();

    assert_eq!(rec.get("amount"), Some(&Value::Number(1500.0)));
    assert_eq!(rec.get("category"), Some(&Value::Select("o1".into())));
    assert_eq!(rec.created_by.as_str(), "alice");
    assert_eq!(rec.schema_version_at_write, 1);
}

#[tokio::test]
async fn create_collects_every_field_error() {
    let f = fixture().await;
    let err = f
        .store
        .create_record(
            &f.ctx,
            f.table.id,
            payload(json!({"category": "o9", "ghost": 1, "note": 5})),
        )
        .await
        .unwrap_err();

    let errors = validation(err);
    assert_eq!(errors.len(), 4);
    assert_eq!(errors.for_field("amount").next(), Some(&ValidationError::MissingRequired));
    assert_eq!(errors.for_field("ghost").next(), Some(&ValidationError::UnknownProperty));
    assert!(matches!(
        errors.for_field("category").next(),
        Some(ValidationError::InvalidOption { .. })
    ));
    assert!(matches!(
        errors.for_field("note").next(),
        Some(ValidationError::TypeMismatch { .. })
    ));
}

#[tokio::test]
async fn null_means_absent() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1, "note": null})))
        .await
        .unwrap();
    assert!(rec.get("note").is_none());

    let err = f
        .store
        .update_record(&f.ctx, rec.id, payload(json!({"amount": null})), rec.updated_at)
        .await
        .unwrap_err();
    assert_eq!(
        validation(err).for_field("amount").next(),
        Some(&ValidationError::MissingRequired)
    );
}

#[tokio::test]
async fn update_merges_and_bumps_token() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1, "note": "draft"})))
        .await
        .unwrap();

    // Same instant: the token still moves forward
    let next = f
        .store
        .update_record(&f.ctx, rec.id, payload(json!({"note": null, "category": "o2"})), rec.updated_at)
        .await
        .unwrap();
    assert!(next.updated_at > rec.updated_at);
    assert_eq!(next.get("amount"), Some(&Value::Number(1.0)));
    assert!(next.get("note").is_none());
    assert_eq!(next.get("category"), Some(&Value::Select("o2".into())));

    let err = f
        .store
        .update_record(&f.ctx, rec.id, payload(json!({"amount": 2})), rec.updated_at)
        .await
        .unwrap_err();
    assert!(err.is_write_conflict());
}

#[tokio::test]
async fn exactly_one_concurrent_update_wins() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1})))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = f.store.clone();
        let ctx = f.ctx.clone();
        let token = rec.updated_at;
        handles.push(tokio::spawn(async move {
            store
                .update_record(&ctx, rec.id, payload(json!({"amount": n})), token)
                .await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert!(e.is_write_conflict(), "unexpected {e:?}"),
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn soft_delete_is_idempotent() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1})))
        .await
        .unwrap();

    let first = f.store.soft_delete(&f.ctx, rec.id).await.unwrap();
    f.clock.advance(Duration::hours(1));
    let second = f.store.soft_delete(&f.ctx, rec.id).await.unwrap();
    assert_eq!(first.deleted_at, second.deleted_at);

    assert!(matches!(
        f.store.get_record(&f.ctx, rec.id, false).await,
        Err(RecordError::NotFound(_))
    ));
    assert!(f.store.get_record(&f.ctx, rec.id, true).await.is_ok());
    assert!(matches!(
        f.store
            .update_record(&f.ctx, rec.id, payload(json!({"amount": 2})), second.updated_at)
            .await,
        Err(RecordError::NotFound(_))
    ));
}

#[tokio::test]
async fn restore_respects_retention() {
    let f = fixture().await;
    let kept = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1})))
        .await
        .unwrap();
    let lost = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 2})))
        .await
        .unwrap();
    f.store.soft_delete(&f.ctx, kept.id).await.unwrap();
    f.store.soft_delete(&f.ctx, lost.id).await.unwrap();

    f.clock.advance(Duration::days(29));
    let restored = f.store.restore(&f.ctx, kept.id).await.unwrap();
    assert!(restored.deleted_at.is_none());
    // Restoring an active record changes nothing
    let again = f.store.restore(&f.ctx, kept.id).await.unwrap();
    assert_eq!(again.updated_at, restored.updated_at);

    f.clock.advance(Duration::days(2));
    assert!(matches!(
        f.store.restore(&f.ctx, lost.id).await,
        Err(RecordError::Expired { .. })
    ));
    assert!(matches!(
        f.store.get_record(&f.ctx, lost.id, true).await,
        Err(RecordError::NotFound(_))
    ));
}

#[tokio::test]
async fn purge_removes_only_expired_records() {
    let f = fixture().await;
    let mut deleted = Vec::new();
    for n in 0..5 {
        let rec = f
            .store
            .create_record(&f.ctx, f.table.id, payload(json!({"amount": n})))
            .await
            .unwrap();
        f.store.soft_delete(&f.ctx, rec.id).await.unwrap();
        deleted.push(rec.id);
    }
    let live = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 9})))
        .await
        .unwrap();

    let (_tx, rx) = watch::channel(false);
    let report = f.store.purge_expired(&rx).await.unwrap();
    assert_eq!(report.purged, 0);

    f.clock.advance(Duration::days(31));
    let report = f.store.purge_expired(&rx).await.unwrap();
    assert_eq!(report.purged, 5);
    assert_eq!(report.batches, 3);
    assert_eq!(f.records.len(), 1);
    assert!(f.store.get_record(&f.ctx, live.id, false).await.is_ok());

    // Running again finds nothing
    let report = f.store.purge_expired(&rx).await.unwrap();
    assert_eq!(report.purged, 0);
}

#[tokio::test]
async fn purge_stops_on_cancel() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1})))
        .await
        .unwrap();
    f.store.soft_delete(&f.ctx, rec.id).await.unwrap();
    f.clock.advance(Duration::days(31));

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let report = f.store.purge_expired(&rx).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.purged, 0);
    assert_eq!(f.records.len(), 1);
}

#[tokio::test]
async fn removed_properties_become_orphans() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1, "note": "keep me"})))
        .await
        .unwrap();

    f.store
        .schemas()
        .update_schema(&f.ctx, f.table.id, 1, &[SchemaOp::RemoveProperty { key: "note".into() }])
        .await
        .unwrap();

    let read = f.store.get_record(&f.ctx, rec.id, false).await.unwrap();
    assert!(read.get("note").is_none());
    assert_eq!(read.orphaned_keys.len(), 1);

    let err = f
        .store
        .update_record(&f.ctx, rec.id, payload(json!({"note": "again"})), read.updated_at)
        .await
        .unwrap_err();
    assert_eq!(
        validation(err).for_field("note").next(),
        Some(&ValidationError::UnknownProperty)
    );
}

#[tokio::test]
async fn archived_tables_reject_writes() {
    let f = fixture().await;
    f.store.schemas().archive_table(&f.ctx, f.table.id).await.unwrap();
    let err = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::Schema(SchemaError::Conflict(SchemaConflict::Archived { .. }))
    ));
}

#[tokio::test]
async fn records_are_scoped_to_workspace() {
    let f = fixture().await;
    let rec = f
        .store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1})))
        .await
        .unwrap();
    let intruder = RequestContext::new("ws-2", "mallory");
    assert!(matches!(
        f.store.get_record(&intruder, rec.id, true).await,
        Err(RecordError::NotFound(_))
    ));
}

#[tokio::test]
async fn oversized_retention_keeps_deleted_records() {
    let f = fixture().await;
    let store = f.store.clone().with_retention(Duration::days(i64::from(u32::MAX)));
    let rec = store
        .create_record(&f.ctx, f.table.id, payload(json!({"amount": 1})))
        .await
        .unwrap();
    store.soft_delete(&f.ctx, rec.id).await.unwrap();
    f.clock.advance(Duration::days(3650));

    let (_, cancel) = watch::channel(false);
    assert_eq!(store.purge_expired(&cancel).await.unwrap().purged, 0);
    let restored = store.restore(&f.ctx, rec.id).await.unwrap();
    assert!(restored.deleted_at.is_none());
}
