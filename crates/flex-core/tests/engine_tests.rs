use chrono::Duration;
use flex_core::schema::{SchemaConflict, SchemaOp};
use flex_core::view::{ColumnSide, ViewCommand};
use flex_core::{FlexConfig, FlexError, Missing};
use flex_model::{FilterOperator, PropertySpec, PropertyType, RecordId, SortSpec, Value};
use flex_query::{Filter, Query};
use flex_test_utils::{colleague_ctx, ctx, foreign_ctx, key, payload, TestEngine};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::watch;

fn amounts(page: &flex_query::Page) -> Vec<f64> {
    page.records
        .iter()
        .filter_map(|r| match r.get("amount") {
            Some(Value::Number(n)) => Some(*n),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn expenses_end_to_end() {
    let t = TestEngine::new();
    let table = t.expenses().await;

    t.insert(table, json!({"amount": 1500, "category": "travel", "note": "flight"})).await;
    t.insert(table, json!({"amount": "40", "category": "meals"})).await;
    t.insert(table, json!({"amount": 900, "category": "travel", "spent_on": "2024-01-10"})).await;

    let page = t
        .engine
        .query(
            &ctx(),
            table,
            Query::new()
                .with_filter(Filter::new("category", FilterOperator::Equals, json!("travel")))
                .with_sort(SortSpec::desc(key("amount"))),
        )
        .await
        .unwrap();
    assert_eq!(amounts(&page), vec![1500.0, 900.0]);
    assert!(page.next_cursor.is_none());

    let err = t
        .engine
        .create_record(&ctx(), table, payload(json!({"category": "travel"})))
        .await
        .unwrap_err();
    match err {
        FlexError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.iter().next().unwrap().field, "amount");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn rename_keeps_key_and_key_change_is_rejected() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    let record = t.insert(table, json!({"amount": 5, "note": "taxi"})).await;

    let renamed = t
        .engine
        .update_schema(
            &ctx(),
            table,
            1,
            &[SchemaOp::RenameProperty {
                key: "note".into(),
                display_name: "Memo".into(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(renamed.schema_version, 2);
    assert_eq!(renamed.property("note").unwrap().display_name, "Memo");

    let read = t.engine.get_record(&ctx(), record, false).await.unwrap();
    assert_eq!(read.get("note"), Some(&Value::Text("taxi".into())));

    let err = t
        .engine
        .update_schema(
            &ctx(),
            table,
            2,
            &[SchemaOp::ChangeKey {
                key: "note".into(),
                new_key: "memo".into(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlexError::SchemaConflict(SchemaConflict::KeyImmutable { .. })));
    assert_eq!(t.engine.get_table(&ctx(), table).await.unwrap().schema_version, 2);
}

#[tokio::test]
async fn stale_schema_version_conflicts() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    let add = |name: &str| SchemaOp::AddProperty {
        property: PropertySpec::new(name, PropertyType::Checkbox),
    };

    t.engine.update_schema(&ctx(), table, 1, &[add("billable")]).await.unwrap();
    let err = t
        .engine
        .update_schema(&colleague_ctx(), table, 1, &[add("reimbursed")])
        .await
        .unwrap_err();

    assert!(err.is_retryable_after_reload());
    assert!(matches!(
        err,
        FlexError::SchemaConflict(SchemaConflict::StaleVersion { expected: 1, actual: 2 })
    ));
}

#[tokio::test]
async fn orphaned_values_survive_and_stay_hidden() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    let record = t.insert(table, json!({"amount": 12, "note": "parking"})).await;

    t.engine
        .update_schema(&ctx(), table, 1, &[SchemaOp::RemoveProperty { key: "note".into() }])
        .await
        .unwrap();

    let read = t.engine.get_record(&ctx(), record, false).await.unwrap();
    assert_eq!(read.get("note"), None);
    assert_eq!(read.orphaned_keys, vec![key("note")]);

    let err = t
        .engine
        .update_record(&ctx(), record, payload(json!({"note": "x"})), read.updated_at)
        .await
        .unwrap_err();
    assert!(matches!(err, FlexError::Validation(_)));

    // Removed keys are retired, not free for reuse
    let err = t
        .engine
        .update_schema(
            &ctx(),
            table,
            2,
            &[SchemaOp::AddProperty {
                property: PropertySpec::new("note", PropertyType::Text),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlexError::SchemaConflict(SchemaConflict::RetiredKey { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_winner_among_concurrent_updates() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    let created = t
        .engine
        .create_record(&ctx(), table, payload(json!({"amount": 1})))
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let engine = t.engine.clone();
            let token = created.updated_at;
            tokio::spawn(async move {
                engine
                    .update_record(&ctx(), created.id, payload(json!({"amount": n})), token)
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert!(matches!(e, FlexError::WriteConflict { .. }), "unexpected {e:?}"),
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn retention_window_bounds_restore() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    let early = t.insert(table, json!({"amount": 1})).await;
    let late = t.insert(table, json!({"amount": 2})).await;

    t.engine.delete_record(&ctx(), early).await.unwrap();
    t.engine.delete_record(&ctx(), late).await.unwrap();

    t.clock.advance(Duration::days(29));
    let restored = t.engine.restore_record(&ctx(), early).await.unwrap();
    assert!(restored.deleted_at.is_none());

    t.clock.advance(Duration::days(2));
    let err = t.engine.restore_record(&ctx(), late).await.unwrap_err();
    assert!(err.is_terminal());
    assert!(matches!(err, FlexError::Expired { record_id, .. } if record_id == late));

    let err = t.engine.get_record(&ctx(), late, true).await.unwrap_err();
    assert!(matches!(err, FlexError::NotFound(Missing::Record(_))));
}

#[tokio::test]
async fn retention_is_configurable() {
    let t = TestEngine::with_config(FlexConfig::new().with_retention_days(7));
    let table = t.expenses().await;
    let record = t.insert(table, json!({"amount": 1})).await;
    t.engine.delete_record(&ctx(), record).await.unwrap();

    t.clock.advance(Duration::days(8));
    assert!(matches!(
        t.engine.restore_record(&ctx(), record).await,
        Err(FlexError::Expired { .. })
    ));
}

#[tokio::test]
async fn purge_is_idempotent() {
    let t = TestEngine::with_config(FlexConfig::new().with_purge_batch_size(2));
    let table = t.expenses().await;
    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(t.insert(table, json!({"amount": n})).await);
    }
    for id in &ids[..3] {
        t.engine.delete_record(&ctx(), *id).await.unwrap();
    }
    t.clock.advance(Duration::days(31));

    let (_tx, rx) = watch::channel(false);
    let first = t.engine.purge_expired(&rx).await.unwrap();
    assert_eq!(first.purged, 3);
    let second = t.engine.purge_expired(&rx).await.unwrap();
    assert_eq!(second.purged, 0);

    let left = t.engine.query(&ctx(), table, Query::new().include_deleted()).await.unwrap();
    assert_eq!(left.records.len(), 2);
}

#[tokio::test]
async fn sort_is_stable_across_reads() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    let mut ids: Vec<RecordId> = Vec::new();
    for _ in 0..6 {
        ids.push(t.insert(table, json!({"amount": 10, "category": "office"})).await);
    }
    ids.sort();

    let query = Query::new()
        .with_sort(SortSpec::asc(key("category")))
        .with_sort(SortSpec::desc(key("amount")));
    for _ in 0..3 {
        let page = t.engine.query(&ctx(), table, query.clone()).await.unwrap();
        let got: Vec<RecordId> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(got, ids);
    }
}

#[tokio::test]
async fn cursor_pagination_covers_every_row_once() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    for n in 0..17 {
        t.insert(table, json!({"amount": n % 4})).await;
    }

    let mut seen = HashSet::new();
    let mut cursor = None;
    loop {
        let mut query = Query::new().with_sort(SortSpec::desc(key("amount"))).with_limit(5);
        query.cursor = cursor.take();
        let page = t.engine.query(&ctx(), table, query).await.unwrap();
        for record in &page.records {
            assert!(seen.insert(record.id));
        }
        // Sorts ahead of the cursor, so later pages must not shift
        t.insert(table, json!({"amount": 100})).await;
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(seen.len(), 17);
}

#[tokio::test]
async fn view_state_is_private_and_never_pins_twice() {
    let t = TestEngine::new();
    let table = t.expenses().await;

    let pin = |side| ViewCommand::PinColumn {
        key: "note".into(),
        side,
    };
    t.engine.apply_view_command(&ctx(), table, pin(ColumnSide::Left)).await.unwrap();
    let state = t
        .engine
        .apply_view_command(&ctx(), table, pin(ColumnSide::Right))
        .await
        .unwrap();
    assert!(state.pinned_columns.left.is_empty());
    assert_eq!(state.pinned_columns.right, vec!["note".to_string()]);

    let layout = t.engine.layout(&ctx(), table).await.unwrap();
    assert_eq!(layout.last(), Some(&key("note")));

    let other = t.engine.view_state(&colleague_ctx(), table).await.unwrap();
    assert!(other.pinned_columns.right.is_empty());
}

#[tokio::test]
async fn case_insensitive_keys_fold_to_lowercase() {
    let t = TestEngine::with_config(FlexConfig::new().with_case_insensitive_keys(true));
    let table = t.expenses().await;
    let record = t
        .engine
        .create_record(&ctx(), table, payload(json!({"Amount": 3, "CATEGORY": "meals"})))
        .await
        .unwrap();
    assert_eq!(record.get("amount"), Some(&Value::Number(3.0)));
    assert_eq!(record.get("category"), Some(&Value::Select("meals".into())));
}

#[tokio::test]
async fn case_insensitive_keys_apply_to_sort() {
    let t = TestEngine::with_config(FlexConfig::new().with_case_insensitive_keys(true));
    let table = t.expenses().await;
    for amount in [5, 30, 12] {
        t.insert(table, json!({"amount": amount})).await;
    }

    let query: Query = serde_json::from_value(json!({
        "filters": [{"key": "Amount", "op": "range", "value": {"gte": 10}}],
        "sort": [{"key": "Amount", "direction": "desc"}]
    }))
    .unwrap();
    let page = t.engine.query(&ctx(), table, query).await.unwrap();
    assert_eq!(amounts(&page), vec![30.0, 12.0]);

    // Cursors issued for `Amount` continue a query sorted by `amount`
    let first = t
        .engine
        .query(&ctx(), table, Query::new().with_sort(SortSpec::asc("Amount")).with_limit(1))
        .await
        .unwrap();
    let rest = t
        .engine
        .query(
            &ctx(),
            table,
            Query::new()
                .with_sort(SortSpec::asc("amount"))
                .with_cursor(first.next_cursor.clone().unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(amounts(&first), vec![5.0]);
    assert_eq!(amounts(&rest), vec![12.0, 30.0]);
}

#[tokio::test]
async fn negative_zero_operands_match_zero() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    t.insert(table, json!({"amount": 0})).await;
    t.insert(table, json!({"amount": 1})).await;

    for filter in [
        Filter::new("amount", FilterOperator::Equals, json!(-0.0)),
        Filter::new("amount", FilterOperator::Range, json!({"lte": "-0"})),
    ] {
        let page = t.engine.query(&ctx(), table, Query::new().with_filter(filter.clone())).await.unwrap();
        assert_eq!(amounts(&page), vec![0.0], "{filter:?}");
    }
}

#[tokio::test]
async fn tenants_are_isolated() {
    let t = TestEngine::new();
    let table = t.expenses().await;
    let record = t.insert(table, json!({"amount": 1})).await;

    assert!(t.engine.list_tables(&foreign_ctx(), true).await.unwrap().is_empty());
    assert!(matches!(
        t.engine.get_table(&foreign_ctx(), table).await,
        Err(FlexError::NotFound(Missing::Table(_)))
    ));
    assert!(t.engine.get_record(&foreign_ctx(), record, false).await.unwrap_err().is_terminal());
    assert!(t.engine.query(&foreign_ctx(), table, Query::new()).await.is_err());
}
