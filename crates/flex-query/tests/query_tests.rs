use chrono::{Duration, Utc};
use flex_model::{
    FilterOperator, ManualClock, PropertyConfig, PropertyKey, PropertySpec, PropertyType, RecordId, RequestContext,
    SelectOption, SortSpec, Value,
};
use flex_query::{Filter, Query, QueryEngine, QueryError};
use flex_record::{MemoryRecordRepository, RecordPayload, RecordStore};
use flex_schema::{MemoryTableRepository, NewTable, SchemaManager, SchemaOp, Table};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

struct Fixture {
    clock: Arc<ManualClock>,
    store: RecordStore,
    engine: QueryEngine,
    table: Arc<Table>,
    ctx: RequestContext,
}

async fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let schemas = SchemaManager::new(Arc::new(MemoryTableRepository::new()), clock.clone());
    let store = RecordStore::new(schemas.clone(), Arc::new(MemoryRecordRepository::new()));
    let engine = QueryEngine::new(store.clone()).with_page_sizes(10, 100);
    let ctx = RequestContext::new("ws-1", "alice");

    let table = schemas
        .create_table(
            &ctx,
            NewTable::new("Expenses")
                .with_property(PropertySpec::new("amount", PropertyType::Number))
                .with_property(
                    PropertySpec::new("category", PropertyType::Select).with_config(PropertyConfig::options(vec![
                        SelectOption::new("travel", "Travel"),
                        SelectOption::new("meals", "Meals"),
                    ])),
                )
                .with_property(PropertySpec::new("note", PropertyType::Text)),
        )
        .await
        .unwrap();

    Fixture {
        clock,
        store,
        engine,
        table,
        ctx,
    }
}

fn payload(value: serde_json::Value) -> RecordPayload {
    value.as_object().cloned().unwrap()
}

fn key(k: &str) -> PropertyKey {
    PropertyKey::from_str(k).unwrap()
}

impl Fixture {
    async fn insert(&self, data: serde_json::Value) -> RecordId {
        self.store
            .create_record(&self.ctx, self.table.id, payload(data))
            .await
            .unwrap()
            .id
    }

    async fn run(&self, query: Query) -> Result<flex_query::Page, QueryError> {
        self.engine.query(&self.ctx, self.table.id, query).await
    }
}

fn amounts(page: &flex_query::Page) -> Vec<Option<f64>> {
    page.records
        .iter()
        .map(|r| match r.get("amount") {
            Some(Value::Number(n)) => Some(*n),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn expenses_example() {
    let f = fixture().await;
    f.insert(json!({"amount": 1500, "category": "travel"})).await;
    f.insert(json!({"amount": 40, "category": "meals"})).await;
    f.insert(json!({"amount": 900, "category": "travel"})).await;

    let page = f
        .run(
            Query::new()
                .with_filter(Filter::new("category", FilterOperator::Equals, json!("travel")))
                .with_sort(SortSpec::desc(key("amount"))),
        )
        .await
        .unwrap();
    assert_eq!(amounts(&page), vec![Some(1500.0), Some(900.0)]);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn absent_values_sort_last_both_ways() {
    let f = fixture().await;
    f.insert(json!({"amount": 2})).await;
    f.insert(json!({"note": "no amount"})).await;
    f.insert(json!({"amount": 1})).await;

    let asc = f.run(Query::new().with_sort(SortSpec::asc(key("amount")))).await.unwrap();
    assert_eq!(amounts(&asc), vec![Some(1.0), Some(2.0), None]);

    let desc = f.run(Query::new().with_sort(SortSpec::desc(key("amount")))).await.unwrap();
    assert_eq!(amounts(&desc), vec![Some(2.0), Some(1.0), None]);
}

#[tokio::test]
async fn equal_sort_values_tie_break_on_id() {
    let f = fixture().await;
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(f.insert(json!({"amount": 7})).await);
    }
    ids.sort();

    let page = f.run(Query::new().with_sort(SortSpec::asc(key("amount")))).await.unwrap();
    let got: Vec<RecordId> = page.records.iter().map(|r| r.id).collect();
    assert_eq!(got, ids);
}

#[tokio::test]
async fn removed_keys_match_nothing_and_do_not_sort() {
    let f = fixture().await;
    f.insert(json!({"amount": 1, "note": "x"})).await;
    f.store
        .schemas()
        .update_schema(&f.ctx, f.table.id, 1, &[SchemaOp::RemoveProperty { key: "note".into() }])
        .await
        .unwrap();

    let filtered = f
        .run(Query::new().with_filter(Filter::unary("note", FilterOperator::IsNotEmpty)))
        .await
        .unwrap();
    assert!(filtered.records.is_empty());

    let sorted = f.run(Query::new().with_sort(SortSpec::asc(key("note")))).await.unwrap();
    assert_eq!(sorted.records.len(), 1);
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
    let f = fixture().await;
    let zero = f.run(Query::new().with_limit(0)).await;
    assert!(matches!(zero, Err(QueryError::Invalid { .. })));

    let bad_op = f
        .run(Query::new().with_filter(Filter::new("category", FilterOperator::Range, json!({"gt": "a"}))))
        .await;
    assert!(matches!(bad_op, Err(QueryError::Invalid { .. })));

    let bad_cursor = f.run(Query::new().with_cursor("not-hex")).await;
    assert!(matches!(bad_cursor, Err(QueryError::Invalid { .. })));
}

#[tokio::test]
async fn cursor_is_rejected_under_a_different_sort() {
    let f = fixture().await;
    for n in 0..3 {
        f.insert(json!({"amount": n})).await;
    }
    let first = f
        .run(Query::new().with_sort(SortSpec::asc(key("amount"))).with_limit(1))
        .await
        .unwrap();
    let cursor = first.next_cursor.unwrap();

    let err = f
        .run(Query::new().with_sort(SortSpec::desc(key("amount"))).with_cursor(cursor))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Invalid { ref field, .. } if field == "cursor"));
}

#[tokio::test]
async fn pagination_visits_each_row_once_under_inserts() {
    let f = fixture().await;
    for n in 0..25 {
        f.insert(json!({"amount": n % 7})).await;
    }

    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let mut query = Query::new().with_sort(SortSpec::asc(key("amount"))).with_limit(4);
        query.cursor = cursor.clone();
        let page = f.run(query).await.unwrap();
        for r in &page.records {
            assert!(seen.insert(r.id), "row {} returned twice", r.id);
        }
        pages += 1;
        if pages == 2 {
            // Lands before the cursor position; must not shift later pages
            f.insert(json!({"amount": -1})).await;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(seen.len(), 25);
}

#[tokio::test]
async fn limit_is_clamped() {
    let f = fixture().await;
    for n in 0..12 {
        f.insert(json!({"amount": n})).await;
    }
    let default = f.run(Query::new()).await.unwrap();
    assert_eq!(default.records.len(), 10);
    assert!(default.next_cursor.is_some());

    let clamped = f.run(Query::new().with_limit(10_000)).await.unwrap();
    assert_eq!(clamped.records.len(), 12);
}

#[tokio::test]
async fn unbounded_page_size_does_not_overflow() {
    let f = fixture().await;
    for n in 0..3 {
        f.insert(json!({"amount": n})).await;
    }
    let engine = f.engine.clone().with_page_sizes(usize::MAX, usize::MAX);
    let page = engine
        .query(&f.ctx, f.table.id, Query::new().with_limit(usize::MAX))
        .await
        .unwrap();
    assert_eq!(page.records.len(), 3);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn deleted_rows_need_the_flag_and_expire() {
    let f = fixture().await;
    let gone = f.insert(json!({"amount": 1})).await;
    f.insert(json!({"amount": 2})).await;
    f.store.soft_delete(&f.ctx, gone).await.unwrap();

    assert_eq!(f.run(Query::new()).await.unwrap().records.len(), 1);
    assert_eq!(f.run(Query::new().include_deleted()).await.unwrap().records.len(), 2);

    f.clock.advance(Duration::days(31));
    assert_eq!(f.run(Query::new().include_deleted()).await.unwrap().records.len(), 1);
}

#[tokio::test]
async fn foreign_workspace_cannot_query() {
    let f = fixture().await;
    let other = RequestContext::new("ws-2", "bob");
    assert!(matches!(
        f.engine.query(&other, f.table.id, Query::new()).await,
        Err(QueryError::Record(_))
    ));
}

/// Every row once, in the same order a single unpaged query returns
async fn paged_ids_match_unpaged(rows: Vec<Option<u8>>, page_size: usize) -> Result<(), TestCaseError> {
    let f = fixture().await;
    for amount in &rows {
        match amount {
            Some(n) => f.insert(json!({"amount": n})).await,
            None => f.insert(json!({"note": "no amount"})).await,
        };
    }
    let sorted = || Query::new().with_sort(SortSpec::desc(key("amount")));

    let whole = f.run(sorted().with_limit(100)).await.unwrap();
    prop_assert!(whole.next_cursor.is_none());
    let expected: Vec<RecordId> = whole.records.iter().map(|r| r.id).collect();

    let present: Vec<f64> = amounts_of(&whole).into_iter().flatten().collect();
    prop_assert!(present.windows(2).all(|w| w[0] >= w[1]), "not descending: {:?}", present);

    let mut paged = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut query = sorted().with_limit(page_size);
        query.cursor = cursor.take();
        let page = f.run(query).await.unwrap();
        prop_assert!(page.records.len() <= page_size);
        paged.extend(page.records.iter().map(|r| r.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    prop_assert_eq!(paged, expected);
    Ok(())
}

fn amounts_of(page: &flex_query::Page) -> Vec<Option<f64>> {
    let values = amounts(page);
    // Absent amounts sort after present ones
    if let Some(first_absent) = values.iter().position(Option::is_none) {
        assert!(values[first_absent..].iter().all(Option::is_none));
    }
    values
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn keyset_pagination_is_exhaustive(
        rows in prop::collection::vec(prop::option::weighted(0.8, 0u8..5), 0..30),
        page_size in 1usize..8,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(paged_ids_match_unpaged(rows, page_size))?;
    }
}
