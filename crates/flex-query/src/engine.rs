//! Query engine
//!
//! Evaluation order: visibility (deleted / expired), filters, sort, cursor,
//! limit. Sorting runs through the registry comparators; absent values sort
//! after present ones in either direction, and the record id breaks ties so
//! every row has exactly one position.

use crate::cursor::{self, Position};
use crate::error::QueryError;
use crate::filter::{Filter, Predicate};
use flex_model::{KeyPolicy, PropertyDefinition, PropertyTypeRegistry, RequestContext, SortDirection, SortSpec, TableId};
use flex_record::{RecordStore, ResolvedRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default rows per page
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound for `limit`
pub const MAX_PAGE_SIZE: usize = 500;

/// Query over one table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl Query {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub records: Vec<ResolvedRecord>,
    /// Present when more rows follow
    pub next_cursor: Option<String>,
}

/// Filter / sort / paginate over a table's records
#[derive(Debug, Clone)]
pub struct QueryEngine {
    records: RecordStore,
    default_page_size: usize,
    max_page_size: usize,
}

impl QueryEngine {
    pub fn new(records: RecordStore) -> Self {
        Self {
            records,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Page size bounds; `default` is clamped into `1..=max`
    #[inline]
    #[must_use]
    pub fn with_page_sizes(mut self, default: usize, max: usize) -> Self {
        self.max_page_size = max.max(1);
        self.default_page_size = default.clamp(1, self.max_page_size);
        self
    }

    /// Run `query` against `table_id`
    ///
    /// # Errors
    /// - `Invalid` for disallowed operators, undecodable operands, bad cursors, `limit == 0`
    /// - `Record(Schema(NotFound))` if the table is not visible to the caller
    pub async fn query(&self, ctx: &RequestContext, table_id: TableId, query: Query) -> Result<Page, QueryError> {
        let limit = self.page_size(query.limit)?;
        let (table, rows) = self.records.scan(ctx, table_id).await?;
        let registry = self.records.schemas().registry();
        let policy = self.records.schemas().key_policy();

        let predicates = query
            .filters
            .iter()
            .enumerate()
            .map(|(i, f)| Predicate::compile(f, i, &table, registry, policy))
            .collect::<Result<Vec<_>, _>>()?;

        let sort: Vec<SortSpec> = query.sort.iter().map(|s| resolve_sort_key(s, policy)).collect();

        // Sort keys no longer in the schema are ignored
        let order: Vec<(&PropertyDefinition, SortDirection)> = sort
            .iter()
            .filter_map(|s| table.property(s.key.as_str()).map(|def| (def, s.direction)))
            .collect();
        let keys: Vec<&PropertyDefinition> = order.iter().map(|(def, _)| *def).collect();

        let after = query
            .cursor
            .as_deref()
            .map(|c| cursor::decode(c, &sort, &keys, registry))
            .transpose()?;

        let cutoff = self.records.cutoff(self.records.schemas().clock().now());
        let mut matched: Vec<(Position, ResolvedRecord)> = rows
            .iter()
            .filter(|r| r.state(cutoff).is_visible(query.include_deleted))
            .map(|r| self.records.resolve(r, &table))
            .filter(|r| predicates.iter().all(|p| p.matches(r, registry)))
            .map(|r| (position_of(&r, &keys), r))
            .collect();
        let total = matched.len();

        matched.sort_by(|(a, _), (b, _)| compare_rows(a, b, &order, registry));

        let mut page: Vec<(Position, ResolvedRecord)> = matched
            .into_iter()
            .filter(|(pos, _)| {
                after
                    .as_ref()
                    .map_or(true, |after| compare_rows(pos, after, &order, registry) == Ordering::Greater)
            })
            .take(limit.saturating_add(1))
            .collect();

        let next_cursor = if page.len() > limit {
            page.truncate(limit);
            page.last()
                .map(|(pos, _)| cursor::encode(pos, &sort, registry))
        } else {
            None
        };
        let records: Vec<ResolvedRecord> = page.into_iter().map(|(_, r)| r).collect();

        tracing::debug!(
            "Query on table {}: {} filters, {} matched, {} returned",
            table_id,
            predicates.len(),
            total,
            records.len()
        );
        Ok(Page { records, next_cursor })
    }

    fn page_size(&self, requested: Option<usize>) -> Result<usize, QueryError> {
        match requested {
            None => Ok(self.default_page_size),
            Some(0) => Err(QueryError::invalid("limit", "limit must be at least 1")),
            Some(n) => Ok(n.min(self.max_page_size)),
        }
    }
}

/// `spec` with its key folded under `policy`; keys the policy rejects are
/// kept verbatim and later match no property
fn resolve_sort_key(spec: &SortSpec, policy: KeyPolicy) -> SortSpec {
    let key = policy.normalize(&spec.key).map_or_else(|_| spec.key.clone(), String::from);
    SortSpec {
        key,
        direction: spec.direction,
    }
}

fn position_of(record: &ResolvedRecord, keys: &[&PropertyDefinition]) -> Position {
    Position {
        values: keys.iter().map(|def| record.get(def.key.as_str()).cloned()).collect(),
        id: record.id,
    }
}

/// Total order of two row positions under `order`, id ascending last
fn compare_rows(
    a: &Position,
    b: &Position,
    order: &[(&PropertyDefinition, SortDirection)],
    registry: &PropertyTypeRegistry,
) -> Ordering {
    for (i, (def, direction)) in order.iter().enumerate() {
        let ord = match (&a.values[i], &b.values[i]) {
            (Some(x), Some(y)) => {
                let ord = registry.compare(def, x, y);
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}
