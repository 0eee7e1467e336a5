//! View state aggregate
//!
//! Presentation overlay of one user on one table. It references columns by
//! key string and rows by id without validating either against the schema;
//! stale references are simply skipped by [`ViewState::layout`].

use chrono::{DateTime, Utc};
use flex_model::{PropertyKey, RecordId, SortSpec};
use flex_schema::Table;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

/// Side a column is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnSide {
    Left,
    Right,
}

/// Edge a row is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSide {
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinnedColumns {
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinnedRows {
    #[serde(default)]
    pub top: Vec<RecordId>,
    #[serde(default)]
    pub bottom: Vec<RecordId>,
}

/// Per-user, per-table presentation state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub pinned_columns: PinnedColumns,
    #[serde(default)]
    pub pinned_rows: PinnedRows,
    #[serde(default)]
    pub hidden_columns: BTreeSet<String>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    /// `None` until the state is first stored
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Mutation of a [`ViewState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ViewCommand {
    PinColumn { key: String, side: ColumnSide },
    UnpinColumn { key: String },
    PinRow { record_id: RecordId, side: RowSide },
    UnpinRow { record_id: RecordId },
    SetColumnVisibility { key: String, visible: bool },
    SetSort { sort: Vec<SortSpec> },
    Reset,
}

impl ViewState {
    /// Apply one command in place
    ///
    /// Pinning to the opposite side moves the item; pinning to the side it
    /// is already on changes nothing.
    pub fn apply(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::PinColumn { key, side } => {
                let (target, other) = match side {
                    ColumnSide::Left => (&mut self.pinned_columns.left, &mut self.pinned_columns.right),
                    ColumnSide::Right => (&mut self.pinned_columns.right, &mut self.pinned_columns.left),
                };
                pin(target, other, key);
            }
            ViewCommand::UnpinColumn { key } => {
                self.pinned_columns.left.retain(|k| k != &key);
                self.pinned_columns.right.retain(|k| k != &key);
            }
            ViewCommand::PinRow { record_id, side } => {
                let (target, other) = match side {
                    RowSide::Top => (&mut self.pinned_rows.top, &mut self.pinned_rows.bottom),
                    RowSide::Bottom => (&mut self.pinned_rows.bottom, &mut self.pinned_rows.top),
                };
                pin(target, other, record_id);
            }
            ViewCommand::UnpinRow { record_id } => {
                self.pinned_rows.top.retain(|id| id != &record_id);
                self.pinned_rows.bottom.retain(|id| id != &record_id);
            }
            ViewCommand::SetColumnVisibility { key, visible } => {
                if visible {
                    self.hidden_columns.remove(&key);
                } else {
                    self.hidden_columns.insert(key);
                }
            }
            ViewCommand::SetSort { sort } => self.sort = sort,
            ViewCommand::Reset => {
                let updated_at = self.updated_at;
                *self = Self {
                    updated_at,
                    ..Self::default()
                };
            }
        }
        self.normalize();
    }

    /// Drop duplicates; an item pinned on both sides keeps its left / top pin
    pub fn normalize(&mut self) {
        dedup(&mut self.pinned_columns.left);
        let left: HashSet<String> = self.pinned_columns.left.iter().cloned().collect();
        self.pinned_columns.right.retain(|k| !left.contains(k));
        dedup(&mut self.pinned_columns.right);

        dedup(&mut self.pinned_rows.top);
        let top: HashSet<RecordId> = self.pinned_rows.top.iter().copied().collect();
        self.pinned_rows.bottom.retain(|id| !top.contains(id));
        dedup(&mut self.pinned_rows.bottom);

        let mut seen = HashSet::new();
        self.sort.retain(|s| seen.insert(s.key.clone()));
    }

    /// Rendered column order for `table`
    ///
    /// Left pins, then unpinned columns in schema order, then right pins.
    /// Hidden columns and keys no longer in the schema are left out.
    #[must_use]
    pub fn layout(&self, table: &Table) -> Vec<PropertyKey> {
        let shown = |key: &str| table.is_live(key) && !self.hidden_columns.contains(key);
        let live_key = |key: &String| table.property(key).map(|def| def.key.clone());

        let left: Vec<PropertyKey> = self
            .pinned_columns
            .left
            .iter()
            .filter(|k| shown(k))
            .filter_map(live_key)
            .collect();
        let right: Vec<PropertyKey> = self
            .pinned_columns
            .right
            .iter()
            .filter(|k| shown(k) && !self.pinned_columns.left.contains(*k))
            .filter_map(live_key)
            .collect();

        let pinned: HashSet<&str> = self
            .pinned_columns
            .left
            .iter()
            .chain(&self.pinned_columns.right)
            .map(String::as_str)
            .collect();
        let middle = table
            .keys()
            .filter(|k| !pinned.contains(k.as_str()) && shown(k.as_str()))
            .cloned();

        left.into_iter().chain(middle).chain(right).collect()
    }

    /// Column side of `key`, if pinned
    #[must_use]
    pub fn column_side(&self, key: &str) -> Option<ColumnSide> {
        if self.pinned_columns.left.iter().any(|k| k == key) {
            Some(ColumnSide::Left)
        } else if self.pinned_columns.right.iter().any(|k| k == key) {
            Some(ColumnSide::Right)
        } else {
            None
        }
    }

    /// Row edge of `id`, if pinned
    #[must_use]
    pub fn row_side(&self, id: RecordId) -> Option<RowSide> {
        if self.pinned_rows.top.contains(&id) {
            Some(RowSide::Top)
        } else if self.pinned_rows.bottom.contains(&id) {
            Some(RowSide::Bottom)
        } else {
            None
        }
    }
}

fn pin<T: PartialEq>(target: &mut Vec<T>, other: &mut Vec<T>, item: T) {
    if target.contains(&item) {
        return;
    }
    other.retain(|x| x != &item);
    target.push(item);
}

fn dedup<T: Eq + Hash + Clone>(items: &mut Vec<T>) {
    let mut seen = HashSet::new();
    items.retain(|x| seen.insert(x.clone()));
}
