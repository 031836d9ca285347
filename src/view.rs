//! Transient view state over an aggregated report and the function that applies it.
//!
//! Filtering, sorting and collapsing only ever touch data rows and whole groups; the
//! structural rows (header, subtotal, grand total) are never reordered.

use crate::engine::{group_keys, AggregatedRow};
use crate::schema::{ColumnDef, GroupKey, ReportLayout};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Narrowest width a column can be resized to, in pixels.
pub const MIN_COLUMN_WIDTH: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub search_query: String,
    pub sort: Option<SortSpec>,
    pub expanded_groups: BTreeSet<GroupKey>,
    pub visible_columns: BTreeSet<String>,
    pub column_widths: BTreeMap<String, u32>,
}

impl ViewState {
    /// A fresh state with every given column visible and nothing expanded.
    pub fn with_columns(columns: &[ColumnDef]) -> Self {
        Self {
            visible_columns: columns.iter().map(|c| c.id.clone()).collect(),
            ..Self::default()
        }
    }

    pub fn for_layout(layout: &ReportLayout, dynamic_values: &[String]) -> Self {
        Self::with_columns(&layout.columns(dynamic_values))
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    /// Same key flips the direction; a new key starts ascending.
    pub fn sort_by(&mut self, key: &str) {
        self.sort = match self.sort.take() {
            Some(current) if current.key == key => Some(SortSpec {
                key: current.key,
                direction: current.direction.flipped(),
            }),
            _ => Some(SortSpec {
                key: key.to_string(),
                direction: SortDirection::Ascending,
            }),
        };
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    pub fn is_expanded(&self, group: &GroupKey) -> bool {
        self.expanded_groups.contains(group)
    }

    pub fn toggle_group(&mut self, group: &GroupKey) {
        if !self.expanded_groups.remove(group) {
            self.expanded_groups.insert(group.clone());
        }
    }

    pub fn expand_all(&mut self, rows: &[AggregatedRow]) {
        self.expanded_groups = group_keys(rows).into_iter().collect();
    }

    pub fn collapse_all(&mut self) {
        self.expanded_groups.clear();
    }

    pub fn is_column_visible(&self, column: &str) -> bool {
        self.visible_columns.contains(column)
    }

    pub fn toggle_column(&mut self, column: &str) {
        if !self.visible_columns.remove(column) {
            self.visible_columns.insert(column.to_string());
        }
    }

    pub fn set_column_width(&mut self, column: &str, width: u32) {
        self.column_widths
            .insert(column.to_string(), width.max(MIN_COLUMN_WIDTH));
    }

    pub fn column_width(&self, column: &str) -> Option<u32> {
        self.column_widths.get(column).copied()
    }

    /// Clears search and sort. Expansion and column settings are kept.
    pub fn reset_filters(&mut self) {
        self.search_query.clear();
        self.sort = None;
    }
}

struct Section<'a> {
    header: Option<&'a AggregatedRow>,
    data: Vec<&'a AggregatedRow>,
    subtotal: Option<&'a AggregatedRow>,
}

impl<'a> Section<'a> {
    fn empty(header: Option<&'a AggregatedRow>) -> Self {
        Self {
            header,
            data: Vec::new(),
            subtotal: None,
        }
    }
}

fn split_sections(rows: &[AggregatedRow]) -> (Vec<Section<'_>>, Option<&AggregatedRow>) {
    let mut sections: Vec<Section<'_>> = Vec::new();
    let mut grand_total = None;

    for row in rows {
        match row {
            AggregatedRow::GroupHeader { .. } => sections.push(Section::empty(Some(row))),
            AggregatedRow::Data { .. } => {
                let open = sections.last().is_some_and(|s| s.subtotal.is_none());
                if !open {
                    sections.push(Section::empty(None));
                }
                if let Some(section) = sections.last_mut() {
                    section.data.push(row);
                }
            }
            AggregatedRow::GroupSubtotal { .. } => {
                let open = sections.last().is_some_and(|s| s.subtotal.is_none());
                if !open {
                    sections.push(Section::empty(None));
                }
                if let Some(section) = sections.last_mut() {
                    section.subtotal = Some(row);
                }
            }
            AggregatedRow::GrandTotal { .. } => grand_total = Some(row),
        }
    }

    (sections, grand_total)
}

fn matches_search(row: &AggregatedRow, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    match row {
        // each hierarchy level is matched on its own
        AggregatedRow::Data { labels, .. } => labels
            .iter()
            .any(|label| label.value.to_lowercase().contains(query)),
        other => other.display_label().to_lowercase().contains(query),
    }
}

fn compare_rows(a: &AggregatedRow, b: &AggregatedRow, key: &str) -> Ordering {
    match (a.label(key), b.label(key)) {
        (Some(left), Some(right)) => left.to_lowercase().cmp(&right.to_lowercase()),
        _ => a.value(key).total_cmp(&b.value(key)),
    }
}

/// Produces the render sequence for `rows` under `state`.
///
/// With a non-empty search, groups without a matching data row are dropped entirely.
/// Sections without a header (not produced by the engine) are treated as expanded.
pub fn apply(rows: &[AggregatedRow], state: &ViewState) -> Vec<AggregatedRow> {
    let query = state.search_query.trim().to_lowercase();
    let (sections, grand_total) = split_sections(rows);
    let mut output = Vec::with_capacity(rows.len());

    for section in sections {
        let mut data: Vec<&AggregatedRow> = section
            .data
            .into_iter()
            .filter(|row| matches_search(row, &query))
            .collect();

        if !query.is_empty() && data.is_empty() {
            continue;
        }

        if let Some(sort) = &state.sort {
            data.sort_by(|a, b| {
                let ordering = compare_rows(a, b, &sort.key);
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let expanded = match section.header {
            Some(header) => {
                output.push(header.clone());
                header.group().is_some_and(|g| state.is_expanded(g))
            }
            None => true,
        };

        if expanded {
            output.extend(data.into_iter().cloned());
            if let Some(subtotal) = section.subtotal {
                output.push(subtotal.clone());
            }
        }
    }

    if let Some(total) = grand_total {
        output.push(total.clone());
    }

    output
}
