use crate::engine::{group_keys, Aggregator, AggregatedRow};
use crate::error::Result;
use crate::schema::{ColumnDef, GroupKey, ReportLayout, ReportRow};
use crate::view::{apply, ViewState};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one issued load. Only the most recent ticket may update a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// One mounted report: its layout, latest data snapshot and view state.
pub struct ReportView {
    layout: ReportLayout,
    rows: Vec<ReportRow>,
    aggregated: Vec<AggregatedRow>,
    dynamic_values: Vec<String>,
    state: ViewState,
    sequencer: RequestSequencer,
    known_groups: BTreeSet<GroupKey>,
    expand_new_groups: bool,
    last_error: Option<String>,
}

impl ReportView {
    pub fn new(layout: ReportLayout) -> Result<Self> {
        layout.validate()?;
        let state = ViewState::for_layout(&layout, &[]);

        Ok(Self {
            layout,
            rows: Vec::new(),
            aggregated: Vec::new(),
            dynamic_values: Vec::new(),
            state,
            sequencer: RequestSequencer::new(),
            known_groups: BTreeSet::new(),
            expand_new_groups: true,
            last_error: None,
        })
    }

    /// Whether groups seen for the first time start expanded. Defaults to `true`.
    pub fn with_expand_new_groups(mut self, expand: bool) -> Self {
        self.expand_new_groups = expand;
        self
    }

    pub fn begin_load(&self) -> RequestTicket {
        self.sequencer.issue()
    }

    /// Applies a finished load if `ticket` is still the latest one.
    ///
    /// Returns `false` when the result is stale and was dropped.
    pub fn complete_load(&mut self, ticket: RequestTicket, result: Result<Vec<ReportRow>>) -> bool {
        if !self.sequencer.is_current(ticket) {
            warn!(
                "Dropping stale report response #{} (latest is newer)",
                ticket.sequence()
            );
            return false;
        }

        match result {
            Ok(rows) => {
                self.last_error = None;
                self.replace_rows(rows);
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
            }
        }
        true
    }

    fn replace_rows(&mut self, rows: Vec<ReportRow>) {
        let aggregator = Aggregator::new(&self.layout);
        let dynamic_values = aggregator.dynamic_column_values(&rows);
        let aggregated = aggregator.aggregate(&rows);

        // columns that appear for the first time become visible
        let previous: BTreeSet<String> = self.dynamic_values.iter().cloned().collect();
        for column in &dynamic_values {
            if !previous.contains(column) {
                self.state.visible_columns.insert(column.clone());
            }
        }

        for group in group_keys(&aggregated) {
            if self.known_groups.insert(group.clone()) && self.expand_new_groups {
                self.state.expanded_groups.insert(group);
            }
        }

        debug!(
            "Report view now holds {} source rows, {} aggregated rows",
            rows.len(),
            aggregated.len()
        );

        self.rows = rows;
        self.aggregated = aggregated;
        self.dynamic_values = dynamic_values;
    }

    /// The render sequence under the current view state.
    pub fn render(&self) -> Vec<AggregatedRow> {
        apply(&self.aggregated, &self.state)
    }

    pub fn columns(&self) -> Vec<ColumnDef> {
        self.layout.columns(&self.dynamic_values)
    }

    pub fn visible_columns(&self) -> Vec<ColumnDef> {
        self.columns()
            .into_iter()
            .filter(|c| self.state.is_column_visible(&c.id))
            .collect()
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn aggregated(&self) -> &[AggregatedRow] {
        &self.aggregated
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ViewState {
        &mut self.state
    }

    pub fn expand_all(&mut self) {
        self.state.expand_all(&self.aggregated);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Drops the view state back to its initial shape for the current columns.
    pub fn reset_view(&mut self) {
        self.state = ViewState::with_columns(&self.columns());
        if self.expand_new_groups {
            self.state.expand_all(&self.aggregated);
        }
    }

    /// Swaps in a new layout and re-aggregates the current rows.
    pub fn set_layout(&mut self, layout: ReportLayout) -> Result<()> {
        layout.validate()?;
        self.layout = layout;
        let rows = std::mem::take(&mut self.rows);
        self.dynamic_values.clear();
        self.replace_rows(rows);
        self.state = ViewState {
            visible_columns: self.columns().into_iter().map(|c| c.id).collect(),
            ..std::mem::take(&mut self.state)
        };
        Ok(())
    }
}

impl std::fmt::Debug for ReportView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportView")
            .field("rows", &self.rows.len())
            .field("aggregated", &self.aggregated.len())
            .field("state", &self.state)
            .finish()
    }
}
