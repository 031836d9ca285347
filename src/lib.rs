//! # Sales Report Builder
//!
//! A library for turning flat sales and dispatch rows, as returned by a reporting REST API,
//! into hierarchical report tables with group headers, subtotals and a grand total.
//!
//! ## Core Concepts
//!
//! - **Layout**: Which fields form the hierarchy, which are summed, which columns are pivoted
//!   out of a field's values, and which ratios are derived from the sums
//! - **Aggregation**: Rows are grouped by every hierarchy level but the last, sorted ascending,
//!   and summed into subtotals and a grand total. Derived ratios are recomputed on every
//!   aggregated row, never summed
//! - **View State**: Search, sort, group expansion and column settings applied on top of an
//!   aggregated table without ever reordering its structural rows
//! - **Client**: Fetches rows, lookup lists and export files (behind the `client` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_report_builder::*;
//! use serde_json::json;
//!
//! let layout = ReportLayout::location_wise();
//! let rows: Vec<ReportRow> = vec![
//!     json!({ "region": "North", "location": "A", "qty": 10 }),
//!     json!({ "region": "North", "location": "B", "qty": 5 }),
//! ]
//! .into_iter()
//! .filter_map(|v| v.as_object().cloned())
//! .collect();
//!
//! let table = build_report(&rows, &layout).unwrap();
//! println!("{}", TableRenderer::new(&layout.columns(&[])).to_markdown(&table));
//! ```

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod criteria;
pub mod engine;
pub mod error;
pub mod export;
pub mod normalize;
pub mod report_view;
pub mod response;
pub mod schema;
pub mod session;
pub mod table;
pub mod utils;
pub mod verify;
pub mod view;

#[cfg(feature = "client")]
pub use client::ReportClient;
pub use config::*;
pub use criteria::{DivisionKey, FilterCriteria, MetaLookup, ReportEndpoint};
pub use engine::{aggregate, group_keys, AggregatedRow, Aggregator, LevelLabel, Values};
pub use error::{ErrorKind, ReportError, Result};
pub use export::{export_filename, trigger_download, ExportFormat};
pub use normalize::{field_value, hierarchy_label, normalize, normalize_row, normalize_rows, normalize_value};
pub use report_view::{ReportView, RequestSequencer, RequestTicket};
pub use response::{repair_json, RawResponse};
pub use schema::*;
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
pub use table::TableRenderer;
pub use utils::*;
pub use verify::{verify_totals, TotalsVerifier};
pub use view::{apply as apply_view, SortDirection, SortSpec, ViewState, MIN_COLUMN_WIDTH};

use log::{debug, info};

pub struct ReportProcessor;

impl ReportProcessor {
    pub fn process(rows: &[ReportRow], layout: &ReportLayout) -> Result<Vec<AggregatedRow>> {
        layout.validate()?;

        debug!(
            "Layout has {} hierarchy levels, {} metrics and {} derived fields",
            layout.hierarchy_levels.len(),
            layout.metric_fields.len(),
            layout.derived_metrics.len()
        );

        let table = aggregate(rows, layout);
        info!("Processed {} source rows into {} report rows", rows.len(), table.len());

        Ok(table)
    }

    pub fn process_with_verification(
        rows: &[ReportRow],
        layout: &ReportLayout,
        tolerance: f64,
    ) -> Result<Vec<AggregatedRow>> {
        let table = Self::process(rows, layout)?;

        if !table.is_empty() {
            verify_totals(&table, layout, tolerance)?;
        }

        Ok(table)
    }
}

pub fn build_report(rows: &[ReportRow], layout: &ReportLayout) -> Result<Vec<AggregatedRow>> {
    ReportProcessor::process(rows, layout)
}

pub fn build_report_with_verification(
    rows: &[ReportRow],
    layout: &ReportLayout,
    tolerance: f64,
) -> Result<Vec<AggregatedRow>> {
    ReportProcessor::process_with_verification(rows, layout, tolerance)
}
