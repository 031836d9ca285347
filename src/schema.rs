use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ReportError, Result};

/// One raw row as delivered by the report API.
pub type ReportRow = serde_json::Map<String, serde_json::Value>;

/// Values of the outer hierarchy levels identifying one group.
pub type GroupKey = Vec<String>;

/// Label substituted for missing or blank hierarchy values.
pub const FALLBACK_GROUP_LABEL: &str = "Other";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    #[schemars(description = "A hierarchy level such as region or location")]
    Hierarchy,

    #[schemars(description = "A synthetic column created per distinct value of a data field")]
    Dynamic,

    #[schemars(description = "An additive metric summed into subtotals and totals")]
    Metric,

    #[schemars(description = "A percentage recomputed from its own numerator and denominator")]
    Derived,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ColumnDef {
    pub id: String,
    pub label: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DynamicColumns {
    #[schemars(description = "Field whose distinct values become columns (e.g. 'material')")]
    pub source_field: String,

    #[schemars(description = "Field summed into each dynamic column (e.g. 'qty')")]
    pub value_field: String,

    #[serde(default)]
    #[schemars(
        description = "Explicit column values in display order. When empty, the distinct values observed in the data are used, sorted ascending."
    )]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DerivedMetric {
    #[schemars(description = "Name of the percentage field written on every aggregated row")]
    pub field: String,

    #[schemars(description = "Field summed as the numerator (e.g. actual sales)")]
    pub numerator: String,

    #[schemars(description = "Field summed as the denominator (e.g. target)")]
    pub denominator: String,
}

impl DerivedMetric {
    pub fn new(
        field: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }

    /// `numerator / denominator * 100`, or zero when the denominator is not positive.
    pub fn compute(numerator: f64, denominator: f64) -> f64 {
        if denominator > 0.0 {
            numerator / denominator * 100.0
        } else {
            0.0
        }
    }
}

/// Describes how flat rows are grouped, summed and displayed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReportLayout {
    #[schemars(
        description = "Hierarchy fields from outermost to innermost. All but the last form the group key; the last is the data-row key."
    )]
    pub hierarchy_levels: Vec<String>,

    #[schemars(description = "Additive numeric fields summed per data row, group and grand total")]
    pub metric_fields: Vec<String>,

    #[serde(default)]
    pub dynamic_columns: Option<DynamicColumns>,

    #[serde(default)]
    pub derived_metrics: Vec<DerivedMetric>,

    #[serde(default)]
    #[schemars(description = "Optional display labels keyed by field id")]
    pub column_labels: BTreeMap<String, String>,
}

impl ReportLayout {
    pub fn new<L, M>(hierarchy_levels: L, metric_fields: M) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            hierarchy_levels: hierarchy_levels.into_iter().map(Into::into).collect(),
            metric_fields: metric_fields.into_iter().map(Into::into).collect(),
            dynamic_columns: None,
            derived_metrics: Vec::new(),
            column_labels: BTreeMap::new(),
        }
    }

    pub fn with_dynamic_columns(
        mut self,
        source_field: impl Into<String>,
        value_field: impl Into<String>,
    ) -> Self {
        self.dynamic_columns = Some(DynamicColumns {
            source_field: source_field.into(),
            value_field: value_field.into(),
            values: Vec::new(),
        });
        self
    }

    pub fn with_derived(mut self, metric: DerivedMetric) -> Self {
        self.derived_metrics.push(metric);
        self
    }

    pub fn with_label(mut self, field: impl Into<String>, label: impl Into<String>) -> Self {
        self.column_labels.insert(field.into(), label.into());
        self
    }

    /// Region → location dispatch report with one quantity column per material.
    pub fn location_wise() -> Self {
        Self::new(
            ["region", "location"],
            [
                "qty",
                "prev_day_sale",
                "curr_day_sale",
                "cumm_day_sale",
                "gross_value",
            ],
        )
        .with_dynamic_columns("material", "qty")
        .with_label("region", "Region")
        .with_label("location", "Location")
        .with_label("qty", "Total Qty")
        .with_label("prev_day_sale", "Prev. Day Sale")
        .with_label("curr_day_sale", "Curr. Day Sale")
        .with_label("cumm_day_sale", "Cumm. Sale")
        .with_label("gross_value", "Gross Value")
    }

    /// Category → description sales statement with monthly, quarterly, cumulative and
    /// annual figures. Achievement on quantity uses the `__base` unit fields so that
    /// products sold in different display units stay comparable.
    pub fn sales_statement() -> Self {
        let periods = [
            ("mon", "Monthly"),
            ("qtr", "Quarterly"),
            ("cumm", "Cumulative"),
            ("ann", "Annual"),
        ];

        let mut metrics = Vec::new();
        for (prefix, _) in periods {
            for base in ["sale_qty", "target_qty"] {
                metrics.push(format!("{prefix}_{base}"));
                metrics.push(format!("{prefix}_{base}__base"));
            }
            metrics.push(format!("{prefix}_sale_value"));
            metrics.push(format!("{prefix}_target_value"));
        }

        let mut layout = Self::new(["category", "descr"], metrics)
            .with_label("category", "Category")
            .with_label("descr", "Description");

        for (prefix, period) in periods {
            layout = layout
                .with_derived(DerivedMetric::new(
                    format!("{prefix}_ach_qty"),
                    format!("{prefix}_sale_qty__base"),
                    format!("{prefix}_target_qty__base"),
                ))
                .with_derived(DerivedMetric::new(
                    format!("{prefix}_ach_value"),
                    format!("{prefix}_sale_value"),
                    format!("{prefix}_target_value"),
                ))
                .with_label(format!("{prefix}_sale_qty"), format!("{period} Sale Qty"))
                .with_label(format!("{prefix}_target_qty"), format!("{period} Target Qty"))
                .with_label(format!("{prefix}_sale_value"), format!("{period} Revenue"))
                .with_label(format!("{prefix}_target_value"), format!("{period} Target"))
                .with_label(format!("{prefix}_ach_qty"), format!("{period} Ach. Qty %"))
                .with_label(format!("{prefix}_ach_value"), format!("{period} Ach. Value %"));
        }

        layout
    }

    pub fn validate(&self) -> Result<()> {
        if self.hierarchy_levels.is_empty() {
            return Err(ReportError::validation(
                "hierarchy_levels",
                "at least one hierarchy level is required",
            ));
        }

        let mut seen = BTreeSet::new();
        for field in self.hierarchy_levels.iter().chain(&self.metric_fields) {
            if field.trim().is_empty() {
                return Err(ReportError::validation("layout", "field names must not be blank"));
            }
            if !seen.insert(field.as_str()) {
                return Err(ReportError::validation(
                    field.clone(),
                    "field is listed more than once in the layout",
                ));
            }
        }

        for derived in &self.derived_metrics {
            for input in [&derived.numerator, &derived.denominator] {
                if !self.metric_fields.contains(input) {
                    return Err(ReportError::validation(
                        derived.field.clone(),
                        format!("derived metric references unknown metric '{}'", input),
                    ));
                }
            }
            if seen.contains(derived.field.as_str()) {
                return Err(ReportError::validation(
                    derived.field.clone(),
                    "derived metric shadows a hierarchy or metric field",
                ));
            }
        }

        if let Some(dynamic) = &self.dynamic_columns {
            if dynamic.source_field.trim().is_empty() || dynamic.value_field.trim().is_empty() {
                return Err(ReportError::validation(
                    "dynamic_columns",
                    "source_field and value_field are required",
                ));
            }
        }

        Ok(())
    }

    /// True when `name` is already taken by a hierarchy level, metric or derived field.
    pub fn is_reserved_field(&self, name: &str) -> bool {
        self.hierarchy_levels.iter().any(|f| f == name)
            || self.metric_fields.iter().any(|f| f == name)
            || self.derived_metrics.iter().any(|d| d.field == name)
    }

    pub fn label_for(&self, field: &str) -> String {
        self.column_labels
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }

    /// Column definitions in display order: hierarchy, dynamic, metric, derived.
    pub fn columns(&self, dynamic_values: &[String]) -> Vec<ColumnDef> {
        let hierarchy = self
            .hierarchy_levels
            .iter()
            .map(|f| (f.clone(), ColumnKind::Hierarchy));
        let dynamic = dynamic_values
            .iter()
            .filter(|v| !self.is_reserved_field(v))
            .map(|v| (v.clone(), ColumnKind::Dynamic));
        let metrics = self
            .metric_fields
            .iter()
            .map(|f| (f.clone(), ColumnKind::Metric));
        let derived = self
            .derived_metrics
            .iter()
            .map(|d| (d.field.clone(), ColumnKind::Derived));

        hierarchy
            .chain(dynamic)
            .chain(metrics)
            .chain(derived)
            .map(|(id, kind)| ColumnDef {
                label: self.label_for(&id),
                id,
                kind,
            })
            .collect()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportLayout)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = ReportLayout::schema_as_json().unwrap();
        assert!(schema_json.contains("hierarchy_levels"));
        assert!(schema_json.contains("metric_fields"));
        assert!(schema_json.contains("derived_metrics"));
    }

    #[test]
    fn test_presets_validate() {
        ReportLayout::location_wise().validate().unwrap();

        let statement = ReportLayout::sales_statement();
        statement.validate().unwrap();
        assert_eq!(statement.metric_fields.len(), 24);
        assert_eq!(statement.derived_metrics.len(), 8);
        assert!(statement
            .metric_fields
            .contains(&"cumm_target_qty__base".to_string()));
    }

    #[test]
    fn test_validation_rejects_bad_layouts() {
        let empty = ReportLayout::new(Vec::<String>::new(), ["qty"]);
        assert!(empty.validate().is_err());

        let duplicate = ReportLayout::new(["region"], ["qty", "qty"]);
        assert!(duplicate.validate().is_err());

        let dangling = ReportLayout::new(["region"], ["sale"])
            .with_derived(DerivedMetric::new("ach", "sale", "target"));
        let err = dangling.validate().unwrap_err();
        assert!(err.to_string().contains("target"));
    }

    #[test]
    fn test_columns_order_and_labels() {
        let layout = ReportLayout::location_wise();
        let columns = layout.columns(&["M1".to_string(), "M2".to_string()]);

        let ids: Vec<&str> = columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "region",
                "location",
                "M1",
                "M2",
                "qty",
                "prev_day_sale",
                "curr_day_sale",
                "cumm_day_sale",
                "gross_value"
            ]
        );
        assert_eq!(columns[0].label, "Region");
        assert_eq!(columns[2].kind, ColumnKind::Dynamic);
        assert_eq!(columns[2].label, "M1");
    }

    #[test]
    fn test_derived_compute() {
        assert_eq!(DerivedMetric::compute(50.0, 200.0), 25.0);
        assert_eq!(DerivedMetric::compute(50.0, 0.0), 0.0);
        assert_eq!(DerivedMetric::compute(50.0, -10.0), 0.0);
    }

    #[test]
    fn test_layout_roundtrips_through_json() {
        let json = r#"{
            "hierarchy_levels": ["region", "location"],
            "metric_fields": ["qty"],
            "dynamic_columns": { "source_field": "material", "value_field": "qty" }
        }"#;
        let layout: ReportLayout = serde_json::from_str(json).unwrap();
        assert!(layout.derived_metrics.is_empty());
        assert!(layout.dynamic_columns.unwrap().values.is_empty());
    }
}
